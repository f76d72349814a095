//! Beam search over sampled continuations.
//!
//! The generators sample one step at a time. Beam search keeps several candidate
//! continuations alive, branches each of them a few times per iteration and only
//! keeps the most likely ones, which trades time for output that stays closer to
//! what the model thinks is plausible.

use rand::Rng;
use std::cmp::Ordering;

/// The shape of the search. All fields are at least 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BeamParams {
    /// Candidates kept between iterations
    pub beam_size: usize,
    /// Continuations tried per candidate per iteration
    pub branch_factor: usize,
    /// Steps added by each continuation
    pub steps_per_iteration: usize,
}

/// A candidate and the log-likelihood of the steps it has taken so far.
type Candidate<S> = (S, f64);

/// Advance every candidate by `num_steps` steps.
fn extend_all<S, R, F>(candidates: &mut [Candidate<S>], num_steps: usize, rng: &mut R, step: &mut F)
where
    R: Rng,
    F: FnMut(&mut S, &mut R) -> f64,
{
    for (state, score) in candidates.iter_mut() {
        for _ in 0..num_steps {
            *score += step(state, rng);
        }
    }
}

/// Descending by score. NaN scores sort last.
fn by_score_desc<S>(a: &Candidate<S>, b: &Candidate<S>) -> Ordering {
    b.1.partial_cmp(&a.1).unwrap_or_else(|| a.1.is_nan().cmp(&b.1.is_nan()))
}

/// Run `num_steps` steps of beam search from `initial` and return the most likely
/// result.
///
/// `step` advances a state by one step, sampling with `rng`, and returns the log of
/// the probability of the choice it made. The first iteration takes whatever
/// remainder is needed for the later iterations to be whole `steps_per_iteration`
/// chunks, so exactly `num_steps` steps are taken.
pub fn beam_search<S, R, F>(
    initial: S,
    num_steps: usize,
    params: BeamParams,
    rng: &mut R,
    mut step: F,
) -> S
where
    S: Clone,
    R: Rng,
    F: FnMut(&mut S, &mut R) -> f64,
{
    if num_steps == 0 {
        return initial;
    }

    let beam_size = params.beam_size.max(1);
    let branch_factor = params.branch_factor.max(1);
    let steps_per_iteration = params.steps_per_iteration.max(1);

    let mut beam: Vec<Candidate<S>> = vec![(initial, 0.); beam_size];

    let first_iteration_steps = (num_steps - 1) % steps_per_iteration + 1;
    extend_all(&mut beam, first_iteration_steps, rng, &mut step);

    let iterations = (num_steps - first_iteration_steps) / steps_per_iteration;

    for _ in 0..iterations {
        let mut branches = beam
            .iter()
            .flat_map(|candidate| std::iter::repeat(candidate).take(branch_factor))
            .cloned()
            .collect::<Vec<_>>();

        extend_all(&mut branches, steps_per_iteration, rng, &mut step);

        branches.sort_by(by_score_desc);
        branches.truncate(beam_size);
        beam = branches;
    }

    log::trace!(
        "beam search over {} step(s), best log-likelihood {:?}",
        num_steps,
        beam.iter().map(|(_, score)| *score).fold(f64::NEG_INFINITY, f64::max)
    );

    // `beam` holds `beam_size >= 1` candidates, so there's always a best one.
    beam.sort_by(by_score_desc);
    let (best, _) = beam.swap_remove(0);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// A coin flip that scores heads as far more likely than tails.
    fn biased_flip(state: &mut Vec<bool>, rng: &mut StdRng) -> f64 {
        let heads = rng.gen_bool(0.5);
        state.push(heads);
        if heads {
            0.9f64.ln()
        } else {
            0.1f64.ln()
        }
    }

    #[test]
    fn takes_exactly_num_steps() {
        let mut rng = StdRng::seed_from_u64(7);
        for &(num_steps, steps_per_iteration) in &[(1, 1), (10, 3), (16, 4), (5, 8)] {
            let params = BeamParams {
                beam_size: 2,
                branch_factor: 3,
                steps_per_iteration,
            };
            let out = beam_search(Vec::new(), num_steps, params, &mut rng, biased_flip);
            assert_eq!(out.len(), num_steps);
        }
    }

    #[test]
    fn zero_steps_returns_initial() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = BeamParams {
            beam_size: 1,
            branch_factor: 1,
            steps_per_iteration: 1,
        };
        assert_eq!(
            beam_search(vec![true], 0, params, &mut rng, biased_flip),
            vec![true]
        );
    }

    #[test]
    fn wide_beam_prefers_likely_steps() {
        let mut rng = StdRng::seed_from_u64(11);
        let params = BeamParams {
            beam_size: 8,
            branch_factor: 8,
            steps_per_iteration: 1,
        };
        let out = beam_search(Vec::new(), 32, params, &mut rng, biased_flip);

        // With 64 branches per step, some branch flips heads nearly every time.
        let heads = out.iter().filter(|&&heads| heads).count();
        assert!(heads >= 30, "only {} heads", heads);
    }
}
