//! Drum kit generator.
//!
//! Drum pitches are reduced to nine classes. For every position in the bar and
//! every class the generator keeps a hit probability, mixing a prior (kick on the
//! downbeats, snare on the backbeats, steady hats) with what the primer plays at
//! that position. Each step then decides independently whether each class is hit.

use super::{sample_bernoulli, GeneratorDetails, GeneratorId, Plan, SequenceGenerator};
use crate::{
    beam::{beam_search, BeamParams},
    error::{Error, Result},
    options::GeneratorOptions,
    primer::{DrumStep, DEFAULT_PRIMER_VELOCITY},
    sequence::{Note, NoteSequence, Pitch},
    timing::Resolution,
};
use rand::Rng;

/// Number of drum classes
const NUM_CLASSES: usize = 9;

/// General MIDI pitches belonging to each drum class. The first pitch of each
/// class is the one generated.
const DRUM_CLASSES: [&[Pitch]; NUM_CLASSES] = [
    // Kick
    &[36, 35],
    // Snare
    &[38, 27, 28, 31, 32, 33, 34, 37, 39, 40, 56, 65, 66, 75, 85],
    // Closed hi-hat
    &[42, 44, 54, 68, 69, 70, 71, 73, 78, 80],
    // Open hi-hat
    &[46, 67, 72, 74, 79, 81],
    // Low tom
    &[45, 29, 41, 61, 64, 84],
    // Mid tom
    &[48, 47, 60, 63, 77, 86, 87],
    // High tom
    &[50, 30, 43, 62, 76, 83],
    // Crash
    &[49, 55, 57, 58],
    // Ride
    &[51, 52, 53, 59, 82],
];

/// Observations in the primer count this much against the prior's pseudo-counts
const PRIOR_STRENGTH: f64 = 1.;

/// The drum class of a pitch, if it's a drum we know about.
fn drum_class(pitch: Pitch) -> Option<usize> {
    DRUM_CLASSES.iter().position(|pitches| pitches.contains(&pitch))
}

/// Prior hit probability of each class at `pos` in a bar, with `steps_per_quarter`
/// steps per beat.
fn prior_hits(pos: usize, steps_per_quarter: usize) -> [f64; NUM_CLASSES] {
    let steps_per_quarter = steps_per_quarter.max(1);
    let beat = pos / steps_per_quarter;
    let on_beat = pos % steps_per_quarter == 0;
    let on_eighth = pos % (steps_per_quarter / 2).max(1) == 0;

    let kick = match (on_beat, beat % 2) {
        (true, 0) => 0.8,
        (true, _) => 0.3,
        _ => 0.05,
    };
    let snare = match (on_beat, beat % 2) {
        (true, 1) => 0.75,
        _ => 0.04,
    };
    let closed_hat = if on_eighth { 0.6 } else { 0.1 };
    let crash = if pos == 0 { 0.05 } else { 0.005 };

    [kick, snare, closed_hat, 0.03, 0.02, 0.02, 0.02, crash, 0.03]
}

/// A drum pattern being generated.
#[derive(Debug, Clone, PartialEq)]
struct Pattern {
    /// Generated steps
    steps: Vec<DrumStep>,
    /// Absolute step the next hit lands on
    step: u64,
}

/// Per-position hit probabilities.
#[derive(Debug, Clone, PartialEq)]
struct DrumModel {
    /// `hits[pos][class]` is the probability of `class` being hit at `pos`
    hits: Vec<[f64; NUM_CLASSES]>,
    /// For finding positions in the bar
    resolution: Resolution,
    /// Sampling temperature
    temperature: f64,
}

impl DrumModel {
    /// Combine the prior with the hits in `primer`.
    fn learn(primer: &NoteSequence, resolution: Resolution, temperature: f64) -> Result<Self> {
        let steps_per_bar = resolution.steps_per_bar as usize;
        let steps_per_quarter = resolution.steps_per_quarter as usize;
        let qpm = primer.qpm();

        let primer_steps = primer.total_steps(qpm, resolution.steps_per_quarter)?;
        let mut counts = vec![[0.; NUM_CLASSES]; steps_per_bar];
        let mut seen = vec![0.; steps_per_bar];

        // How many times each bar position occurs in the primer, partial bars included.
        for step in 0..primer_steps {
            seen[resolution.position_in_bar(step) as usize] += 1.;
        }

        let notes = primer.quantize(qpm, resolution.steps_per_quarter)?;
        let mut hit_this_step = vec![[false; NUM_CLASSES]; primer_steps as usize];

        for note in notes.iter().filter(|note| note.is_drum) {
            if let (Some(class), Some(flags)) = (
                drum_class(note.pitch),
                hit_this_step.get_mut(note.start_step as usize),
            ) {
                flags[class] = true;
            }
        }

        for (step, flags) in hit_this_step.iter().enumerate() {
            let pos = resolution.position_in_bar(step as u64) as usize;
            for class in (0..NUM_CLASSES).filter(|&class| flags[class]) {
                counts[pos][class] += 1.;
            }
        }

        let hits = (0..steps_per_bar)
            .map(|pos| {
                let prior = prior_hits(pos, steps_per_quarter);
                let mut out = [0.; NUM_CLASSES];
                for class in 0..NUM_CLASSES {
                    out[class] = (counts[pos][class] + PRIOR_STRENGTH * prior[class])
                        / (seen[pos] + PRIOR_STRENGTH);
                }
                out
            })
            .collect();

        Ok(DrumModel {
            hits,
            resolution,
            temperature,
        })
    }

    /// Sample the hits for the next step of `pattern`, returning their
    /// log-probability.
    fn step<R: Rng>(&self, pattern: &mut Pattern, rng: &mut R) -> f64 {
        let pos = self.resolution.position_in_bar(pattern.step) as usize;
        let mut hits = DrumStep::new();
        let mut log_prob = 0.;

        for (class, &p) in self.hits[pos % self.hits.len()].iter().enumerate() {
            let (hit, lp) = sample_bernoulli(p, self.temperature, rng);
            log_prob += lp;
            if hit {
                // There are exactly as many classes as `DrumStep` has room for.
                hits.push(DRUM_CLASSES[class][0]);
            }
        }

        pattern.steps.push(hits);
        pattern.step += 1;

        log_prob
    }
}

/// Generates drum kit patterns.
#[derive(Debug, Clone, Default)]
pub struct DrumKitGenerator {
    /// Set by `initialize`
    initialized: bool,
}

impl DrumKitGenerator {
    /// An uninitialized generator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceGenerator for DrumKitGenerator {
    fn details(&self) -> GeneratorDetails {
        GeneratorDetails {
            id: GeneratorId::DrumKit,
            description: "Drum kit generator over nine drum classes",
        }
    }

    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn generate(
        &mut self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence> {
        if !self.initialized {
            return Err(Error::GeneratorNotInitialized(GeneratorId::DrumKit.as_str()));
        }

        let mut plan = Plan::new(primer, options, self.steps_per_quarter())?;
        let model = DrumModel::learn(primer, plan.resolution, options.temperature)?;

        let pattern = beam_search(
            Pattern {
                steps: Vec::with_capacity(plan.num_steps),
                step: plan.start_step,
            },
            plan.num_steps,
            BeamParams {
                beam_size: options.beam_size,
                branch_factor: options.branch_factor,
                steps_per_iteration: options.steps_per_iteration,
            },
            &mut plan.rng,
            |pattern, rng| model.step(pattern, rng),
        );

        for (offset, hits) in pattern.steps.iter().enumerate() {
            let step = plan.start_step + offset as u64;
            let (start, end) = (plan.time_of(step), plan.time_of(step + 1));

            for &pitch in hits {
                plan.output
                    .push_note(Note::drum(pitch, DEFAULT_PRIMER_VELOCITY, start, end));
            }
        }

        log::debug!(
            "drum kit generated {} hit(s) over {} step(s)",
            pattern.steps.iter().map(|hits| hits.len()).sum::<usize>(),
            plan.num_steps
        );

        Ok(plan.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{primer::DrumTrack, timing::GenerationWindow};

    fn four_on_the_floor() -> NoteSequence {
        let steps = (0..16)
            .map(|pos| if pos % 4 == 0 { vec![36] } else { vec![] })
            .collect::<Vec<_>>();
        DrumTrack::from_steps(&steps)
            .unwrap()
            .to_sequence(120., 4)
            .unwrap()
    }

    fn generate(
        primer: &NoteSequence,
        start_time: f64,
        end_time: f64,
        temperature: f64,
    ) -> NoteSequence {
        let mut generator = DrumKitGenerator::new();
        generator.initialize().unwrap();
        let options = GeneratorOptions::for_window(GenerationWindow {
            start_time,
            end_time,
        })
        .with_temperature(temperature)
        .with_seed(Some(5));
        generator.generate(primer, &options).unwrap()
    }

    #[test]
    fn classes_cover_general_midi_kit() {
        assert_eq!(drum_class(36), Some(0));
        assert_eq!(drum_class(38), Some(1));
        assert_eq!(drum_class(51), Some(8));
        assert_eq!(drum_class(20), None);

        let mut all = DRUM_CLASSES.iter().flat_map(|pitches| pitches.iter()).collect::<Vec<_>>();
        let len = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), len, "a pitch belongs to two classes");
    }

    #[test]
    fn primer_hits_raise_probability() {
        let model = DrumModel::learn(&four_on_the_floor(), Resolution::default(), 1.).unwrap();
        let prior = prior_hits(4, 4);
        assert!(model.hits[4][0] > prior[0]);
        assert!(model.hits[2][0] < model.hits[4][0]);
    }

    #[test]
    fn hits_are_drums_inside_the_window() {
        let primer = four_on_the_floor();
        let out = generate(&primer, 2., 6., 1.);

        assert_eq!(&out.notes()[..primer.notes().len()], primer.notes());
        assert_eq!(out.total_time(), 6.);

        let generated = &out.notes()[primer.notes().len()..];
        assert!(!generated.is_empty());
        for note in generated {
            assert!(note.is_drum);
            assert!(note.start_time >= 2. && note.end_time <= 6.);
            assert!(DRUM_CLASSES.iter().any(|pitches| pitches[0] == note.pitch));
        }
    }

    #[test]
    fn cold_generation_keeps_the_kick_pattern() {
        let out = generate(&four_on_the_floor(), 2., 4., 0.05);
        let kicks = out
            .notes()
            .iter()
            .filter(|note| note.pitch == 36 && note.start_time >= 2.)
            .map(|note| note.start_time)
            .collect::<Vec<_>>();

        assert_eq!(kicks, vec![2., 2.5, 3., 3.5]);
    }

    #[test]
    fn without_a_primer_uses_prior() {
        let out = generate(&NoteSequence::new(), 0., 2., 1.);
        assert_eq!(out.qpm(), crate::timing::DEFAULT_QUARTERS_PER_MINUTE);
        assert_eq!(out.total_time(), 2.);
    }
}
