//! Sequence generators and the registry that finds them.
//!
//! A generator is picked by a model family and a generator id, both closed enums,
//! so asking for something that doesn't exist fails when the request is parsed or
//! looked up rather than at some arbitrary point in the pipeline. The registry is a
//! plain static table from `(ModelName, GeneratorId)` to a constructor.
//!
//! The generators built into this crate are small statistical models conditioned
//! on the primer. They stand in for the pretrained networks (whose bundles are
//! named by `GeneratorId::bundle_name`) and implement the same interface, so the
//! rest of the pipeline doesn't care which one it gets.

mod drums;
mod melody;

pub use self::{drums::DrumKitGenerator, melody::MelodyGenerator, melody::PolyphonyGenerator};

use crate::{
    error::{Error, Result},
    options::GeneratorOptions,
    sequence::NoteSequence,
    timing::{self, GenerationWindow, Resolution},
};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng, SeedableRng,
};
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// A family of models, each of which has one or more pretrained generators.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    /// Monophonic melodies
    MelodyRnn,
    /// Drum kit patterns
    DrumsRnn,
    /// Polyphonic, chorale-like sequences
    PolyphonyRnn,
}

/// A specific pretrained generator.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorId {
    /// Melody model with no memory beyond the previous note
    BasicRnn,
    /// Melody model that also looks back one and two bars
    LookbackRnn,
    /// Melody model that attends over the last few bars
    AttentionRnn,
    /// Drum kit model over nine drum classes
    DrumKit,
    /// Polyphonic model
    Polyphony,
}

impl ModelName {
    /// Every model family.
    pub const ALL: [ModelName; 3] = [
        ModelName::MelodyRnn,
        ModelName::DrumsRnn,
        ModelName::PolyphonyRnn,
    ];

    /// The snake_case name, as used in requests and output file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::MelodyRnn => "melody_rnn",
            ModelName::DrumsRnn => "drums_rnn",
            ModelName::PolyphonyRnn => "polyphony_rnn",
        }
    }
}

impl GeneratorId {
    /// Every generator id.
    pub const ALL: [GeneratorId; 5] = [
        GeneratorId::BasicRnn,
        GeneratorId::LookbackRnn,
        GeneratorId::AttentionRnn,
        GeneratorId::DrumKit,
        GeneratorId::Polyphony,
    ];

    /// The snake_case name, as used in requests and output file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorId::BasicRnn => "basic_rnn",
            GeneratorId::LookbackRnn => "lookback_rnn",
            GeneratorId::AttentionRnn => "attention_rnn",
            GeneratorId::DrumKit => "drum_kit",
            GeneratorId::Polyphony => "polyphony",
        }
    }

    /// File name of the pretrained bundle for this generator.
    pub fn bundle_name(&self) -> &'static str {
        match self {
            GeneratorId::BasicRnn => "basic_rnn.mag",
            GeneratorId::LookbackRnn => "lookback_rnn.mag",
            GeneratorId::AttentionRnn => "attention_rnn.mag",
            GeneratorId::DrumKit => "drum_kit_rnn.mag",
            GeneratorId::Polyphony => "polyphony_rnn.mag",
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("unknown model `{}`", s)))
    }
}

impl FromStr for GeneratorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("unknown generator `{}`", s)))
    }
}

/// Describes a generator instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GeneratorDetails {
    /// Which generator this is
    pub id: GeneratorId,
    /// Human-readable description
    pub description: &'static str,
}

/// Something that continues a primer into a generate section.
pub trait SequenceGenerator {
    /// What this generator is.
    fn details(&self) -> GeneratorDetails;

    /// The step resolution the generator samples at.
    fn steps_per_quarter(&self) -> u32 {
        timing::DEFAULT_STEPS_PER_QUARTER
    }

    /// Prepare the generator for use. Must be called before `generate`.
    fn initialize(&mut self) -> Result<()>;

    /// Whether `initialize` has been called.
    fn is_initialized(&self) -> bool;

    /// Fill the single section in `options.generate_sections`, conditioned on `primer`.
    ///
    /// The output starts with the primer notes that have ended by the start of the
    /// section, which is the whole primer when the section follows it. Primer notes
    /// that overlap the section only condition the generator.
    fn generate(
        &mut self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence>;
}

/// Builds a fresh, uninitialized generator.
pub type Constructor = fn() -> Box<dyn SequenceGenerator>;

/// An entry in the registry.
#[derive(Copy, Clone)]
pub struct Registration {
    /// Model family
    pub model: ModelName,
    /// Generator within that family
    pub generator: GeneratorId,
    /// How to build it
    pub construct: Constructor,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("model", &self.model)
            .field("generator", &self.generator)
            .finish()
    }
}

/// Constructor for the basic melody generator
fn basic_melody() -> Box<dyn SequenceGenerator> {
    Box::new(MelodyGenerator::new(GeneratorId::BasicRnn))
}

/// Constructor for the lookback melody generator
fn lookback_melody() -> Box<dyn SequenceGenerator> {
    Box::new(MelodyGenerator::new(GeneratorId::LookbackRnn))
}

/// Constructor for the attention melody generator
fn attention_melody() -> Box<dyn SequenceGenerator> {
    Box::new(MelodyGenerator::new(GeneratorId::AttentionRnn))
}

/// Constructor for the drum kit generator
fn drum_kit() -> Box<dyn SequenceGenerator> {
    Box::new(DrumKitGenerator::new())
}

/// Constructor for the polyphony generator
fn polyphony() -> Box<dyn SequenceGenerator> {
    Box::new(PolyphonyGenerator::new())
}

/// Every generator that can be asked for.
pub static REGISTRY: &[Registration] = &[
    Registration {
        model: ModelName::MelodyRnn,
        generator: GeneratorId::BasicRnn,
        construct: basic_melody,
    },
    Registration {
        model: ModelName::MelodyRnn,
        generator: GeneratorId::LookbackRnn,
        construct: lookback_melody,
    },
    Registration {
        model: ModelName::MelodyRnn,
        generator: GeneratorId::AttentionRnn,
        construct: attention_melody,
    },
    Registration {
        model: ModelName::DrumsRnn,
        generator: GeneratorId::DrumKit,
        construct: drum_kit,
    },
    Registration {
        model: ModelName::PolyphonyRnn,
        generator: GeneratorId::Polyphony,
        construct: polyphony,
    },
];

/// Find the constructor for a model/generator pair.
pub fn lookup(model: ModelName, generator: GeneratorId) -> Result<Constructor> {
    REGISTRY
        .iter()
        .find(|entry| entry.model == model && entry.generator == generator)
        .map(|entry| entry.construct)
        .ok_or_else(|| Error::UnknownGenerator {
            model: model.to_string(),
            generator: generator.to_string(),
        })
}

/// Build and initialize the generator for a model/generator pair.
pub fn build(model: ModelName, generator: GeneratorId) -> Result<Box<dyn SequenceGenerator>> {
    let mut out = lookup(model, generator)?();
    out.initialize()?;

    log::info!(
        "initialized {}/{} ({})",
        model,
        generator,
        out.details().description
    );

    Ok(out)
}

/// Everything a generator works out before it starts sampling.
pub(crate) struct Plan {
    /// The section being filled
    pub window: GenerationWindow,
    /// The resolution being sampled at
    pub resolution: Resolution,
    /// Length of a step in seconds
    pub step_seconds: f64,
    /// Absolute step that generation starts on
    pub start_step: u64,
    /// Number of steps to generate
    pub num_steps: usize,
    /// Where sampling randomness comes from
    pub rng: StdRng,
    /// The output so far: the primer up to the start of the window
    pub output: NoteSequence,
}

impl Plan {
    /// Validate `options` against `primer` and work out the step grid.
    pub fn new(
        primer: &NoteSequence,
        options: &GeneratorOptions,
        steps_per_quarter: u32,
    ) -> Result<Self> {
        let window = options.validate()?;
        let qpm = primer.qpm();
        let step_seconds = timing::seconds_per_step(qpm, steps_per_quarter)?;

        let start_step = (window.start_time / step_seconds).round() as u64;
        let end_step = (window.end_time / step_seconds).round() as u64;

        if end_step <= start_step {
            return Err(Error::invalid(format!(
                "generate section {:?} is shorter than a step",
                window
            )));
        }

        // Primer notes still sounding when the section starts only condition the
        // generator.
        let mut output = primer.notes_ending_by(window.start_time);
        if output.notes().len() < primer.notes().len() {
            log::debug!(
                "section starts inside the primer, keeping {} of {} primer note(s)",
                output.notes().len(),
                primer.notes().len()
            );
        }

        if output.tempos().is_empty() {
            output.add_tempo(0., qpm);
        }

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Plan {
            window,
            resolution: Resolution {
                steps_per_quarter,
                steps_per_bar: steps_per_quarter * 4,
            },
            step_seconds,
            start_step,
            num_steps: (end_step - start_step) as usize,
            rng,
            output,
        })
    }

    /// Time of an absolute step, clamped to the window.
    pub fn time_of(&self, step: u64) -> f64 {
        (step as f64 * self.step_seconds).min(self.window.end_time)
    }

    /// Hand over the finished output, which lasts until the end of the window.
    pub fn finish(mut self) -> NoteSequence {
        self.output.extend_to(self.window.end_time);
        self.output
    }
}

/// Sample an index from unnormalized `weights` sharpened or flattened by
/// `temperature`, returning it with the log of its probability.
///
/// Weights are raised to `1 / temperature` in log space, so very low temperatures
/// pick the heaviest weight rather than overflowing. All-zero weights are treated as
/// uniform.
pub(crate) fn sample_with_temperature<R: Rng>(
    weights: &[f64],
    temperature: f64,
    rng: &mut R,
) -> (usize, f64) {
    let logits = weights
        .iter()
        .map(|&w| {
            if w > 0. {
                w.ln() / temperature
            } else {
                f64::NEG_INFINITY
            }
        })
        .collect::<Vec<_>>();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let adjusted = if max.is_finite() {
        logits.iter().map(|&l| (l - max).exp()).collect::<Vec<_>>()
    } else {
        vec![1.; weights.len()]
    };
    let total: f64 = adjusted.iter().sum();

    let index = match WeightedIndex::new(&adjusted) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..adjusted.len().max(1)),
    };

    (index, (adjusted[index] / total).ln())
}

/// Sample a yes/no decision with probability `p` of yes, adjusted by temperature.
pub(crate) fn sample_bernoulli<R: Rng>(p: f64, temperature: f64, rng: &mut R) -> (bool, f64) {
    let p = p.max(1e-6).min(1. - 1e-6);
    let (index, log_prob) = sample_with_temperature(&[1. - p, p], temperature, rng);
    (index == 1, log_prob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Note;

    #[test]
    fn every_registration_builds() {
        for entry in REGISTRY {
            let generator = build(entry.model, entry.generator).unwrap();
            assert!(generator.is_initialized());
            assert_eq!(generator.details().id, entry.generator);
        }
    }

    #[test]
    fn unknown_pair_is_rejected() {
        match lookup(ModelName::DrumsRnn, GeneratorId::AttentionRnn) {
            Err(Error::UnknownGenerator { model, generator }) => {
                assert_eq!(model, "drums_rnn");
                assert_eq!(generator, "attention_rnn");
            }
            _ => panic!("expected UnknownGenerator"),
        }
    }

    #[test]
    fn names_round_trip() {
        for model in &ModelName::ALL {
            assert_eq!(model.as_str().parse::<ModelName>().unwrap(), *model);
        }
        for id in &GeneratorId::ALL {
            assert_eq!(id.as_str().parse::<GeneratorId>().unwrap(), *id);
        }
        assert!("lstm".parse::<GeneratorId>().is_err());
        assert_eq!(GeneratorId::DrumKit.bundle_name(), "drum_kit_rnn.mag");
    }

    #[test]
    fn parses_snake_case_from_ron() {
        let model: ModelName = ron::from_str("melody_rnn").unwrap();
        let id: GeneratorId = ron::from_str("attention_rnn").unwrap();
        assert_eq!((model, id), (ModelName::MelodyRnn, GeneratorId::AttentionRnn));
    }

    #[test]
    fn generating_before_initializing_fails() {
        let mut generator = lookup(ModelName::MelodyRnn, GeneratorId::BasicRnn).unwrap()();
        let options = GeneratorOptions::for_window(GenerationWindow {
            start_time: 0.,
            end_time: 2.,
        });
        assert!(matches!(
            generator.generate(&NoteSequence::new(), &options),
            Err(Error::GeneratorNotInitialized(_))
        ));
    }

    #[test]
    fn plan_keeps_primer_when_window_follows_it() {
        let mut primer = NoteSequence::new();
        primer.add_tempo(0., 120.);
        primer.push_note(Note::new(60, 100, 0., 2.));

        let after = GeneratorOptions::for_window(GenerationWindow {
            start_time: 2.,
            end_time: 4.,
        });
        let plan = Plan::new(&primer, &after, 4).unwrap();
        assert_eq!(plan.start_step, 16);
        assert_eq!(plan.num_steps, 16);
        assert_eq!(plan.output.notes().len(), 1);

        let overlapping = GeneratorOptions::for_window(GenerationWindow {
            start_time: 0.,
            end_time: 4.,
        });
        let plan = Plan::new(&primer, &overlapping, 4).unwrap();
        assert!(plan.output.is_empty());
        assert_eq!(plan.output.tempos().len(), 1);
        assert_eq!(plan.finish().total_time(), 4.);
    }

    #[test]
    fn plan_keeps_primer_notes_before_an_overlapping_window() {
        let mut primer = NoteSequence::new();
        primer.add_tempo(0., 120.);
        primer.push_note(Note::new(60, 100, 0., 1.));
        primer.push_note(Note::new(64, 100, 0.5, 1.5));
        primer.push_note(Note::new(67, 100, 1.5, 2.));

        let options = GeneratorOptions::for_window(GenerationWindow {
            start_time: 1.,
            end_time: 3.,
        });
        let plan = Plan::new(&primer, &options, 4).unwrap();

        assert_eq!(plan.output.notes(), &primer.notes()[..1]);
        assert_eq!(plan.output.total_time(), 1.);
        assert_eq!(plan.start_step, 8);
    }

    #[test]
    fn tiny_temperatures_pick_the_heaviest_weight() {
        let mut rng = StdRng::seed_from_u64(3);
        for &temperature in &[1e-3, 1e-4] {
            for _ in 0..1000 {
                assert_eq!(sample_with_temperature(&[3., 1.], temperature, &mut rng).0, 0);
                assert_eq!(sample_with_temperature(&[0.1, 0.9], temperature, &mut rng).0, 1);
                assert!(sample_bernoulli(0.9, temperature, &mut rng).0);
            }
        }

        let (_, log_prob) = sample_with_temperature(&[3., 1.], 1e-4, &mut rng);
        assert_eq!(log_prob, 0.);
    }

    #[test]
    fn low_temperature_is_nearly_greedy() {
        let mut rng = StdRng::seed_from_u64(3);
        let picks = (0..200)
            .filter(|_| sample_with_temperature(&[1., 3.], 0.05, &mut rng).0 == 1)
            .count();
        assert!(picks > 195);
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let mut rng = StdRng::seed_from_u64(3);
        let (index, log_prob) = sample_with_temperature(&[0., 0., 0., 0.], 1., &mut rng);
        assert!(index < 4);
        assert!((log_prob - 0.25f64.ln()).abs() < 1e-12);
    }
}
