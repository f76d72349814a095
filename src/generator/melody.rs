//! Melody and polyphony generators.
//!
//! Both sample melody events (note on, note off, no event) one step at a time.
//! The distribution at each step mixes a fixed prior with counts taken from the
//! primer: how likely each kind of event is at this position in the bar, which
//! intervals follow the previous note and which register the primer sits in. The
//! lookback and attention variants also look at the history they've built up.

use super::{sample_with_temperature, GeneratorDetails, GeneratorId, Plan, SequenceGenerator};
use crate::{
    beam::{beam_search, BeamParams},
    error::{Error, Result},
    options::GeneratorOptions,
    primer::MelodyEvent,
    sequence::{Note, NoteSequence, Pitch, QuantizedNote},
    timing::Resolution,
};
use rand::Rng;

/// Lowest pitch a melody can use
pub const MIN_PITCH: Pitch = 48;
/// One above the highest pitch a melody can use
pub const MAX_PITCH: Pitch = 84;

/// Number of pitches in `MIN_PITCH..MAX_PITCH`
const NUM_PITCHES: usize = (MAX_PITCH - MIN_PITCH) as usize;
/// Index of `MelodyEvent::NoEvent` in a weight vector
const NO_EVENT: usize = 0;
/// Index of `MelodyEvent::NoteOff` in a weight vector
const NOTE_OFF: usize = 1;
/// Index of the note-on for `MIN_PITCH` in a weight vector. Higher pitches follow.
const FIRST_NOTE_ON: usize = 2;
/// Length of a weight vector
const NUM_EVENTS: usize = FIRST_NOTE_ON + NUM_PITCHES;

/// Widest interval we keep statistics for, in semitones
const MAX_INTERVAL: i32 = 24;
/// How much a single observation in the primer counts against the prior
const PRIMER_WEIGHT: f64 = 4.;
/// Extra weight, relative to the total, for repeating the event from one or two
/// bars ago
const LOOKBACK_BOOST: f64 = 1.;
/// Steps of history the attention generator looks at
const ATTENTION_LENGTH: usize = 40;
/// Extra weight, relative to the total, spread over recently-played pitches
const ATTENTION_BOOST: f64 = 0.5;
/// Velocity of generated notes
const VELOCITY: u8 = 100;

/// Move a pitch by octaves until it's in the melody range.
fn fold_into_range(pitch: Pitch) -> Pitch {
    let mut pitch = pitch;
    while pitch < MIN_PITCH {
        pitch += 12;
    }
    while pitch >= MAX_PITCH {
        pitch -= 12;
    }
    pitch
}

/// Position of an event in a weight vector.
fn event_index(event: MelodyEvent) -> usize {
    match event {
        MelodyEvent::NoEvent => NO_EVENT,
        MelodyEvent::NoteOff => NOTE_OFF,
        MelodyEvent::NoteOn(pitch) => FIRST_NOTE_ON + (fold_into_range(pitch) - MIN_PITCH) as usize,
    }
}

/// The event at a position in a weight vector.
fn event_at(index: usize) -> MelodyEvent {
    match index {
        NO_EVENT => MelodyEvent::NoEvent,
        NOTE_OFF => MelodyEvent::NoteOff,
        _ => MelodyEvent::NoteOn(MIN_PITCH + (index - FIRST_NOTE_ON) as Pitch),
    }
}

/// Reduce quantized notes to a monophonic line, one event per step for `num_steps`
/// steps. Where notes start together the highest one wins.
fn extract_melody(notes: &[QuantizedNote], num_steps: u64) -> Vec<MelodyEvent> {
    let mut events = vec![MelodyEvent::NoEvent; num_steps as usize];
    let mut onsets: Vec<Option<(Pitch, u64)>> = vec![None; num_steps as usize];

    // `notes` is sorted by start then pitch, so later notes on the same step are higher.
    for note in notes.iter().filter(|note| !note.is_drum) {
        if let Some(onset) = onsets.get_mut(note.start_step as usize) {
            *onset = Some((fold_into_range(note.pitch), note.end_step));
        }
    }

    let mut sounding_until = None;

    for (step, onset) in onsets.into_iter().enumerate() {
        let step = step as u64;

        if let Some((pitch, end)) = onset {
            events[step as usize] = MelodyEvent::NoteOn(pitch);
            sounding_until = Some(end);
        } else if sounding_until == Some(step) {
            events[step as usize] = MelodyEvent::NoteOff;
            sounding_until = None;
        }
    }

    events
}

/// Index into `MelodyStats::intervals` for an interval in semitones.
fn interval_index(interval: i32) -> usize {
    (interval.max(-MAX_INTERVAL).min(MAX_INTERVAL) + MAX_INTERVAL) as usize
}

/// Unnormalized statistics that the step distribution is built from.
#[derive(Debug, Clone, PartialEq)]
struct MelodyStats {
    /// Weights of no event, note off and note on, per position in the bar
    rhythm: Vec<[f64; 3]>,
    /// Weights of each interval between consecutive note-ons, `-MAX_INTERVAL..=MAX_INTERVAL`
    intervals: Vec<f64>,
    /// Weights of each pitch in the melody range
    pitches: Vec<f64>,
}

impl MelodyStats {
    /// What we assume before seeing a primer: notes start on the beat more than off
    /// it, small intervals beat large ones and the middle of the range is preferred.
    fn prior(resolution: Resolution) -> Self {
        let steps_per_quarter = resolution.steps_per_quarter.max(1) as usize;
        let rhythm = (0..resolution.steps_per_bar as usize)
            .map(|pos| {
                if pos % steps_per_quarter == 0 {
                    [1.0, 0.5, 2.0]
                } else if pos % 2 == 0 {
                    [1.5, 0.5, 1.0]
                } else {
                    [2.5, 0.5, 0.5]
                }
            })
            .collect();

        let intervals = (-MAX_INTERVAL..=MAX_INTERVAL)
            .map(|interval| {
                let size = interval.abs() as f64;
                if interval == 0 {
                    0.5
                } else {
                    1. / (1. + size)
                }
            })
            .collect();

        let center = (MIN_PITCH as f64 + MAX_PITCH as f64) / 2.;
        let pitches = (MIN_PITCH..MAX_PITCH)
            .map(|pitch| {
                let distance = (pitch as f64 - center) / 8.;
                (-distance * distance / 2.).exp()
            })
            .collect();

        MelodyStats {
            rhythm,
            intervals,
            pitches,
        }
    }

    /// The prior updated with what happens in `history`.
    fn learn(&self, history: &[MelodyEvent]) -> Self {
        let mut out = self.clone();
        let bar = out.rhythm.len().max(1);
        let mut last_pitch: Option<Pitch> = None;

        for (step, event) in history.iter().enumerate() {
            let kind = match *event {
                MelodyEvent::NoEvent => 0,
                MelodyEvent::NoteOff => 1,
                MelodyEvent::NoteOn(pitch) => {
                    if let Some(last) = last_pitch {
                        out.intervals[interval_index(pitch as i32 - last as i32)] += PRIMER_WEIGHT;
                    }
                    out.pitches[(pitch - MIN_PITCH) as usize] += PRIMER_WEIGHT;
                    last_pitch = Some(pitch);
                    2
                }
            };

            if let Some(weights) = out.rhythm.get_mut(step % bar) {
                weights[kind] += PRIMER_WEIGHT;
            }
        }

        out
    }
}

/// How much of its own history a melody generator pays attention to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Memory {
    /// Only the previous note
    Basic,
    /// The events one and two bars ago
    Lookback,
    /// The pitches of the last `ATTENTION_LENGTH` steps
    Attention,
}

/// One melodic line being generated.
#[derive(Debug, Clone, PartialEq)]
struct Voice {
    /// Events so far, primer included
    history: Vec<MelodyEvent>,
    /// The most recent note-on pitch
    last_pitch: Option<Pitch>,
    /// Whether a note is currently sounding
    sounding: bool,
    /// Absolute step the next event lands on
    step: u64,
}

impl Voice {
    /// A voice that picks up after `history`, starting at `step`.
    fn after(history: Vec<MelodyEvent>, step: u64) -> Self {
        let last_pitch = history.iter().rev().find_map(|event| match *event {
            MelodyEvent::NoteOn(pitch) => Some(pitch),
            _ => None,
        });

        Voice {
            history,
            last_pitch,
            sounding: false,
            step,
        }
    }

    /// The pitch this voice is holding, if any.
    fn sounding_pitch(&self) -> Option<Pitch> {
        if self.sounding {
            self.last_pitch
        } else {
            None
        }
    }
}

/// The statistics and settings that every step of a generation shares.
struct MelodyModel {
    /// Learned statistics
    stats: MelodyStats,
    /// What the generator remembers
    memory: Memory,
    /// For finding positions in the bar
    resolution: Resolution,
    /// Sampling temperature
    temperature: f64,
}

impl MelodyModel {
    /// Weights of every event for `voice`'s next step. Pitches in `avoid` are being
    /// held by other voices and can't be started.
    fn weights(&self, voice: &Voice, avoid: &[Pitch]) -> Vec<f64> {
        let mut weights = vec![0.; NUM_EVENTS];
        let pos = self.resolution.position_in_bar(voice.step) as usize;
        let [none, off, on] = self.stats.rhythm[pos % self.stats.rhythm.len()];

        weights[NO_EVENT] = none;
        weights[NOTE_OFF] = off;

        let pitch_weights = (MIN_PITCH..MAX_PITCH)
            .zip(&self.stats.pitches)
            .map(|(pitch, &register)| match voice.last_pitch {
                Some(last) => {
                    register * self.stats.intervals[interval_index(pitch as i32 - last as i32)]
                }
                None => register,
            })
            .collect::<Vec<_>>();
        let pitch_total: f64 = pitch_weights.iter().sum();

        for (weight, pitch_weight) in weights[FIRST_NOTE_ON..].iter_mut().zip(&pitch_weights) {
            *weight = on * pitch_weight / pitch_total;
        }

        let total: f64 = weights.iter().sum();

        match self.memory {
            Memory::Basic => {}
            Memory::Lookback => {
                let bar = self.resolution.steps_per_bar as usize;
                for &distance in &[bar, 2 * bar] {
                    if let Some(index) = voice.history.len().checked_sub(distance) {
                        weights[event_index(voice.history[index])] += LOOKBACK_BOOST * total;
                    }
                }
            }
            Memory::Attention => {
                let recent = &voice.history[voice.history.len().saturating_sub(ATTENTION_LENGTH)..];
                let onsets = recent
                    .iter()
                    .filter(|event| matches!(event, MelodyEvent::NoteOn(_)))
                    .count();

                for event in recent {
                    if let MelodyEvent::NoteOn(_) = event {
                        weights[event_index(*event)] += ATTENTION_BOOST * total / onsets as f64;
                    }
                }
            }
        }

        if !voice.sounding {
            weights[NOTE_OFF] = 0.;
        }

        for &pitch in avoid {
            if (MIN_PITCH..MAX_PITCH).contains(&pitch) {
                weights[event_index(MelodyEvent::NoteOn(pitch))] = 0.;
            }
        }

        weights
    }

    /// Sample the next event for `voice`, returning its log-probability.
    fn step<R: Rng>(&self, voice: &mut Voice, avoid: &[Pitch], rng: &mut R) -> f64 {
        let weights = self.weights(voice, avoid);
        let (index, log_prob) = sample_with_temperature(&weights, self.temperature, rng);
        let event = event_at(index);

        match event {
            MelodyEvent::NoteOn(pitch) => {
                voice.last_pitch = Some(pitch);
                voice.sounding = true;
            }
            MelodyEvent::NoteOff => voice.sounding = false,
            MelodyEvent::NoEvent => {}
        }

        voice.history.push(event);
        voice.step += 1;

        log_prob
    }
}

/// The melodic part of the primer, as history to generate after.
fn primer_history(primer: &NoteSequence, plan: &Plan) -> Result<Vec<MelodyEvent>> {
    let qpm = primer.qpm();
    let steps_per_quarter = plan.resolution.steps_per_quarter;
    let notes = primer.quantize(qpm, steps_per_quarter)?;
    let primer_steps = primer.total_steps(qpm, steps_per_quarter)?;

    Ok(extract_melody(&notes, primer_steps.max(plan.start_step)))
}

/// Add the notes described by `events`, which start at `plan.start_step`.
fn push_events(plan: &mut Plan, events: &[MelodyEvent]) {
    let mut sounding: Option<(Pitch, u64)> = None;
    let end_step = plan.start_step + events.len() as u64;

    let close = |plan: &mut Plan, sounding: Option<(Pitch, u64)>, step: u64| {
        if let Some((pitch, start)) = sounding {
            let note = Note::new(pitch, VELOCITY, plan.time_of(start), plan.time_of(step));
            plan.output.push_note(note);
        }
    };

    for (offset, event) in events.iter().enumerate() {
        let step = plan.start_step + offset as u64;

        match *event {
            MelodyEvent::NoteOn(pitch) => {
                close(plan, sounding.take(), step);
                sounding = Some((pitch, step));
            }
            MelodyEvent::NoteOff => close(plan, sounding.take(), step),
            MelodyEvent::NoEvent => {}
        }
    }

    close(plan, sounding, end_step);
}

/// Beam search parameters from the options.
fn beam_params(options: &GeneratorOptions) -> BeamParams {
    BeamParams {
        beam_size: options.beam_size,
        branch_factor: options.branch_factor,
        steps_per_iteration: options.steps_per_iteration,
    }
}

/// A monophonic melody generator.
#[derive(Debug, Clone)]
pub struct MelodyGenerator {
    /// Which melody generator this is, deciding its memory
    id: GeneratorId,
    /// Set by `initialize`
    prior: Option<MelodyStats>,
}

impl MelodyGenerator {
    /// An uninitialized generator. `id` should be one of the melody generator ids;
    /// anything else gets the basic model.
    pub fn new(id: GeneratorId) -> Self {
        MelodyGenerator { id, prior: None }
    }

    /// The memory that goes with our id
    fn memory(&self) -> Memory {
        match self.id {
            GeneratorId::LookbackRnn => Memory::Lookback,
            GeneratorId::AttentionRnn => Memory::Attention,
            _ => Memory::Basic,
        }
    }
}

impl SequenceGenerator for MelodyGenerator {
    fn details(&self) -> GeneratorDetails {
        let description = match self.memory() {
            Memory::Basic => "Melody generator with one-note memory",
            Memory::Lookback => "Melody generator that repeats what happened one and two bars ago",
            Memory::Attention => "Melody generator that attends over the last few bars",
        };

        GeneratorDetails {
            id: self.id,
            description,
        }
    }

    fn initialize(&mut self) -> Result<()> {
        let resolution = Resolution::default();
        self.prior = Some(MelodyStats::prior(resolution));
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.prior.is_some()
    }

    fn generate(
        &mut self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence> {
        let prior = self
            .prior
            .as_ref()
            .ok_or_else(|| Error::GeneratorNotInitialized(self.id.as_str()))?;
        let mut plan = Plan::new(primer, options, self.steps_per_quarter())?;

        let history = primer_history(primer, &plan)?;
        let model = MelodyModel {
            stats: prior.learn(&history),
            memory: self.memory(),
            resolution: plan.resolution,
            temperature: options.temperature,
        };

        let base_len = history.len();
        let initial = Voice::after(history, plan.start_step);

        let voice = beam_search(
            initial,
            plan.num_steps,
            beam_params(options),
            &mut plan.rng,
            |voice, rng| model.step(voice, &[], rng),
        );

        push_events(&mut plan, &voice.history[base_len..]);

        log::debug!(
            "{} generated {} step(s) from step {}",
            self.id,
            plan.num_steps,
            plan.start_step
        );

        Ok(plan.finish())
    }
}

/// Most voices the polyphony generator will use
const MAX_VOICES: usize = 4;
/// Voices to use when the primer doesn't suggest a number
const DEFAULT_VOICES: usize = 3;
/// Where voices start when the primer gives them nothing to follow
const DEFAULT_VOICE_PITCHES: [Pitch; MAX_VOICES] = [72, 64, 57, 50];

/// Largest number of notes sounding at once.
fn max_simultaneous(notes: &[QuantizedNote]) -> usize {
    let mut edges = notes
        .iter()
        .filter(|note| !note.is_drum)
        .flat_map(|note| vec![(note.start_step, 1i32), (note.end_step, -1i32)])
        .collect::<Vec<_>>();

    // Ends sort before starts on the same step.
    edges.sort_unstable();

    edges
        .into_iter()
        .scan(0i32, |sounding, (_, delta)| {
            *sounding += delta;
            Some(*sounding)
        })
        .max()
        .unwrap_or(0)
        .max(0) as usize
}

/// Several voices generated together.
#[derive(Debug, Clone, PartialEq)]
struct Chorale {
    /// One entry per voice, highest first
    voices: Vec<Voice>,
}

/// A polyphonic generator: several melody voices stepped in lockstep, each kept off
/// the pitches the others are holding.
#[derive(Debug, Clone, Default)]
pub struct PolyphonyGenerator {
    /// Set by `initialize`
    prior: Option<MelodyStats>,
}

impl PolyphonyGenerator {
    /// An uninitialized generator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceGenerator for PolyphonyGenerator {
    fn details(&self) -> GeneratorDetails {
        GeneratorDetails {
            id: GeneratorId::Polyphony,
            description: "Polyphonic generator with independent voices",
        }
    }

    fn initialize(&mut self) -> Result<()> {
        self.prior = Some(MelodyStats::prior(Resolution::default()));
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.prior.is_some()
    }

    fn generate(
        &mut self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence> {
        let prior = self
            .prior
            .as_ref()
            .ok_or_else(|| Error::GeneratorNotInitialized(GeneratorId::Polyphony.as_str()))?;
        let mut plan = Plan::new(primer, options, self.steps_per_quarter())?;

        let notes = primer.quantize(primer.qpm(), plan.resolution.steps_per_quarter)?;
        let num_voices = match max_simultaneous(&notes) {
            0 => DEFAULT_VOICES,
            n => n.max(2).min(MAX_VOICES),
        };

        let history = primer_history(primer, &plan)?;
        let model = MelodyModel {
            stats: prior.learn(&history),
            memory: Memory::Basic,
            resolution: plan.resolution,
            temperature: options.temperature,
        };

        // Each voice starts from one of the last distinct pitches of the primer,
        // highest first.
        let mut recent = notes
            .iter()
            .rev()
            .filter(|note| !note.is_drum)
            .map(|note| fold_into_range(note.pitch))
            .fold(Vec::new(), |mut acc, pitch| {
                if acc.len() < num_voices && !acc.contains(&pitch) {
                    acc.push(pitch);
                }
                acc
            });
        recent.sort_unstable_by(|a, b| b.cmp(a));

        let base_len = history.len();
        let voices = (0..num_voices)
            .map(|i| {
                let mut voice = Voice::after(history.clone(), plan.start_step);
                voice.last_pitch = recent.get(i).copied().or(Some(DEFAULT_VOICE_PITCHES[i]));
                voice
            })
            .collect();

        let chorale = beam_search(
            Chorale { voices },
            plan.num_steps,
            beam_params(options),
            &mut plan.rng,
            |chorale: &mut Chorale, rng| {
                let mut log_prob = 0.;
                for i in 0..chorale.voices.len() {
                    let avoid = chorale
                        .voices
                        .iter()
                        .enumerate()
                        .filter(|&(j, _)| j != i)
                        .filter_map(|(_, voice)| voice.sounding_pitch())
                        .collect::<Vec<_>>();
                    log_prob += model.step(&mut chorale.voices[i], &avoid, rng);
                }
                log_prob
            },
        );

        for voice in &chorale.voices {
            push_events(&mut plan, &voice.history[base_len..]);
        }

        log::debug!(
            "polyphony generated {} voice(s) over {} step(s)",
            num_voices,
            plan.num_steps
        );

        Ok(plan.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{primer::Melody, timing::GenerationWindow};

    fn options(start_time: f64, end_time: f64, temperature: f64) -> GeneratorOptions {
        GeneratorOptions::for_window(GenerationWindow {
            start_time,
            end_time,
        })
        .with_temperature(temperature)
        .with_seed(Some(42))
    }

    /// Two bars of C E G E in quarter notes, legato.
    fn arpeggio() -> NoteSequence {
        let bar = [60, 64, 67, 64]
            .iter()
            .flat_map(|&pitch| {
                vec![
                    MelodyEvent::NoteOn(pitch),
                    MelodyEvent::NoEvent,
                    MelodyEvent::NoEvent,
                    MelodyEvent::NoEvent,
                ]
            })
            .collect::<Vec<_>>();
        let events = bar.iter().chain(&bar).copied().collect();
        Melody(events).to_sequence(120., 4).unwrap()
    }

    fn initialized(id: GeneratorId) -> MelodyGenerator {
        let mut generator = MelodyGenerator::new(id);
        generator.initialize().unwrap();
        generator
    }

    #[test]
    fn extracts_highest_line() {
        let notes = [
            QuantizedNote {
                pitch: 60,
                velocity: 100,
                start_step: 0,
                end_step: 2,
                is_drum: false,
            },
            QuantizedNote {
                pitch: 67,
                velocity: 100,
                start_step: 0,
                end_step: 3,
                is_drum: false,
            },
            QuantizedNote {
                pitch: 36,
                velocity: 100,
                start_step: 1,
                end_step: 2,
                is_drum: true,
            },
        ];

        assert_eq!(
            extract_melody(&notes, 5),
            vec![
                MelodyEvent::NoteOn(67),
                MelodyEvent::NoEvent,
                MelodyEvent::NoEvent,
                MelodyEvent::NoteOff,
                MelodyEvent::NoEvent,
            ]
        );
    }

    #[test]
    fn folds_pitches_into_range() {
        assert_eq!(fold_into_range(24), 48);
        assert_eq!(fold_into_range(96), 72);
        assert_eq!(fold_into_range(60), 60);
        assert_eq!(event_at(event_index(MelodyEvent::NoteOn(83))), MelodyEvent::NoteOn(83));
    }

    #[test]
    fn notes_stay_in_window_and_range() {
        let primer = arpeggio();
        let mut generator = initialized(GeneratorId::BasicRnn);
        let out = generator.generate(&primer, &options(4., 12., 1.)).unwrap();

        // The primer comes first, untouched.
        assert_eq!(&out.notes()[..primer.notes().len()], primer.notes());
        assert_eq!(out.total_time(), 12.);

        for note in &out.notes()[primer.notes().len()..] {
            assert!(note.start_time >= 4. && note.end_time <= 12.);
            assert!(note.start_time < note.end_time);
            assert!((MIN_PITCH..MAX_PITCH).contains(&note.pitch));
        }
    }

    #[test]
    fn same_seed_same_output() {
        let primer = arpeggio();
        let a = initialized(GeneratorId::AttentionRnn)
            .generate(&primer, &options(4., 8., 1.2))
            .unwrap();
        let b = initialized(GeneratorId::AttentionRnn)
            .generate(&primer, &options(4., 8., 1.2))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn lookback_repeats_the_primer_at_low_temperature() {
        let primer = arpeggio();
        let mut generator = initialized(GeneratorId::LookbackRnn);
        let out = generator.generate(&primer, &options(4., 6., 0.05)).unwrap();

        let generated = out.notes()[primer.notes().len()..]
            .iter()
            .map(|note| note.pitch)
            .collect::<Vec<_>>();
        assert_eq!(generated, vec![60, 64, 67, 64]);
    }

    #[test]
    fn overlapping_window_drops_primer() {
        let primer = arpeggio();
        let mut generator = initialized(GeneratorId::BasicRnn);
        let out = generator.generate(&primer, &options(0., 2., 1.)).unwrap();

        assert!(out.notes().iter().all(|note| note.end_time <= 2.));
        assert_eq!(out.total_time(), 2.);
    }

    #[test]
    fn polyphony_keeps_voices_apart() {
        let mut primer = NoteSequence::new();
        primer.add_tempo(0., 120.);
        for &pitch in &[60, 64, 67] {
            primer.push_note(Note::new(pitch, 100, 0., 2.));
        }

        let mut generator = PolyphonyGenerator::new();
        generator.initialize().unwrap();
        let out = generator
            .generate(&primer, &options(2., 6., 1.).with_beam(2, 2, 4))
            .unwrap();

        let generated = &out.notes()[3..];
        assert!(!generated.is_empty());

        // No two generated notes on the same pitch overlap.
        for (i, a) in generated.iter().enumerate() {
            for b in &generated[i + 1..] {
                if a.pitch == b.pitch {
                    assert!(a.end_time <= b.start_time + 1e-9 || b.end_time <= a.start_time + 1e-9);
                }
            }
        }
        assert!(generated.iter().all(|note| note.start_time >= 2. && note.end_time <= 6.));
    }

    #[test]
    fn counts_simultaneous_notes() {
        let note = |start_step, end_step| QuantizedNote {
            pitch: 60,
            velocity: 100,
            start_step,
            end_step,
            is_drum: false,
        };
        assert_eq!(max_simultaneous(&[]), 0);
        assert_eq!(max_simultaneous(&[note(0, 4), note(4, 8)]), 1);
        assert_eq!(max_simultaneous(&[note(0, 4), note(2, 8), note(3, 5)]), 3);
    }
}
