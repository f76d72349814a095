//! Primers: existing material that a generator continues from.
//!
//! A primer is just a `NoteSequence`, either read from a MIDI file or built from a
//! step pattern (a drum track or a monophonic melody).

use crate::{
    error::{Error, Result},
    midi,
    sequence::{Note, NoteSequence, Pitch},
    timing,
};
use arrayvec::ArrayVec;
use serde::Deserialize;
use std::path::Path;

/// Velocity given to notes of primers built from step patterns
pub const DEFAULT_PRIMER_VELOCITY: u8 = 100;

/// The most drums that can be hit on one step. The drum kit is reduced to nine
/// classes (kick, snare, closed hat, open hat, three toms, crash, ride), so more
/// than this on one step can only be duplicates.
pub const MAX_DRUMS_PER_STEP: usize = 9;

/// The drums hit on a single step. Empty for a rest.
pub type DrumStep = ArrayVec<[Pitch; MAX_DRUMS_PER_STEP]>;

/// A drum pattern, one set of drum pitches per step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrumTrack {
    /// The drums hit on each step
    steps: Vec<DrumStep>,
}

impl DrumTrack {
    /// Build a drum track from per-step pitch lists. Duplicate pitches within a step
    /// are merged.
    pub fn from_steps<S: AsRef<[Pitch]>>(steps: &[S]) -> Result<Self> {
        let steps = steps
            .iter()
            .enumerate()
            .map(|(index, pitches)| {
                let mut step = DrumStep::new();

                for &pitch in pitches.as_ref() {
                    if step.contains(&pitch) {
                        continue;
                    }
                    step.try_push(pitch).map_err(|_| {
                        Error::invalid(format!(
                            "step {} hits more than {} different drums",
                            index, MAX_DRUMS_PER_STEP
                        ))
                    })?;
                }

                step.sort_unstable();

                Ok(step)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DrumTrack { steps })
    }

    /// The per-step drum sets.
    pub fn steps(&self) -> &[DrumStep] {
        &self.steps
    }

    /// Convert to a note sequence at `qpm`. Each hit lasts one step, and the sequence
    /// lasts for every step of the pattern, trailing rests included, so a one-bar
    /// pattern is exactly one bar long.
    pub fn to_sequence(&self, qpm: f64, steps_per_quarter: u32) -> Result<NoteSequence> {
        let step = timing::seconds_per_step(qpm, steps_per_quarter)?;
        let mut seq = NoteSequence::new();

        seq.add_tempo(0., qpm);

        for (index, pitches) in self.steps.iter().enumerate() {
            let start = index as f64 * step;

            for &pitch in pitches {
                seq.push_note(Note::drum(pitch, DEFAULT_PRIMER_VELOCITY, start, start + step));
            }
        }

        seq.extend_to(self.steps.len() as f64 * step);

        Ok(seq)
    }
}

/// One step of a monophonic melody.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum MelodyEvent {
    /// Start a note, ending any note that's still sounding
    NoteOn(Pitch),
    /// Stop the current note
    NoteOff,
    /// Keep doing whatever the previous step was doing
    NoEvent,
}

/// A monophonic melody, one event per step.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Melody(pub Vec<MelodyEvent>);

impl Melody {
    /// Convert to a note sequence at `qpm`. A note that's still sounding at the end
    /// of the melody stops at the end of the last step.
    pub fn to_sequence(&self, qpm: f64, steps_per_quarter: u32) -> Result<NoteSequence> {
        let step = timing::seconds_per_step(qpm, steps_per_quarter)?;
        let mut seq = NoteSequence::new();
        let mut sounding: Option<(Pitch, usize)> = None;

        seq.add_tempo(0., qpm);

        let end_note = |seq: &mut NoteSequence, sounding: Option<(Pitch, usize)>, at: usize| {
            if let Some((pitch, started)) = sounding {
                seq.push_note(Note::new(
                    pitch,
                    DEFAULT_PRIMER_VELOCITY,
                    started as f64 * step,
                    at as f64 * step,
                ));
            }
        };

        for (index, event) in self.0.iter().enumerate() {
            match *event {
                MelodyEvent::NoteOn(pitch) => {
                    end_note(&mut seq, sounding.take(), index);
                    sounding = Some((pitch, index));
                }
                MelodyEvent::NoteOff => end_note(&mut seq, sounding.take(), index),
                MelodyEvent::NoEvent => {}
            }
        }

        end_note(&mut seq, sounding, self.0.len());
        seq.extend_to(self.0.len() as f64 * step);

        Ok(seq)
    }
}

/// Load a primer from a MIDI file, or an empty primer if there's no file.
pub fn load_primer(path: Option<&Path>) -> Result<NoteSequence> {
    match path {
        Some(path) => {
            let primer = midi::read_midi(path)?;
            log::info!(
                "loaded primer {:?}: {} note(s), {:.3}s",
                path,
                primer.notes().len(),
                primer.total_time()
            );
            Ok(primer)
        }
        None => Ok(NoteSequence::new()),
    }
}
