//! The note sequence: the interchange format between primers, generators and MIDI.
//!
//! Times are absolute and in seconds, which is what generators are given their
//! windows in. Steps only appear once a sequence is quantized.

use crate::{
    error::{Error, Result},
    timing,
};

/// A MIDI note number (middle C is 60)
pub type Pitch = u8;

/// A single sounding note.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Note {
    /// The MIDI note number
    pub pitch: Pitch,
    /// The note-on velocity
    pub velocity: u8,
    /// When the note starts, in seconds
    pub start_time: f64,
    /// When the note stops, in seconds
    pub end_time: f64,
    /// Whether this is a percussion hit, which ends up on the MIDI drum channel
    pub is_drum: bool,
}

impl Note {
    /// A pitched note.
    pub fn new(pitch: Pitch, velocity: u8, start_time: f64, end_time: f64) -> Self {
        Note {
            pitch,
            velocity,
            start_time,
            end_time,
            is_drum: false,
        }
    }

    /// A drum hit. `pitch` selects the instrument from the General MIDI drum map.
    pub fn drum(pitch: Pitch, velocity: u8, start_time: f64, end_time: f64) -> Self {
        Note {
            is_drum: true,
            ..Note::new(pitch, velocity, start_time, end_time)
        }
    }
}

/// A tempo marking, taking effect at `time`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TempoChange {
    /// When the tempo takes effect, in seconds
    pub time: f64,
    /// Quarters per minute
    pub qpm: f64,
}

/// A note snapped to the step grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QuantizedNote {
    /// The MIDI note number
    pub pitch: Pitch,
    /// The note-on velocity
    pub velocity: u8,
    /// First step the note sounds on
    pub start_step: u64,
    /// Step the note stops on. Always after `start_step`.
    pub end_step: u64,
    /// Whether this is a percussion hit
    pub is_drum: bool,
}

/// An ordered collection of notes with tempo markings and a total length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoteSequence {
    /// The notes, in the order they were added
    notes: Vec<Note>,
    /// Tempo markings, sorted by time
    tempos: Vec<TempoChange>,
    /// Length of the sequence in seconds. This is at least the end of the last note,
    /// but can be longer when the sequence ends with a rest.
    total_time: f64,
}

impl NoteSequence {
    /// An empty sequence with no tempo marking.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty sequence that keeps the tempo markings of `other`.
    pub fn with_tempos_of(other: &NoteSequence) -> Self {
        NoteSequence {
            tempos: other.tempos.clone(),
            ..Self::default()
        }
    }

    /// Add a note, growing the total time to cover it.
    pub fn push_note(&mut self, note: Note) {
        self.extend_to(note.end_time);
        self.notes.push(note);
    }

    /// Add a tempo marking. Markings are kept sorted by time.
    pub fn add_tempo(&mut self, time: f64, qpm: f64) {
        let index = self
            .tempos
            .iter()
            .position(|tempo| tempo.time > time)
            .unwrap_or_else(|| self.tempos.len());
        self.tempos.insert(index, TempoChange { time, qpm });
    }

    /// Make the sequence at least `time` seconds long.
    pub fn extend_to(&mut self, time: f64) {
        if time > self.total_time {
            self.total_time = time;
        }
    }

    /// The notes in insertion order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// The tempo markings in time order.
    pub fn tempos(&self) -> &[TempoChange] {
        &self.tempos
    }

    /// Length in seconds.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// A sequence is empty when it has no notes, regardless of tempo markings.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The tempo to measure this sequence in: the first tempo marking of a non-empty
    /// sequence, or the default tempo if there is no marking to go by.
    pub fn qpm(&self) -> f64 {
        match self.tempos.first() {
            Some(tempo) if !self.is_empty() => tempo.qpm,
            _ => timing::DEFAULT_QUARTERS_PER_MINUTE,
        }
    }

    /// Snap every note to the step grid at `qpm`. Notes are returned sorted by start
    /// step, and every note lasts at least one step.
    pub fn quantize(&self, qpm: f64, steps_per_quarter: u32) -> Result<Vec<QuantizedNote>> {
        let step = timing::seconds_per_step(qpm, steps_per_quarter)?;
        let to_step = |time: f64| (time.max(0.) / step).round() as u64;

        let mut out = self
            .notes
            .iter()
            .map(|note| {
                let start_step = to_step(note.start_time);

                QuantizedNote {
                    pitch: note.pitch,
                    velocity: note.velocity,
                    start_step,
                    end_step: to_step(note.end_time).max(start_step + 1),
                    is_drum: note.is_drum,
                }
            })
            .collect::<Vec<_>>();

        out.sort_by_key(|note| (note.start_step, note.pitch));

        Ok(out)
    }

    /// Length of the sequence in whole steps at `qpm`, rounding a partial step up.
    pub fn total_steps(&self, qpm: f64, steps_per_quarter: u32) -> Result<u64> {
        let step = timing::seconds_per_step(qpm, steps_per_quarter)?;

        Ok((self.total_time / step - 1e-6).ceil().max(0.) as u64)
    }

    /// The tempo in force at `time`: the last marking at or before it, falling back
    /// to the first marking and then to the default tempo.
    fn qpm_at(&self, time: f64) -> f64 {
        self.tempos
            .iter()
            .take_while(|tempo| tempo.time <= time + 1e-9)
            .last()
            .or_else(|| self.tempos.first())
            .map_or(timing::DEFAULT_QUARTERS_PER_MINUTE, |tempo| tempo.qpm)
    }

    /// The part of the sequence that is over by `time`: the notes that have ended by
    /// then and the tempo markings up to then. The result is at most `time` long.
    pub fn notes_ending_by(&self, time: f64) -> NoteSequence {
        let mut out = NoteSequence::with_tempos_of(self);
        out.tempos.retain(|tempo| tempo.time <= time + 1e-9);

        for note in self.notes.iter().filter(|note| note.end_time <= time + 1e-9) {
            out.push_note(*note);
        }
        out.extend_to(self.total_time.min(time));

        out
    }

    /// Join `sequences` end to end.
    ///
    /// Each sequence starts where the previous one ends. With `durations`, each one
    /// instead starts that many seconds after the previous one started, so parts that
    /// end in silence still take up their full length. Tempo markings are carried
    /// over, skipping ones that don't change the tempo.
    pub fn concatenate(sequences: &[NoteSequence], durations: Option<&[f64]>) -> Result<Self> {
        if let Some(durations) = durations {
            if durations.len() != sequences.len() {
                return Err(Error::invalid(format!(
                    "{} duration(s) given for {} sequence(s)",
                    durations.len(),
                    sequences.len()
                )));
            }
            if let Some(bad) = durations.iter().find(|d| !(d.is_finite() && **d >= 0.)) {
                return Err(Error::invalid(format!("bad sequence duration {}", bad)));
            }
        }

        let mut out = NoteSequence::new();
        let mut offset = 0.;

        for (i, seq) in sequences.iter().enumerate() {
            for tempo in &seq.tempos {
                if out.tempos.last().map(|last| last.qpm) != Some(tempo.qpm) {
                    out.add_tempo(offset + tempo.time, tempo.qpm);
                }
            }

            for note in &seq.notes {
                out.push_note(Note {
                    start_time: note.start_time + offset,
                    end_time: note.end_time + offset,
                    ..*note
                });
            }

            offset += durations.map_or(seq.total_time, |durations| durations[i]);
            out.extend_to(offset);
        }

        Ok(out)
    }

    /// Cut the sequence into consecutive pieces `seconds` long, the last of which may
    /// be shorter. Every piece starts at zero with the tempo in force where it was cut.
    /// A note goes to the piece it starts in and is cut off at the end of that piece.
    pub fn split_every(&self, seconds: f64) -> Result<Vec<NoteSequence>> {
        if !(seconds.is_finite() && seconds > 0.) {
            return Err(Error::invalid(format!(
                "pieces must be a positive number of seconds long, got {}",
                seconds
            )));
        }

        let count = (self.total_time / seconds - 1e-9).ceil().max(0.) as usize;

        let mut pieces = (0..count)
            .map(|i| {
                let start = i as f64 * seconds;
                let mut piece = NoteSequence::new();

                piece.add_tempo(0., self.qpm_at(start));
                for tempo in self.tempos.iter().filter(|tempo| {
                    tempo.time > start + 1e-9 && tempo.time < start + seconds - 1e-9
                }) {
                    piece.add_tempo(tempo.time - start, tempo.qpm);
                }

                piece
            })
            .collect::<Vec<_>>();

        for note in &self.notes {
            let index = (note.start_time / seconds + 1e-9).floor().max(0.) as usize;

            if let Some(piece) = pieces.get_mut(index) {
                let start = index as f64 * seconds;
                piece.push_note(Note {
                    start_time: (note.start_time - start).max(0.),
                    end_time: (note.end_time - start).min(seconds),
                    ..*note
                });
            }
        }

        for (i, piece) in pieces.iter_mut().enumerate() {
            piece.extend_to((self.total_time - i as f64 * seconds).min(seconds));
        }

        Ok(pieces)
    }

    /// [`split_every`](Self::split_every) in pieces of `bars` whole bars at the
    /// sequence's tempo.
    pub fn split_into_bars(&self, bars: u32) -> Result<Vec<NoteSequence>> {
        if bars < 1 {
            return Err(Error::invalid("pieces must be at least one bar long"));
        }

        self.split_every(bars as f64 * timing::seconds_per_bar(self.qpm())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_time_follows_latest_note() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(60, 100, 0., 1.5));
        seq.push_note(Note::new(62, 100, 0.5, 1.0));
        assert_eq!(seq.total_time(), 1.5);

        seq.extend_to(1.0);
        assert_eq!(seq.total_time(), 1.5);
        seq.extend_to(2.0);
        assert_eq!(seq.total_time(), 2.0);
    }

    #[test]
    fn tempo_markings_stay_sorted() {
        let mut seq = NoteSequence::new();
        seq.add_tempo(4., 90.);
        seq.add_tempo(0., 140.);
        seq.push_note(Note::new(60, 100, 0., 1.));

        assert_eq!(seq.tempos()[0].qpm, 140.);
        assert_eq!(seq.qpm(), 140.);
    }

    #[test]
    fn empty_sequence_uses_default_tempo() {
        let mut seq = NoteSequence::new();
        seq.add_tempo(0., 80.);
        assert!(seq.is_empty());
        assert_eq!(seq.qpm(), timing::DEFAULT_QUARTERS_PER_MINUTE);
    }

    #[test]
    fn quantize_snaps_to_steps() {
        let mut seq = NoteSequence::new();
        // A sixteenth at 120 qpm is 0.125s.
        seq.push_note(Note::new(64, 90, 0.26, 0.49));
        seq.push_note(Note::drum(36, 100, 0.0, 0.01));

        let notes = seq.quantize(120., 4).unwrap();
        assert_eq!(
            notes,
            vec![
                QuantizedNote {
                    pitch: 36,
                    velocity: 100,
                    start_step: 0,
                    end_step: 1,
                    is_drum: true,
                },
                QuantizedNote {
                    pitch: 64,
                    velocity: 90,
                    start_step: 2,
                    end_step: 4,
                    is_drum: false,
                },
            ]
        );
    }

    #[test]
    fn total_steps_rounds_up() {
        let mut seq = NoteSequence::new();
        seq.extend_to(2.0);
        assert_eq!(seq.total_steps(120., 4).unwrap(), 16);
        seq.extend_to(2.01);
        assert_eq!(seq.total_steps(120., 4).unwrap(), 17);
    }

    fn two_bar_piece(pitch: Pitch) -> NoteSequence {
        let mut seq = NoteSequence::new();
        seq.add_tempo(0., 120.);
        seq.push_note(Note::new(pitch, 100, 0., 1.));
        seq.push_note(Note::new(pitch + 2, 100, 1., 3.5));
        seq
    }

    #[test]
    fn notes_ending_by_keeps_finished_notes() {
        let mut seq = two_bar_piece(60);
        seq.add_tempo(3., 90.);

        let head = seq.notes_ending_by(2.);
        assert_eq!(head.notes(), &seq.notes()[..1]);
        assert_eq!(head.tempos().len(), 1);
        assert_eq!(head.total_time(), 2.);

        assert_eq!(seq.notes_ending_by(10.).total_time(), 3.5);
        assert!(seq.notes_ending_by(0.).is_empty());
    }

    #[test]
    fn concatenate_places_parts_end_to_end() {
        let parts = [two_bar_piece(60), two_bar_piece(70)];

        let joined = NoteSequence::concatenate(&parts, None).unwrap();
        assert_eq!(joined.total_time(), 7.);
        assert_eq!(joined.notes()[2].start_time, 3.5);
        assert_eq!(joined.tempos().len(), 1);

        // Padded to two bars each, the trailing rest is kept.
        let padded = NoteSequence::concatenate(&parts, Some(&[4., 4.])).unwrap();
        assert_eq!(padded.total_time(), 8.);
        assert_eq!(padded.notes()[2], Note::new(70, 100, 4., 5.));
    }

    #[test]
    fn concatenate_checks_durations() {
        let parts = [two_bar_piece(60), two_bar_piece(70)];
        assert!(NoteSequence::concatenate(&parts, Some(&[4.])).is_err());
        assert!(NoteSequence::concatenate(&parts, Some(&[4., -1.])).is_err());
        assert!(NoteSequence::concatenate(&[], None).unwrap().is_empty());
    }

    #[test]
    fn split_undoes_padded_concatenate() {
        let parts = [two_bar_piece(60), two_bar_piece(70)];
        let joined = NoteSequence::concatenate(&parts, Some(&[4., 4.])).unwrap();

        let pieces = joined.split_every(4.).unwrap();
        assert_eq!(pieces.len(), 2);
        for (piece, part) in pieces.iter().zip(&parts) {
            assert_eq!(piece.notes(), part.notes());
            assert_eq!(piece.total_time(), 4.);
            assert_eq!(piece.qpm(), 120.);
        }
    }

    #[test]
    fn split_cuts_notes_at_piece_end() {
        let mut seq = NoteSequence::new();
        seq.add_tempo(0., 120.);
        seq.push_note(Note::new(60, 100, 1., 3.));
        seq.extend_to(5.);

        let pieces = seq.split_into_bars(1).unwrap();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].notes(), &[Note::new(60, 100, 1., 2.)]);
        assert!(pieces[1].is_empty());
        assert_eq!(pieces[2].total_time(), 1.);

        assert!(seq.split_into_bars(0).is_err());
        assert!(seq.split_every(0.).is_err());
    }
}
