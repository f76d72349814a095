//! Conversion between `NoteSequence` and standard MIDI files.
//!
//! I use `ghakuf` for the actual SMF encoding, same as for everything else that
//! touches MIDI in this crate. Its writer borrows every `Message` it's given, so we
//! build the owned messages into a `Vec` first and hand out references to that.
//! Its reader is callback-based, so reading goes through a `Handler` that
//! accumulates absolute ticks and converts them to seconds at the end.

use crate::{
    error::{Error, Result},
    sequence::{Note, NoteSequence, TempoChange},
    timing,
};
use ghakuf::{
    messages::{Message, MetaEvent, MidiEvent, SysExEvent},
    reader::{Handler, Reader},
    writer::Writer,
};
use std::{collections::HashMap, path::Path};

/// The SMF time base of the files we write. This matches the resolution that the
/// pretrained models' own MIDI tooling writes with.
pub const TICKS_PER_QUARTER: u16 = 220;
/// General MIDI puts percussion on channel 10, which is 9 when counting from zero
const DRUM_CHANNEL: u8 = 9;
/// Channel for pitched notes
const MELODIC_CHANNEL: u8 = 0;
/// Microseconds in a minute, for converting between QPM and the "set tempo" meta event
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.;

/// Turn a "set tempo" payload (microseconds per quarter, 24-bit big-endian) into QPM.
fn decode_tempo(data: &[u8]) -> Option<f64> {
    match *data {
        [a, b, c] => {
            let micros = (a as u32) << 16 | (b as u32) << 8 | c as u32;
            if micros == 0 {
                None
            } else {
                Some(MICROSECONDS_PER_MINUTE / micros as f64)
            }
        }
        _ => None,
    }
}

/// Turn QPM into a "set tempo" payload.
fn encode_tempo(qpm: f64) -> Vec<u8> {
    let micros = (MICROSECONDS_PER_MINUTE / qpm).round().min(0xff_ffff as f64) as u32;
    [(micros >> 16) as u8, (micros >> 8) as u8, micros as u8].to_vec()
}

/// A point where the tempo changes, with its position in both ticks and seconds.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Segment {
    /// Position in ticks
    tick: f64,
    /// Position in seconds
    time: f64,
    /// Tempo from here until the next segment
    qpm: f64,
}

/// Piecewise-constant tempo, for converting between ticks and seconds.
#[derive(Debug, Clone, PartialEq)]
struct TempoMap {
    /// The SMF time base
    ticks_per_quarter: f64,
    /// Never empty. The first segment is always at zero.
    segments: Vec<Segment>,
}

impl TempoMap {
    /// Start a map at the given tempo.
    fn starting_at(qpm: f64, ticks_per_quarter: u16) -> Self {
        TempoMap {
            ticks_per_quarter: ticks_per_quarter as f64,
            segments: vec![Segment {
                tick: 0.,
                time: 0.,
                qpm,
            }],
        }
    }

    /// Length of a tick at `qpm`, in seconds
    fn seconds_per_tick(&self, qpm: f64) -> f64 {
        60. / qpm / self.ticks_per_quarter
    }

    /// The last segment, which new changes are measured from
    fn last(&self) -> Segment {
        // `segments` is never empty, see `starting_at`.
        self.segments[self.segments.len() - 1]
    }

    /// Change tempo at an absolute tick. Changes must be added in order.
    fn push_at_tick(&mut self, tick: f64, qpm: f64) {
        let last = self.last();

        if tick <= last.tick {
            let index = self.segments.len() - 1;
            self.segments[index].qpm = qpm;
            return;
        }

        let time = last.time + (tick - last.tick) * self.seconds_per_tick(last.qpm);
        self.segments.push(Segment { tick, time, qpm });
    }

    /// Change tempo at an absolute time. Changes must be added in order.
    fn push_at_time(&mut self, time: f64, qpm: f64) {
        let last = self.last();

        if time <= last.time {
            let index = self.segments.len() - 1;
            self.segments[index].qpm = qpm;
            return;
        }

        let tick = last.tick + (time - last.time) / self.seconds_per_tick(last.qpm);
        self.segments.push(Segment { tick, time, qpm });
    }

    /// Convert an absolute tick to seconds.
    fn to_seconds(&self, tick: u64) -> f64 {
        let tick = tick as f64;
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|segment| segment.tick <= tick)
            .copied()
            .unwrap_or_else(|| self.segments[0]);

        segment.time + (tick - segment.tick) * self.seconds_per_tick(segment.qpm)
    }

    /// Convert an absolute time to the nearest tick.
    fn to_ticks(&self, time: f64) -> u64 {
        let time = time.max(0.);
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|segment| segment.time <= time)
            .copied()
            .unwrap_or_else(|| self.segments[0]);

        (segment.tick + (time - segment.time) / self.seconds_per_tick(segment.qpm)).round() as u64
    }
}

/// Collects the events of a MIDI file as `ghakuf` walks through it.
#[derive(Default)]
struct SequenceHandler {
    /// The time base from the header, or an error message if it was unusable
    time_base: Option<Result<u16, String>>,
    /// Absolute tick within the current track
    tick: u64,
    /// `(tick, qpm)` for every tempo change, across all tracks
    tempos: Vec<(u64, f64)>,
    /// Finished notes as `(start tick, end tick, pitch, velocity, is drum)`
    notes: Vec<(u64, u64, u8, u8, bool)>,
    /// Notes that have started but not finished, keyed by channel and pitch
    open: HashMap<(u8, u8), (u64, u8)>,
}

impl SequenceHandler {
    /// Finish every sounding note at the current tick.
    fn close_all(&mut self) {
        let tick = self.tick;
        let notes = &mut self.notes;

        notes.extend(
            self.open
                .drain()
                .map(|((ch, pitch), (start, velocity))| {
                    (start, tick, pitch, velocity, ch == DRUM_CHANNEL)
                }),
        );
    }

    /// Finish the note at `(ch, pitch)` if it's sounding.
    fn note_off(&mut self, ch: u8, pitch: u8) {
        if let Some((start, velocity)) = self.open.remove(&(ch, pitch)) {
            self.notes
                .push((start, self.tick, pitch, velocity, ch == DRUM_CHANNEL));
        }
    }
}

impl Handler for SequenceHandler {
    fn header(&mut self, format: u16, track: u16, time_base: u16) {
        log::trace!("SMF format {}, {} track(s), time base {:#x}", format, track, time_base);

        // The top bit selects SMPTE timing, which we don't support.
        self.time_base = Some(if time_base & 0x8000 != 0 || time_base == 0 {
            Err(format!("unsupported time base {:#x}", time_base))
        } else {
            Ok(time_base)
        });
    }

    fn meta_event(&mut self, delta_time: u32, event: &MetaEvent, data: &Vec<u8>) {
        self.tick += delta_time as u64;

        if let MetaEvent::SetTempo = event {
            if let Some(qpm) = decode_tempo(data) {
                self.tempos.push((self.tick, qpm));
            }
        }
    }

    fn midi_event(&mut self, delta_time: u32, event: &MidiEvent) {
        self.tick += delta_time as u64;

        match *event {
            MidiEvent::NoteOn { ch, note, velocity } if velocity > 0 => {
                // A repeated note-on without a note-off in between retriggers the note.
                self.note_off(ch, note);
                self.open.insert((ch, note), (self.tick, velocity));
            }
            MidiEvent::NoteOn { ch, note, .. } | MidiEvent::NoteOff { ch, note, .. } => {
                self.note_off(ch, note)
            }
            _ => {}
        }
    }

    fn sys_ex_event(&mut self, delta_time: u32, _event: &SysExEvent, _data: &Vec<u8>) {
        self.tick += delta_time as u64;
    }

    fn track_change(&mut self) {
        self.close_all();
        self.tick = 0;
    }
}

/// Read a standard MIDI file into a note sequence. All tracks are merged, tempo
/// changes become tempo markings and notes on channel 10 become drum hits.
pub fn read_midi(path: &Path) -> Result<NoteSequence> {
    let read_error = |reason: String| Error::MidiRead {
        path: path.to_owned(),
        reason,
    };

    let mut handler = SequenceHandler::default();

    {
        let mut reader =
            Reader::new(&mut handler, path).map_err(|e| read_error(format!("{:?}", e)))?;
        reader.read().map_err(|e| read_error(format!("{:?}", e)))?;
    }

    handler.close_all();

    let time_base = handler
        .time_base
        .take()
        .unwrap_or_else(|| Err("missing header".to_owned()))
        .map_err(read_error)?;

    handler.tempos.sort_by_key(|&(tick, _)| tick);

    let mut tempo_map = TempoMap::starting_at(timing::DEFAULT_QUARTERS_PER_MINUTE, time_base);
    for &(tick, qpm) in &handler.tempos {
        tempo_map.push_at_tick(tick as f64, qpm);
    }

    let mut seq = NoteSequence::new();

    for &(tick, qpm) in &handler.tempos {
        seq.add_tempo(tempo_map.to_seconds(tick), qpm);
    }

    handler.notes.sort_by_key(|&(start, _, pitch, ..)| (start, pitch));

    for &(start, end, pitch, velocity, is_drum) in &handler.notes {
        let note = Note {
            pitch,
            velocity,
            start_time: tempo_map.to_seconds(start),
            end_time: tempo_map.to_seconds(end),
            is_drum,
        };
        seq.push_note(note);
    }

    log::debug!(
        "read {:?}: {} note(s), {} tempo marking(s)",
        path,
        seq.notes().len(),
        seq.tempos().len()
    );

    Ok(seq)
}

/// A MIDI event waiting to be given a delta time.
enum Pending {
    /// A meta event and its payload
    Meta(MetaEvent, Vec<u8>),
    /// A channel event
    Midi(MidiEvent),
}

/// Sort key for events on the same tick: tempo and meta first, then note-offs, then
/// note-ons, so that a note ending exactly where the next one starts doesn't cut off
/// its successor.
fn priority(event: &Pending) -> u8 {
    match event {
        Pending::Meta(..) => 0,
        Pending::Midi(MidiEvent::NoteOff { .. }) => 1,
        Pending::Midi(_) => 2,
    }
}

/// Build the messages for a single-track MIDI file holding `seq`.
fn sequence_to_messages(seq: &NoteSequence) -> Result<Vec<Message>> {
    let tempos: &[TempoChange] = seq.tempos();

    if let Some(bad) = tempos.iter().find(|tempo| !(tempo.qpm.is_finite() && tempo.qpm > 0.)) {
        return Err(Error::invalid(format!("cannot write tempo marking {:?}", bad)));
    }

    let initial_qpm = match tempos.first() {
        Some(tempo) if tempo.time <= 0. => tempo.qpm,
        _ => timing::DEFAULT_QUARTERS_PER_MINUTE,
    };

    let mut tempo_map = TempoMap::starting_at(initial_qpm, TICKS_PER_QUARTER);
    for tempo in tempos {
        tempo_map.push_at_time(tempo.time, tempo.qpm);
    }

    let mut events: Vec<(u64, Pending)> =
        Vec::with_capacity(seq.notes().len() * 2 + tempos.len() + 2);

    events.push((0, Pending::Meta(MetaEvent::SetTempo, encode_tempo(initial_qpm))));
    // 4/4, a click every quarter, eight 32nds per quarter
    events.push((0, Pending::Meta(MetaEvent::TimeSignature, vec![4, 2, 24, 8])));

    for tempo in tempos.iter().filter(|tempo| tempo.time > 0.) {
        events.push((
            tempo_map.to_ticks(tempo.time),
            Pending::Meta(MetaEvent::SetTempo, encode_tempo(tempo.qpm)),
        ));
    }

    for note in seq.notes() {
        let ch = if note.is_drum {
            DRUM_CHANNEL
        } else {
            MELODIC_CHANNEL
        };
        let start = tempo_map.to_ticks(note.start_time);
        let end = tempo_map.to_ticks(note.end_time).max(start + 1);
        let pitch = note.pitch.min(127);

        events.push((
            start,
            Pending::Midi(MidiEvent::NoteOn {
                ch,
                note: pitch,
                velocity: note.velocity.min(127).max(1),
            }),
        ));
        events.push((
            end,
            Pending::Midi(MidiEvent::NoteOff {
                ch,
                note: pitch,
                velocity: 0,
            }),
        ));
    }

    // Stable, so notes added first keep their order within a tick.
    events.sort_by_key(|(tick, event)| (*tick, priority(event)));

    let end_tick = events
        .last()
        .map(|&(tick, _)| tick)
        .unwrap_or(0)
        .max(tempo_map.to_ticks(seq.total_time()));

    let mut last_tick = 0;
    let mut messages = events
        .into_iter()
        .map(|(tick, event)| {
            let delta_time = (tick - last_tick) as u32;
            last_tick = tick;

            match event {
                Pending::Meta(event, data) => Message::MetaEvent {
                    delta_time,
                    event,
                    data,
                },
                Pending::Midi(event) => Message::MidiEvent { delta_time, event },
            }
        })
        .collect::<Vec<_>>();

    messages.push(Message::MetaEvent {
        delta_time: (end_tick - last_tick) as u32,
        event: MetaEvent::EndOfTrack,
        data: vec![],
    });

    Ok(messages)
}

/// Write `seq` to `path` as a single-track standard MIDI file.
pub fn write_midi(seq: &NoteSequence, path: &Path) -> Result<()> {
    let messages = sequence_to_messages(seq)?;
    let mut writer = Writer::new();

    writer.time_base(TICKS_PER_QUARTER);

    for msg in &messages {
        writer.push(msg);
    }

    writer.write(path).map_err(|e| Error::MidiWrite {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;

    log::debug!("wrote {} message(s) to {:?}", messages.len(), path);

    Ok(())
}
