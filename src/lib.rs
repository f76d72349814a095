#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Bar-aligned sequence generation
//!
//! Works out where in time new musical material should go, then fills that
//! window with a generator and writes the result as a MIDI file.
//!
//! The window is always a whole number of bars long. Its length comes from the
//! primer's tempo (or 120 quarters per minute if the primer has none) at four
//! steps per quarter and sixteen steps per bar, so one bar at the default tempo
//! is two seconds. The window either starts at zero or right where the primer
//! ends, see `timing::generation_window`.
//!
//! The generators are small statistical models that learn what they can from the
//! primer and sample step by step, optionally under beam search. They live in a
//! fixed registry keyed by model family and generator id, see `generator`.
//!
//! `pipeline` strings all of this together, and the binary drives `pipeline` from
//! RON commands on stdin.

pub mod beam;
pub mod error;
pub mod generator;
pub mod midi;
pub mod options;
pub mod pipeline;
pub mod primer;
pub mod sequence;
pub mod timing;

pub use error::{Error, Result};
pub use options::GeneratorOptions;
pub use pipeline::{GenerationRequest, Primer};
pub use sequence::{Note, NoteSequence};
pub use timing::{generation_window, seconds_per_bar, GenerationWindow};
