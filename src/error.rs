//! The crate-wide error type.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Everything that can go wrong between reading a request and writing a MIDI file.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value was out of range (non-positive tempo, zero bars, a
    /// temperature of zero, and so on).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The model/generator pair isn't in the registry.
    #[error("no generator `{generator}` for model `{model}`")]
    UnknownGenerator {
        /// Model family that was asked for
        model: String,
        /// Generator id that was asked for
        generator: String,
    },
    /// `generate` was called before `initialize`.
    #[error("generator `{0}` has not been initialized")]
    GeneratorNotInitialized(&'static str),
    /// The primer file couldn't be parsed as a standard MIDI file.
    #[error("failed to read MIDI file {path:?}: {reason}")]
    MidiRead {
        /// The file we tried to read
        path: PathBuf,
        /// What `ghakuf` (or our own checks) complained about
        reason: String,
    },
    /// Serialising the output MIDI file failed.
    #[error("failed to write MIDI file {path:?}: {reason}")]
    MidiWrite {
        /// The file we tried to write
        path: PathBuf,
        /// What `ghakuf` complained about
        reason: String,
    },
    /// A command line on stdin wasn't valid RON for a `Command`.
    #[error("malformed command: {0}")]
    BadCommand(String),
    /// Filesystem error, e.g. when creating the output directory.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Shorthand for building an `InvalidArgument` from anything printable.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
