//! Bar-aligned timing.
//!
//! Generators take their generation bounds in seconds, but music sounds off when a
//! generated section stops part of the way through a bar. Everything here converts
//! between tempo, steps and bars so that a requested number of bars turns into a
//! window of whole bars in seconds.

use crate::{
    error::{Error, Result},
    sequence::NoteSequence,
};
use num_integer::Integer;
use serde::Deserialize;

/// Tempo used whenever there's no tempo marking to go by.
pub const DEFAULT_QUARTERS_PER_MINUTE: f64 = 120.;
/// Resolution of a quantized step, in steps per quarter note.
pub const DEFAULT_STEPS_PER_QUARTER: u32 = 4;
/// Steps in a bar of 4/4 at the default resolution.
pub const DEFAULT_STEPS_PER_BAR: u32 = 16;

/// Seconds in a minute, since tempo is given per minute
const SECONDS_PER_MINUTE: f64 = 60.;

/// The musical resolution that steps and bars are measured in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Subdivisions of a quarter note
    pub steps_per_quarter: u32,
    /// Subdivisions of a bar
    pub steps_per_bar: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution {
            steps_per_quarter: DEFAULT_STEPS_PER_QUARTER,
            steps_per_bar: DEFAULT_STEPS_PER_BAR,
        }
    }
}

impl Resolution {
    /// Reject resolutions with zero steps, which would make every duration infinite.
    fn check(&self) -> Result<()> {
        if self.steps_per_quarter == 0 || self.steps_per_bar == 0 {
            return Err(Error::invalid(format!(
                "resolution must have at least one step per quarter and per bar, got {:?}",
                self
            )));
        }

        Ok(())
    }

    /// Index of `step` within its bar.
    pub fn position_in_bar(&self, step: u64) -> u32 {
        Integer::mod_floor(&step, &(self.steps_per_bar as u64)) as u32
    }
}

/// Checks that a tempo can be divided by. Infinite and NaN tempos are refused as
/// well as non-positive ones, since they'd produce a zero or NaN bar length.
fn check_tempo(qpm: f64) -> Result<()> {
    if qpm.is_finite() && qpm > 0. {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "tempo must be a positive number of quarters per minute, got {}",
            qpm
        )))
    }
}

/// Length of a single step in seconds.
pub fn seconds_per_step(qpm: f64, steps_per_quarter: u32) -> Result<f64> {
    check_tempo(qpm)?;

    if steps_per_quarter == 0 {
        return Err(Error::invalid("steps per quarter must be at least 1"));
    }

    Ok(SECONDS_PER_MINUTE / qpm / steps_per_quarter as f64)
}

/// Length of a bar in seconds at the default resolution.
///
/// ```
/// # use bar_sequencer::timing::seconds_per_bar;
/// assert_eq!(seconds_per_bar(120.).unwrap(), 2.0);
/// ```
pub fn seconds_per_bar(qpm: f64) -> Result<f64> {
    seconds_per_bar_at(qpm, Resolution::default())
}

/// Length of a bar in seconds at the given resolution.
pub fn seconds_per_bar_at(qpm: f64, resolution: Resolution) -> Result<f64> {
    resolution.check()?;

    Ok(seconds_per_step(qpm, resolution.steps_per_quarter)? * resolution.steps_per_bar as f64)
}

/// The interval, in seconds, that a generator should fill with new material.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct GenerationWindow {
    /// Where new material begins
    pub start_time: f64,
    /// Where new material ends
    pub end_time: f64,
}

impl GenerationWindow {
    /// Length of the window in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether `time` lies in `[start_time, end_time]`, allowing for float error.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time - 1e-9 && time <= self.end_time + 1e-9
    }
}

/// Compute the window for `bars` bars of new material at the default resolution.
///
/// The tempo comes from the primer's first tempo marking if it has notes and a
/// marking, and [`DEFAULT_QUARTERS_PER_MINUTE`] otherwise. With `start_with_primer`
/// the window starts where the primer ends, so the primer plays first and the new
/// material follows on; otherwise it starts at zero. A primer without notes counts
/// as having no length, even if it is padded with rests.
pub fn generation_window(
    bars: u32,
    primer: &NoteSequence,
    start_with_primer: bool,
) -> Result<GenerationWindow> {
    generation_window_at(bars, primer, start_with_primer, Resolution::default())
}

/// [`generation_window`] with an explicit resolution.
pub fn generation_window_at(
    bars: u32,
    primer: &NoteSequence,
    start_with_primer: bool,
    resolution: Resolution,
) -> Result<GenerationWindow> {
    if bars < 1 {
        return Err(Error::invalid("must generate at least one bar"));
    }

    let qpm = primer.qpm();
    let bar_length = seconds_per_bar_at(qpm, resolution)?;

    let start_time = if start_with_primer && !primer.is_empty() {
        primer.total_time()
    } else {
        0.
    };

    let window = GenerationWindow {
        start_time,
        end_time: start_time + bars as f64 * bar_length,
    };

    log::debug!(
        "{} bar(s) at {} qpm ({}s per bar): {:?}",
        bars,
        qpm,
        bar_length,
        window
    );

    Ok(window)
}
