//! Expected playback duration of a stimulus.
//!
//! The record scheduler uses these estimates to place the start of the
//! recording window after the stimulus has finished sounding.

use crate::error::{Error, Result};
use crate::stimulus::{NoteCap, Stimulus};

/// Longest stimulus the coordinator will schedule a window around.
pub const MAX_STIMULUS_SECONDS: f64 = 3600.0;

/// Total expected playback duration in seconds.
///
/// - tone: the note's duration
/// - sequence: note count times spacing
/// - MIDI capped at K: sum of the first K note durations
/// - MIDI uncapped: the track's declared duration
///
/// Empty note lists always estimate to zero.
pub fn estimate_seconds(stimulus: &Stimulus) -> f64 {
    match stimulus {
        Stimulus::Tone(note) => note.duration(),
        Stimulus::Sequence { notes, spacing } => notes.len() as f64 * spacing.max(0.0),
        Stimulus::Midi { track, cap } => {
            if track.notes.is_empty() {
                return 0.0;
            }
            match cap {
                NoteCap::All => track.duration_seconds(),
                NoteCap::First(_) => {
                    let raw: f64 = track.capped(*cap).iter().map(|n| n.duration).sum();
                    track.unit.to_seconds(raw)
                }
            }
        }
    }
}

/// Accept `seconds` as a stimulus length, or fail with [`Error::InvalidDuration`].
pub fn check_seconds(seconds: f64) -> Result<f64> {
    if seconds.is_finite() && (0.0..=MAX_STIMULUS_SECONDS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(Error::InvalidDuration(seconds))
    }
}

/// Convert seconds to whole milliseconds, rounding to nearest.
pub fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}
