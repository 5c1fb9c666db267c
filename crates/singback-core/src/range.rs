//! Vocal range diagnostics.
//!
//! Purely advisory: the coordinator logs which voice ranges a stimulus falls
//! in, nothing else depends on the result.

use serde::{Deserialize, Serialize};

/// Length of each standard range, in semitones.
pub const STANDARD_RANGE_LEN: u8 = 24;

/// A half-open run of consecutive MIDI pitches `[base, base + len)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceRange {
    pub name: String,
    pub base: u8,
    pub len: u8,
}

impl VoiceRange {
    pub fn new(name: impl Into<String>, base: u8, len: u8) -> Self {
        Self {
            name: name.into(),
            base,
            len,
        }
    }

    pub fn contains(&self, pitch: u8) -> bool {
        let pitch = pitch as u16;
        let base = self.base as u16;
        pitch >= base && pitch < base + self.len as u16
    }
}

/// Soprano, alto, tenor, baritone and bass, two octaves each.
pub fn standard_ranges() -> Vec<VoiceRange> {
    [
        ("soprano", 60),
        ("alto", 53),
        ("tenor", 48),
        ("baritone", 45),
        ("bass", 40),
    ]
    .iter()
    .map(|&(name, base)| VoiceRange::new(name, base, STANDARD_RANGE_LEN))
    .collect()
}

/// Classifies pitches against a fixed set of ranges.
#[derive(Debug, Clone)]
pub struct RangeClassifier {
    ranges: Vec<VoiceRange>,
}

impl Default for RangeClassifier {
    fn default() -> Self {
        Self::new(standard_ranges())
    }
}

impl RangeClassifier {
    pub fn new(ranges: Vec<VoiceRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[VoiceRange] {
        &self.ranges
    }

    /// Names of every range containing `pitch`, in configured order.
    pub fn classify(&self, pitch: u8) -> Vec<&str> {
        self.ranges
            .iter()
            .filter(|r| r.contains(pitch))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Log the ranges each pitch falls in.
    pub fn report(&self, pitches: &[u8]) {
        for &pitch in pitches {
            let matches = self.classify(pitch);
            if matches.is_empty() {
                log::info!("pitch {} is outside every voice range", pitch);
            }
            for name in matches {
                log::info!("pitch {} comes in the {} range", pitch, name);
            }
        }
    }
}
