//! Notes and pitch helpers.
//!
//! Pitches are MIDI note numbers (60 = C4). Names use scientific pitch
//! notation with sharps, matching what synthesis backends expect when they
//! are driven by name rather than number.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Highest valid MIDI note number.
pub const MIDI_MAX: u8 = 127;

/// Semitones in one octave.
pub const OCTAVE: i32 = 12;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Get the note name for a MIDI note number (e.g. 60 -> "C4").
pub fn note_name(pitch: u8) -> String {
    let octave = (pitch as i32 / 12) - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Parse a note name such as `"C4"`, `"F#3"`, `"Db5"` or `"A-1"`.
pub fn parse_note_name(name: &str) -> Result<u8> {
    let invalid = || Error::NoteName(name.to_string());
    let mut chars = name.trim().chars();

    let letter = chars.next().ok_or_else(invalid)?;
    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };

    let rest: String = chars.collect();
    let (accidental, octave_str) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest.as_str()),
    };

    let octave: i32 = octave_str.parse().map_err(|_| invalid())?;
    let midi = (octave + 1) * OCTAVE + base + accidental;
    if (0..=MIDI_MAX as i32).contains(&midi) {
        Ok(midi as u8)
    } else {
        Err(invalid())
    }
}

/// Shift a pitch by a number of semitones, failing outside 0..=127.
pub fn transpose(pitch: u8, semitones: i32) -> Result<u8> {
    let shifted = pitch as i32 + semitones;
    if (0..=MIDI_MAX as i32).contains(&shifted) {
        Ok(shifted as u8)
    } else {
        Err(Error::PitchOutOfRange {
            pitch,
            shift: semitones,
        })
    }
}

/// A single stimulus note.
///
/// Durations and offsets are in seconds. Values are never mutated in place;
/// the builder methods return a new note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pitch: u8,
    duration: f64,
    velocity: Option<f32>,
    offset: Option<f64>,
}

impl Note {
    /// Create a note with the given MIDI pitch and duration in seconds.
    pub fn new(pitch: u8, duration: f64) -> Self {
        Self {
            pitch: pitch.min(MIDI_MAX),
            duration: duration.max(0.0),
            velocity: None,
            offset: None,
        }
    }

    /// Set the velocity (0.0 - 1.0).
    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = Some(velocity.clamp(0.0, 1.0));
        self
    }

    /// Set the scheduled offset from the start of the stimulus, in seconds.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset.max(0.0));
        self
    }

    /// Return a copy shifted by `semitones`.
    pub fn transposed(self, semitones: i32) -> Result<Self> {
        Ok(Self {
            pitch: transpose(self.pitch, semitones)?,
            ..self
        })
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn velocity(&self) -> Option<f32> {
        self.velocity
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    /// Scientific pitch name of this note.
    pub fn name(&self) -> String {
        note_name(self.pitch)
    }
}
