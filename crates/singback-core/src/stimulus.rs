//! Playback requests.
//!
//! A [`PlaybackRequest`] describes what the participant hears when they press
//! play: a single tone, an evenly spaced sequence, or a track decoded from a
//! MIDI file. It also carries the voice used to render it.

use crate::note::{note_name, Note};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which instrument renders the stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// The default synthesized tone.
    Tone,
    /// The sampled piano.
    Piano,
}

impl Default for Voice {
    fn default() -> Self {
        Self::Tone
    }
}

impl Voice {
    /// Whether this voice plays back recorded samples.
    pub fn is_sampled(self) -> bool {
        matches!(self, Voice::Piano)
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tone" | "synth" => Ok(Voice::Tone),
            "piano" => Ok(Voice::Piano),
            other => Err(format!("unknown voice '{}' (expected tone or piano)", other)),
        }
    }
}

/// Unit of the `time` and `duration` fields in a [`MidiTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "unit")]
pub enum TimeUnit {
    Seconds,
    /// Quarter-note beats at a fixed tempo.
    Beats { bpm: f64 },
}

impl Default for TimeUnit {
    fn default() -> Self {
        Self::Seconds
    }
}

impl TimeUnit {
    /// Convert a value in this unit to seconds.
    pub fn to_seconds(self, value: f64) -> f64 {
        match self {
            TimeUnit::Seconds => value,
            TimeUnit::Beats { bpm } if bpm > 0.0 => value * 60.0 / bpm,
            TimeUnit::Beats { .. } => 0.0,
        }
    }
}

/// One note of a decoded MIDI track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiNote {
    pub name: String,
    pub midi: u8,
    /// Onset relative to the start of the track, in the track's unit.
    pub time: f64,
    pub duration: f64,
    /// Normalised velocity (0.0 - 1.0).
    pub velocity: f32,
    pub ticks: u32,
    pub duration_ticks: u32,
}

impl MidiNote {
    /// Create a note with the name derived from the pitch and no tick info.
    pub fn new(midi: u8, time: f64, duration: f64) -> Self {
        Self {
            name: note_name(midi),
            midi,
            time,
            duration,
            velocity: 1.0,
            ticks: 0,
            duration_ticks: 0,
        }
    }
}

/// A single MIDI track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiTrack {
    pub name: Option<String>,
    pub notes: Vec<MidiNote>,
    /// Declared total duration in the track's unit. Falls back to the end of
    /// the last sounding note.
    pub duration: Option<f64>,
    #[serde(default)]
    pub unit: TimeUnit,
}

impl MidiTrack {
    /// Create a track in seconds from a list of notes.
    pub fn new(notes: Vec<MidiNote>) -> Self {
        Self {
            name: None,
            notes,
            duration: None,
            unit: TimeUnit::Seconds,
        }
    }

    /// Total track duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        let raw = self.duration.unwrap_or_else(|| {
            self.notes
                .iter()
                .map(|n| n.time + n.duration)
                .fold(0.0, f64::max)
        });
        self.unit.to_seconds(raw)
    }

    /// The notes that will be played under `cap`.
    pub fn capped(&self, cap: NoteCap) -> &[MidiNote] {
        match cap {
            NoteCap::All => &self.notes,
            NoteCap::First(k) => &self.notes[..k.min(self.notes.len())],
        }
    }
}

/// Optional limit on how many notes of a track are played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteCap {
    All,
    First(usize),
}

impl Default for NoteCap {
    fn default() -> Self {
        Self::All
    }
}

impl FromStr for NoteCap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" | "all" => Ok(NoteCap::All),
            n => n
                .parse()
                .map(NoteCap::First)
                .map_err(|_| format!("invalid note cap '{}' (expected a count or 'max')", n)),
        }
    }
}

/// What is played.
#[derive(Debug, Clone, PartialEq)]
pub enum Stimulus {
    /// One note, triggered immediately.
    Tone(Note),
    /// Notes triggered back to back, `spacing` seconds apart.
    Sequence { notes: Vec<Note>, spacing: f64 },
    /// Notes at their own onsets, optionally capped.
    Midi { track: MidiTrack, cap: NoteCap },
}

impl Stimulus {
    /// The requested pitches, before any transposition or voice correction.
    pub fn pitches(&self) -> Vec<u8> {
        match self {
            Stimulus::Tone(note) => vec![note.pitch()],
            Stimulus::Sequence { notes, .. } => notes.iter().map(Note::pitch).collect(),
            Stimulus::Midi { track, cap } => track.capped(*cap).iter().map(|n| n.midi).collect(),
        }
    }

    pub fn kind(&self) -> StimulusKind {
        match self {
            Stimulus::Tone(_) => StimulusKind::Tone,
            Stimulus::Sequence { .. } => StimulusKind::Sequence,
            Stimulus::Midi { .. } => StimulusKind::Midi,
        }
    }
}

/// Discriminant of [`Stimulus`], used by the record scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    Tone,
    Sequence,
    Midi,
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StimulusKind::Tone => write!(f, "tone"),
            StimulusKind::Sequence => write!(f, "sequence"),
            StimulusKind::Midi => write!(f, "midi"),
        }
    }
}

/// A semantic play request from the participant's play button.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub stimulus: Stimulus,
    pub voice: Voice,
    /// Semitone offset applied to every note.
    pub transpose: i32,
    /// Hide the play button when recording begins.
    pub hide_play: bool,
}

impl PlaybackRequest {
    /// A single tone of `seconds` length. Hides the play button when recording starts.
    pub fn tone(pitch: u8, seconds: f64) -> Self {
        Self {
            stimulus: Stimulus::Tone(Note::new(pitch, seconds)),
            voice: Voice::default(),
            transpose: 0,
            hide_play: true,
        }
    }

    /// A sequence of pitches, each sounding for `spacing` seconds.
    pub fn sequence(pitches: &[u8], spacing: f64) -> Self {
        let notes = pitches.iter().map(|&p| Note::new(p, spacing)).collect();
        Self {
            stimulus: Stimulus::Sequence { notes, spacing },
            voice: Voice::default(),
            transpose: 0,
            hide_play: false,
        }
    }

    /// A decoded MIDI track.
    pub fn midi(track: MidiTrack, cap: NoteCap) -> Self {
        Self {
            stimulus: Stimulus::Midi { track, cap },
            voice: Voice::default(),
            transpose: 0,
            hide_play: false,
        }
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_transpose(mut self, semitones: i32) -> Self {
        self.transpose = semitones;
        self
    }

    pub fn with_hide_play(mut self, hide_play: bool) -> Self {
        self.hide_play = hide_play;
        self
    }
}
