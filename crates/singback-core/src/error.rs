//! Error types for singback

use thiserror::Error;

/// Result type alias for singback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a recording backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    /// The participant refused microphone access.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No capture device, or the capture stack is missing.
    #[error("recorder unavailable: {0}")]
    Unavailable(String),

    /// Any other capture failure.
    #[error("recorder failed: {0}")]
    Failed(String),
}

/// Errors that can occur in singback
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A transposition or octave correction left the MIDI range
    #[error("Pitch {pitch} shifted by {shift} semitones is outside the MIDI range")]
    PitchOutOfRange { pitch: u8, shift: i32 },

    /// Unrecognised note name
    #[error("Invalid note name: {0}")]
    NoteName(String),

    /// MIDI stimulus could not be read, fetched or decoded
    #[error("MIDI error: {0}")]
    Midi(String),

    /// A stimulus length that is not finite or too long to schedule
    #[error("Stimulus duration {0}s is not a finite length of at most {max}s", max = crate::duration::MAX_STIMULUS_SECONDS)]
    InvalidDuration(f64),

    /// Recording backend error
    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    /// Synthesis backend error
    #[error("Synth error: {0}")]
    Synth(String),

    /// A recording window is already pending or open and the overlap policy rejects new ones
    #[error("A recording window is already pending or open")]
    Busy,

    /// No pending or open recording window has this id
    #[error("Unknown recording window {0}")]
    UnknownWindow(crate::recording::WindowId),

    /// The runtime thread is gone
    #[error("Runtime has shut down")]
    Shutdown,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WAV encoding error
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}
