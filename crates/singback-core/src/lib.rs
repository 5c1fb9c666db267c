//! singback-core - playback-then-record coordination for listening experiments
//!
//! A participant presses play, hears a stimulus (a single tone, an evenly
//! spaced sequence, or a MIDI track) and sings it back. This crate decides
//! when every note sounds, when the microphone opens and closes, and what is
//! reported to the host experiment.
//!
//! - Duration estimation for every stimulus kind
//! - Trigger planning with transposition and per-voice octave correction
//! - Recording windows placed around the stimulus, driven by cancellable timers
//! - Attempt counting per trial, with replay limits
//! - Vocal range diagnostics
//! - MIDI file decoding and TOML configuration
//!
//! # Usage as a Library
//!
//! ```no_run
//! use singback_core::{
//!     Backends, Config, JsonLinesBridge, LoggingSynth, LoggingUi, PlaybackRecordCoordinator,
//!     PlaybackRequest, PlaybackSession, SilentRecorder, SystemClock,
//! };
//!
//! let config = Config::load_or_default();
//! let backends = Backends {
//!     synth: Box::new(LoggingSynth::new(config.synth.clone())),
//!     recorder: Box::new(SilentRecorder::default()),
//!     ui: Box::new(LoggingUi),
//!     bridge: Box::new(JsonLinesBridge::new(std::io::stdout())),
//! };
//! let mut coordinator = PlaybackRecordCoordinator::new(
//!     backends,
//!     config.to_settings(),
//!     Box::new(SystemClock::new()),
//! );
//!
//! let mut session = PlaybackSession::new();
//! let outcome = coordinator
//!     .play(&mut session, &PlaybackRequest::tone(64, 1.0))
//!     .unwrap();
//! println!("attempt {} records in window {:?}", outcome.attempt, outcome.window);
//!
//! // Later, from the event loop:
//! coordinator.poll();
//! ```

pub mod backend;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod duration;
pub mod environment;
pub mod error;
pub mod midi_file;
pub mod note;
pub mod range;
pub mod recording;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod stimulus;
pub mod timing;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use backend::{
    CapturedAudio, LoggingSynth, LoggingUi, Recorder, SilentRecorder, SynthParams, Synthesizer,
    UiSurface,
};
pub use bridge::{BridgeEvent, HostBridge, JsonLinesBridge, Pitches};
pub use config::Config;
pub use coordinator::{
    plan_playback, Backends, CoordinatorSettings, PlayOutcome, PlaybackPlan,
    PlaybackRecordCoordinator,
};
pub use duration::{check_seconds, estimate_seconds, seconds_to_ms, MAX_STIMULUS_SECONDS};
pub use environment::{Capabilities, ClientEnvironment};
pub use error::{Error, RecorderError, Result};
pub use midi_file::{load_midi_file, parse_midi_bytes, MidiFile};
#[cfg(feature = "remote")]
pub use midi_file::fetch_midi;
pub use note::{note_name, parse_note_name, transpose, Note};
pub use range::{standard_ranges, RangeClassifier, VoiceRange};
pub use recording::{
    plan_recording, OverlapPolicy, RecordPlan, RecordTiming, StopTrigger, TrialPolicy, WindowId,
    WindowState,
};
pub use runtime::{Command, Runtime, RuntimeEvent, RuntimeHandle};
pub use session::PlaybackSession;
pub use stimulus::{
    MidiNote, MidiTrack, NoteCap, PlaybackRequest, Stimulus, StimulusKind, TimeUnit, Voice,
};
pub use timing::{Clock, ManualClock, SystemClock};
pub use trigger::{plan_triggers, NoteTrigger, TriggerOptions};
