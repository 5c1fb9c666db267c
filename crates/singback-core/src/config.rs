//! Configuration file support for singback
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/singback/config.toml`
//! - macOS: `~/Library/Application Support/singback/config.toml`
//! - Windows: `%APPDATA%\singback\config.toml`

use crate::backend::SynthParams;
use crate::coordinator::CoordinatorSettings;
use crate::error::{Error, Result};
use crate::range::{standard_ranges, VoiceRange};
use crate::recording::{OverlapPolicy, RecordTiming, TrialPolicy};
use crate::stimulus::{PlaybackRequest, Voice};
use crate::trigger::TriggerOptions;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recording and playback lags
    pub timing: TimingSettings,
    /// Replay rules within a trial
    pub trial: TrialSettings,
    /// Default voice and transposition
    pub voice: VoiceSettings,
    /// Synthesizer parameters
    pub synth: SynthParams,
    /// Voice ranges used for diagnostics
    pub ranges: Vec<VoiceRange>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: TimingSettings::default(),
            trial: TrialSettings::default(),
            voice: VoiceSettings::default(),
            synth: SynthParams::default(),
            ranges: standard_ranges(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "singback") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config(&path)?;
        Ok(path)
    }

    /// Write the commented default config to `path`
    pub fn write_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = r#"# singback configuration file

[timing]
# Gap between the end of a sequence or MIDI stimulus and the start of recording
record_lag_ms = 400

# Delay before the recording indicator and stop button appear
indicator_lag_ms = 500

# Added to a single tone's length to get its automatic stop
tone_stop_padding_ms = 500

# Spacing between notes of a sequence, in seconds
sequence_spacing = 0.5

# Silence before the first note of a MIDI track
midi_lead_in_ms = 500

[trial]
# The play button is hidden once this many attempts have been made (0 = never)
max_attempts = 3

# Only the first attempt of a trial records
record_first_attempt_only = true

# What to do when a new recording would start while one is still live:
# "replace", "reject" or "queue"
overlap = "replace"

[voice]
# "tone" or "piano"
default = "tone"

# The sampled piano renders an octave high; shift it down
sampled_octave_correction = true

# Semitones added to every stimulus
transpose = 0

[synth]
oscillator = "sine"
partial_count = 4
attack = 0.01
decay = 0.01
sustain = 0.50
release = 0.01
attack_curve = "cosine"

# Voice ranges, each covering [base, base + len)
[[ranges]]
name = "soprano"
base = 60
len = 24

[[ranges]]
name = "alto"
base = 53
len = 24

[[ranges]]
name = "tenor"
base = 48
len = 24

[[ranges]]
name = "baritone"
base = 45
len = 24

[[ranges]]
name = "bass"
base = 40
len = 24
"#;

        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that cannot produce a working schedule
    pub fn validate(&self) -> Result<()> {
        if !(self.timing.sequence_spacing.is_finite() && self.timing.sequence_spacing >= 0.0) {
            return Err(Error::Config(format!(
                "sequence_spacing must be a non-negative number, got {}",
                self.timing.sequence_spacing
            )));
        }
        if let Some(range) = self.ranges.iter().find(|r| r.len == 0) {
            return Err(Error::Config(format!("range '{}' is empty", range.name)));
        }
        Ok(())
    }

    /// Convert to the settings the coordinator runs with
    pub fn to_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            timing: RecordTiming {
                record_lag_ms: self.timing.record_lag_ms,
                indicator_lag_ms: self.timing.indicator_lag_ms,
                tone_stop_padding_ms: self.timing.tone_stop_padding_ms,
            },
            trial: TrialPolicy {
                max_attempts: self.trial.max_attempts,
                record_first_attempt_only: self.trial.record_first_attempt_only,
                overlap: self.trial.overlap,
            },
            triggers: TriggerOptions {
                sampled_octave_correction: self.voice.sampled_octave_correction,
                midi_lead_in: self.timing.midi_lead_in_ms as f64 / 1000.0,
            },
            ranges: self.ranges.clone(),
        }
    }

    /// Apply the configured voice and transposition to a request
    pub fn apply_voice(&self, request: PlaybackRequest) -> PlaybackRequest {
        let transpose = request.transpose + self.voice.transpose;
        request
            .with_voice(self.voice.default)
            .with_transpose(transpose)
    }
}

/// Timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub record_lag_ms: u64,
    pub indicator_lag_ms: u64,
    pub tone_stop_padding_ms: u64,
    /// Seconds between notes of a sequence
    pub sequence_spacing: f64,
    pub midi_lead_in_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let timing = RecordTiming::default();
        Self {
            record_lag_ms: timing.record_lag_ms,
            indicator_lag_ms: timing.indicator_lag_ms,
            tone_stop_padding_ms: timing.tone_stop_padding_ms,
            sequence_spacing: 0.5,
            midi_lead_in_ms: 500,
        }
    }
}

/// Trial settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSettings {
    pub max_attempts: u32,
    pub record_first_attempt_only: bool,
    pub overlap: OverlapPolicy,
}

impl Default for TrialSettings {
    fn default() -> Self {
        let policy = TrialPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            record_first_attempt_only: policy.record_first_attempt_only,
            overlap: policy.overlap,
        }
    }
}

/// Voice settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Voice used when a request does not name one
    pub default: Voice,
    pub sampled_octave_correction: bool,
    /// Semitones added to every stimulus
    pub transpose: i32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            default: Voice::Tone,
            sampled_octave_correction: true,
            transpose: 0,
        }
    }
}
