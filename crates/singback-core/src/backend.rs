//! Backends the coordinator drives.
//!
//! Synthesis, capture and the participant-facing UI are external services.
//! The coordinator only talks to them through these traits. The `Logging*`
//! and [`SilentRecorder`] implementations are used for dry runs.

use crate::error::{Error, RecorderError, Result};
use crate::trigger::NoteTrigger;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Instant;

/// Oscillator and envelope settings handed to a synthesis backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthParams {
    /// Oscillator waveform ("sine", "triangle", ...)
    pub oscillator: String,
    pub partial_count: u32,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub attack_curve: String,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            oscillator: "sine".to_string(),
            partial_count: 4,
            attack: 0.01,
            decay: 0.01,
            sustain: 0.50,
            release: 0.01,
            attack_curve: "cosine".to_string(),
        }
    }
}

/// Renders notes.
pub trait Synthesizer: Send {
    /// Play one note. `trigger.at` is absolute on the coordinator clock.
    fn trigger(&mut self, trigger: &NoteTrigger) -> Result<()>;
}

/// Audio captured during one recording window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedAudio {
    pub sample_rate: u32,
    /// One buffer per channel.
    pub channels: Vec<Vec<f32>>,
}

impl CapturedAudio {
    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        let frames = self.channels.iter().map(Vec::len).max().unwrap_or(0);
        if self.channels.is_empty() {
            return Vec::new();
        }
        let count = self.channels.len() as f32;
        (0..frames)
            .map(|i| {
                self.channels
                    .iter()
                    .map(|ch| ch.get(i).copied().unwrap_or(0.0))
                    .sum::<f32>()
                    / count
            })
            .collect()
    }

    /// Encode as a mono 16-bit PCM WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate.max(1),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for sample in self.to_mono() {
                writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    pub fn duration_secs(&self) -> f64 {
        let frames = self.channels.first().map_or(0, Vec::len);
        if self.sample_rate == 0 {
            0.0
        } else {
            frames as f64 / self.sample_rate as f64
        }
    }
}

/// Microphone capture.
pub trait Recorder: Send {
    fn start(&mut self) -> std::result::Result<(), RecorderError>;

    /// Stop capturing and hand over what was recorded.
    fn stop(&mut self) -> std::result::Result<CapturedAudio, RecorderError>;
}

/// Participant-facing controls.
pub trait UiSurface: Send {
    fn hide_play(&mut self);
    fn show_recording_indicator(&mut self);
    fn show_stop_control(&mut self);
    /// Recording is over: remove the indicator and show progress.
    fn recording_finished(&mut self);
    /// Blocking message to the participant.
    fn alert(&mut self, message: &str);
}

/// Synth that only logs what it would play.
#[derive(Debug, Default)]
pub struct LoggingSynth {
    params: SynthParams,
    triggered: usize,
}

impl LoggingSynth {
    pub fn new(params: SynthParams) -> Self {
        log::debug!(
            "synth: {} x{} adsr {}/{}/{}/{}",
            params.oscillator,
            params.partial_count,
            params.attack,
            params.decay,
            params.sustain,
            params.release
        );
        Self {
            params,
            triggered: 0,
        }
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    pub fn triggered(&self) -> usize {
        self.triggered
    }
}

impl Synthesizer for LoggingSynth {
    fn trigger(&mut self, trigger: &NoteTrigger) -> Result<()> {
        let at_ok = trigger.at.map_or(true, f64::is_finite);
        if !trigger.duration.is_finite() || !at_ok {
            return Err(Error::Synth(format!(
                "cannot schedule {} for {}s at {:?}",
                trigger.name, trigger.duration, trigger.at
            )));
        }
        self.triggered += 1;
        match trigger.at {
            Some(at) => log::info!(
                "[{:?}] {} ({}) for {:.3}s at {:.3}s",
                trigger.voice,
                trigger.name,
                trigger.pitch,
                trigger.duration,
                at
            ),
            None => log::info!(
                "[{:?}] {} ({}) for {:.3}s now",
                trigger.voice,
                trigger.name,
                trigger.pitch,
                trigger.duration
            ),
        }
        Ok(())
    }
}

/// Recorder that captures silence for as long as it runs.
#[derive(Debug)]
pub struct SilentRecorder {
    sample_rate: u32,
    started: Option<Instant>,
}

impl SilentRecorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            started: None,
        }
    }
}

impl Default for SilentRecorder {
    fn default() -> Self {
        Self::new(44_100)
    }
}

impl Recorder for SilentRecorder {
    fn start(&mut self) -> std::result::Result<(), RecorderError> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<CapturedAudio, RecorderError> {
        let started = self
            .started
            .take()
            .ok_or_else(|| RecorderError::Failed("stop without start".to_string()))?;
        let frames = (started.elapsed().as_secs_f64() * self.sample_rate as f64) as usize;
        Ok(CapturedAudio {
            sample_rate: self.sample_rate,
            channels: vec![vec![0.0; frames]],
        })
    }
}

/// UI that logs state changes.
#[derive(Debug, Default)]
pub struct LoggingUi;

impl UiSurface for LoggingUi {
    fn hide_play(&mut self) {
        log::info!("ui: play button hidden");
    }

    fn show_recording_indicator(&mut self) {
        log::info!("ui: recording indicator shown");
    }

    fn show_stop_control(&mut self) {
        log::info!("ui: stop button shown");
    }

    fn recording_finished(&mut self) {
        log::info!("ui: recording finished");
    }

    fn alert(&mut self, message: &str) {
        log::warn!("ui alert: {}", message);
    }
}
