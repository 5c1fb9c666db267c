//! Events sent to the host application.
//!
//! The host receives named key/value inputs. [`BridgeEvent`] lists every key
//! singback produces; [`HostBridge`] is the transport.

use crate::backend::CapturedAudio;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;

/// Pitches of the stimulus just played.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Pitches {
    One(u8),
    Many(Vec<u8>),
}

/// A named input for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    StimuliPitch(Pitches),
    StimuliTicks(Vec<u32>),
    StimuliDuration(Vec<f64>),
    StimuliDurationTicks(Vec<u32>),
    PlaybackCount(u32),
    /// Milliseconds from the first attempt of the trial to each attempt.
    PlaybackTimes(Vec<u64>),
    BrowserCapable(bool),
    /// Client environment as a JSON string.
    UserInfo(String),
    Audio(CapturedAudio),
}

impl BridgeEvent {
    /// Input name on the host side.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::StimuliPitch(_) => "stimuli_pitch",
            BridgeEvent::StimuliTicks(_) => "stimuli_ticks",
            BridgeEvent::StimuliDuration(_) => "stimuli_duration",
            BridgeEvent::StimuliDurationTicks(_) => "stimuli_durationTicks",
            BridgeEvent::PlaybackCount(_) => "playback_count",
            BridgeEvent::PlaybackTimes(_) => "playback_times",
            BridgeEvent::BrowserCapable(_) => "browser_capable",
            BridgeEvent::UserInfo(_) => "user_info",
            BridgeEvent::Audio(_) => "audio",
        }
    }

    pub fn value(&self) -> Value {
        match self {
            BridgeEvent::StimuliPitch(p) => json!(p),
            BridgeEvent::StimuliTicks(v) | BridgeEvent::StimuliDurationTicks(v) => json!(v),
            BridgeEvent::StimuliDuration(v) => json!(v),
            BridgeEvent::PlaybackCount(n) => json!(n),
            BridgeEvent::PlaybackTimes(v) => json!(v),
            BridgeEvent::BrowserCapable(capable) => {
                json!(if *capable { "TRUE" } else { "FALSE" })
            }
            BridgeEvent::UserInfo(info) => json!(info),
            BridgeEvent::Audio(audio) => json!(audio),
        }
    }
}

/// Message channel to the host application.
pub trait HostBridge: Send {
    /// Set a named input on the host.
    fn set_input(&mut self, name: &str, value: Value);

    fn emit(&mut self, event: &BridgeEvent) {
        self.set_input(event.name(), event.value());
    }
}

/// Writes one `{"name": ..., "value": ...}` object per line.
pub struct JsonLinesBridge<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesBridge<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> HostBridge for JsonLinesBridge<W> {
    fn set_input(&mut self, name: &str, value: Value) {
        let line = json!({ "name": name, "value": value });
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            log::warn!("Failed to write bridge event '{}': {}", name, e);
        }
    }
}
