//! Client environment reporting.
//!
//! Before a session starts the host wants to know whether the participant's
//! client can play and record audio at all, and a description of the client.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys stripped from the environment descriptor before it is sent.
const STRIPPED_KEYS: [&str; 2] = ["plugins", "mimeTypes"];

/// Audio features the client reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub audio: bool,
    pub audio_preload: bool,
    pub web_audio: bool,
    pub media_recorder: bool,
}

impl Capabilities {
    /// Every required feature is present.
    pub fn is_capable(&self) -> bool {
        self.audio && self.audio_preload && self.web_audio && self.media_recorder
    }

    /// Names of the missing features.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("audio", self.audio),
            ("audioPreload", self.audio_preload),
            ("webAudio", self.web_audio),
            ("mediaRecorder", self.media_recorder),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
    }
}

/// Free-form description of the client (user agent, language, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientEnvironment(pub Map<String, Value>);

impl ClientEnvironment {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// JSON string of the descriptor with plugin and MIME type lists removed.
    pub fn to_report(&self) -> Result<String> {
        let mut fields = self.0.clone();
        for key in STRIPPED_KEYS {
            fields.remove(key);
        }
        Ok(serde_json::to_string(&Value::Object(fields))?)
    }
}
