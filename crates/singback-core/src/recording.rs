//! Recording windows and the policies that decide when they open.
//!
//! Everything here is pure: given what was played and the configured lags it
//! computes a [`RecordPlan`]. The coordinator turns plans into timers.

use crate::scheduler::TimerId;
use crate::stimulus::StimulusKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lags used when placing recording windows, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTiming {
    /// Gap after the end of a sequence or MIDI stimulus before recording starts.
    pub record_lag_ms: u64,
    /// Delay before the recording indicator and stop button appear.
    pub indicator_lag_ms: u64,
    /// Added to a single tone's length to get its auto-stop delay.
    pub tone_stop_padding_ms: u64,
}

impl Default for RecordTiming {
    fn default() -> Self {
        Self {
            record_lag_ms: 400,
            indicator_lag_ms: 500,
            tone_stop_padding_ms: 500,
        }
    }
}

/// When an open window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopTrigger {
    /// Automatically, this many ms after the window opens.
    After(u64),
    /// Only on an explicit stop.
    Manual,
}

/// How a recording window is placed around one playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPlan {
    /// Delay from the play request to the start of recording.
    pub start_delay_ms: u64,
    pub stop: StopTrigger,
    /// Offer a manual stop button.
    pub show_stop: bool,
    /// Hide the play button when recording starts.
    pub hide_play: bool,
    pub indicator_lag_ms: u64,
}

/// Compute where the recording window goes for a stimulus lasting `duration_secs`.
///
/// Single tones record straight away and stop a little after the tone ends.
/// Sequences and MIDI tracks start recording once the stimulus is over (plus a
/// lag) and stay open until stopped. MIDI notes sound `lead_in_ms` late, so the
/// window moves with them. A zero-length stimulus records at once.
pub fn plan_recording(
    kind: StimulusKind,
    duration_secs: f64,
    hide_play: bool,
    lead_in_ms: u64,
    timing: &RecordTiming,
) -> RecordPlan {
    let duration_ms = crate::duration::seconds_to_ms(duration_secs);
    let after_stimulus = |offset_ms: u64| {
        if duration_ms == 0 {
            0
        } else {
            duration_ms
                .saturating_add(offset_ms)
                .saturating_add(timing.record_lag_ms)
        }
    };
    match kind {
        StimulusKind::Tone => RecordPlan {
            start_delay_ms: 0,
            stop: StopTrigger::After(duration_ms.saturating_add(timing.tone_stop_padding_ms)),
            show_stop: false,
            hide_play,
            indicator_lag_ms: timing.indicator_lag_ms,
        },
        StimulusKind::Sequence => RecordPlan {
            start_delay_ms: after_stimulus(0),
            stop: StopTrigger::Manual,
            show_stop: true,
            hide_play,
            indicator_lag_ms: timing.indicator_lag_ms,
        },
        StimulusKind::Midi => RecordPlan {
            start_delay_ms: after_stimulus(lead_in_ms),
            stop: StopTrigger::Manual,
            show_stop: true,
            hide_play,
            indicator_lag_ms: timing.indicator_lag_ms,
        },
    }
}

/// What to do when a request wants to record while another window is pending or open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Cancel the current window (stopping it if open) and take over.
    Replace,
    /// Refuse the new request outright.
    Reject,
    /// Play now; open the new window once the current one closes.
    Queue,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::Replace
    }
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(OverlapPolicy::Replace),
            "reject" => Ok(OverlapPolicy::Reject),
            "queue" => Ok(OverlapPolicy::Queue),
            other => Err(format!(
                "unknown overlap policy '{}' (expected replace, reject or queue)",
                other
            )),
        }
    }
}

/// Replay rules within one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPolicy {
    /// The play button disappears once this many attempts have been made.
    pub max_attempts: u32,
    /// Only the first attempt of a trial opens a recording window.
    pub record_first_attempt_only: bool,
    pub overlap: OverlapPolicy,
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            record_first_attempt_only: true,
            overlap: OverlapPolicy::Replace,
        }
    }
}

impl TrialPolicy {
    /// Whether attempt number `attempt` (1-based) should record.
    pub fn records(&self, attempt: u32) -> bool {
        attempt == 1 || !self.record_first_attempt_only
    }

    /// Whether the play button must be hidden after attempt `attempt`.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Identifier of a recording window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a recording window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    /// Scheduled, recorder not started yet.
    Pending,
    /// Recorder running.
    Open,
    /// Stopped or cancelled.
    Closed,
}

/// One recording window and the timers it owns.
#[derive(Debug, Clone)]
pub struct RecordingWindow {
    pub id: WindowId,
    pub plan: RecordPlan,
    pub state: WindowState,
    /// Clock time the recorder started, in ms.
    pub opened_at: Option<u64>,
    /// Timers still registered on behalf of this window.
    pub timers: Vec<TimerId>,
}

impl RecordingWindow {
    pub fn new(id: WindowId, plan: RecordPlan) -> Self {
        Self {
            id,
            plan,
            state: WindowState::Pending,
            opened_at: None,
            timers: Vec::new(),
        }
    }

    /// Pending or open.
    pub fn is_live(&self) -> bool {
        self.state != WindowState::Closed
    }
}
