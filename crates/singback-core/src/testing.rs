//! Recording fakes shared by the unit tests.
//!
//! Every fake appends to one [`CallLog`], so a test can assert on the order
//! of calls across the synth, recorder, UI and host bridge.

use crate::backend::{CapturedAudio, Recorder, Synthesizer, UiSurface};
use crate::bridge::HostBridge;
use crate::coordinator::Backends;
use crate::error::{Error, RecorderError, Result};
use crate::trigger::NoteTrigger;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Trigger(NoteTrigger),
    RecordStart,
    RecordStop,
    HidePlay,
    ShowIndicator,
    ShowStop,
    Finished,
    Alert(String),
    Bridge(String, Value),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(u64, Call)>>>);

impl CallLog {
    fn push(&self, call: Call, at: u64) {
        self.0.lock().unwrap().push((at, call));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Calls with the clock time they were made at.
    pub fn timed(&self) -> Vec<(u64, Call)> {
        self.0.lock().unwrap().clone()
    }

    pub fn triggers(&self) -> Vec<NoteTrigger> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Trigger(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn bridge(&self, name: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Bridge(n, v) if n == name => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Clock times at which `call` was made.
    pub fn times_of(&self, call: &Call) -> Vec<u64> {
        self.timed()
            .into_iter()
            .filter(|(_, c)| c == call)
            .map(|(t, _)| t)
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Stamps calls with the time of a shared manual clock.
#[derive(Clone)]
struct Stamp {
    log: CallLog,
    clock: crate::timing::ManualClock,
}

impl Stamp {
    fn push(&self, call: Call) {
        use crate::timing::Clock;
        self.log.push(call, self.clock.now_ms());
    }
}

pub struct FakeSynth {
    stamp: Stamp,
    fail_pitch: Option<u8>,
}

impl Synthesizer for FakeSynth {
    fn trigger(&mut self, trigger: &NoteTrigger) -> Result<()> {
        if self.fail_pitch == Some(trigger.pitch) {
            return Err(Error::Synth(format!("no sample for {}", trigger.name)));
        }
        self.stamp.push(Call::Trigger(trigger.clone()));
        Ok(())
    }
}

pub struct FakeRecorder {
    stamp: Stamp,
    deny: bool,
    start_errors: VecDeque<Option<RecorderError>>,
    stop_error: Option<RecorderError>,
}

impl Recorder for FakeRecorder {
    fn start(&mut self) -> std::result::Result<(), RecorderError> {
        if self.deny {
            return Err(RecorderError::PermissionDenied);
        }
        if let Some(Some(e)) = self.start_errors.pop_front() {
            return Err(e);
        }
        self.stamp.push(Call::RecordStart);
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<CapturedAudio, RecorderError> {
        self.stamp.push(Call::RecordStop);
        if let Some(e) = &self.stop_error {
            return Err(e.clone());
        }
        Ok(CapturedAudio {
            sample_rate: 8_000,
            channels: vec![vec![0.0; 4]],
        })
    }
}

pub struct FakeUi(Stamp);

impl UiSurface for FakeUi {
    fn hide_play(&mut self) {
        self.0.push(Call::HidePlay);
    }

    fn show_recording_indicator(&mut self) {
        self.0.push(Call::ShowIndicator);
    }

    fn show_stop_control(&mut self) {
        self.0.push(Call::ShowStop);
    }

    fn recording_finished(&mut self) {
        self.0.push(Call::Finished);
    }

    fn alert(&mut self, message: &str) {
        self.0.push(Call::Alert(message.to_string()));
    }
}

pub struct FakeBridge(Stamp);

impl HostBridge for FakeBridge {
    fn set_input(&mut self, name: &str, value: Value) {
        self.0.push(Call::Bridge(name.to_string(), value));
    }
}

/// Failures the fake backends inject.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// The synth refuses this pitch.
    pub synth_pitch: Option<u8>,
    /// Every recorder start is refused by the participant.
    pub deny_microphone: bool,
    /// Outcome of each successive recorder start; `None` succeeds, and so
    /// does every start past the end.
    pub start_errors: VecDeque<Option<RecorderError>>,
    /// Every recorder stop fails with this.
    pub stop_error: Option<RecorderError>,
}

/// Fake backends wired to one log and clock.
pub fn fake_backends(
    clock: &crate::timing::ManualClock,
    faults: Faults,
) -> (Backends, CallLog) {
    let log = CallLog::default();
    let stamp = Stamp {
        log: log.clone(),
        clock: clock.clone(),
    };
    let backends = Backends {
        synth: Box::new(FakeSynth {
            stamp: stamp.clone(),
            fail_pitch: faults.synth_pitch,
        }),
        recorder: Box::new(FakeRecorder {
            stamp: stamp.clone(),
            deny: faults.deny_microphone,
            start_errors: faults.start_errors,
            stop_error: faults.stop_error,
        }),
        ui: Box::new(FakeUi(stamp.clone())),
        bridge: Box::new(FakeBridge(stamp)),
    };
    (backends, log)
}
