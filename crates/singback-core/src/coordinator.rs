//! Playback-then-record coordination.
//!
//! [`PlaybackRecordCoordinator`] turns a play request into note triggers,
//! counts the attempt against the caller's [`PlaybackSession`], reports the
//! stimulus to the host and, when the trial policy allows it, places a
//! recording window after the stimulus. Windows are driven by timers on a
//! [`Clock`]; call [`PlaybackRecordCoordinator::poll`] whenever
//! [`PlaybackRecordCoordinator::next_deadline`] has passed.
//!
//! All work happens on the caller's thread. Nothing blocks; every delay is a
//! timer that fires from `poll`.

use crate::backend::{Recorder, Synthesizer, UiSurface};
use crate::bridge::{BridgeEvent, HostBridge, Pitches};
use crate::duration::{check_seconds, estimate_seconds, seconds_to_ms};
use crate::environment::{Capabilities, ClientEnvironment};
use crate::error::{Error, RecorderError, Result};
use crate::range::{standard_ranges, RangeClassifier, VoiceRange};
use crate::recording::{
    plan_recording, OverlapPolicy, RecordPlan, RecordTiming, RecordingWindow, StopTrigger,
    TrialPolicy, WindowId, WindowState,
};
use crate::scheduler::TimerQueue;
use crate::session::PlaybackSession;
use crate::stimulus::{PlaybackRequest, Stimulus, StimulusKind};
use crate::timing::Clock;
use crate::trigger::{plan_triggers, NoteTrigger, TriggerOptions};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

const PERMISSION_DENIED_MESSAGE: &str =
    "Microphone access was denied. Please allow microphone access and reload the page.";

/// The external services the coordinator drives.
pub struct Backends {
    pub synth: Box<dyn Synthesizer>,
    pub recorder: Box<dyn Recorder>,
    pub ui: Box<dyn UiSurface>,
    pub bridge: Box<dyn HostBridge>,
}

/// Tunables for a coordinator, usually built from [`crate::Config`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub timing: RecordTiming,
    pub trial: TrialPolicy,
    pub triggers: TriggerOptions,
    pub ranges: Vec<VoiceRange>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            timing: RecordTiming::default(),
            trial: TrialPolicy::default(),
            triggers: TriggerOptions::default(),
            ranges: standard_ranges(),
        }
    }
}

/// Everything a play request would do, computed without side effects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPlan {
    pub kind: StimulusKind,
    /// Estimated stimulus length in seconds.
    pub duration: f64,
    pub triggers: Vec<NoteTrigger>,
    pub record: RecordPlan,
}

/// Compute everything `request` would do if played at `start_secs`.
pub fn plan_playback(
    request: &PlaybackRequest,
    start_secs: f64,
    settings: &CoordinatorSettings,
) -> Result<PlaybackPlan> {
    let duration = check_seconds(estimate_seconds(&request.stimulus))?;
    let triggers = plan_triggers(request, start_secs, &settings.triggers)?;
    let kind = request.stimulus.kind();
    let lead_in_ms = seconds_to_ms(settings.triggers.midi_lead_in);
    let record = plan_recording(
        kind,
        duration,
        request.hide_play,
        lead_in_ms,
        &settings.timing,
    );
    Ok(PlaybackPlan {
        kind,
        duration,
        triggers,
        record,
    })
}

/// Result of one play request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOutcome {
    /// 1-based attempt number within the trial.
    pub attempt: u32,
    pub duration: f64,
    pub triggers: Vec<NoteTrigger>,
    /// The recording window opened or scheduled for this attempt, if any.
    pub window: Option<WindowId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Open,
    Close,
    ShowIndicator,
    ShowStopControl,
}

#[derive(Debug, Clone, Copy)]
struct Task {
    window: WindowId,
    action: Action,
}

/// Coordinates stimulus playback with the participant's recording.
pub struct PlaybackRecordCoordinator {
    backends: Backends,
    settings: CoordinatorSettings,
    clock: Box<dyn Clock>,
    classifier: RangeClassifier,
    timers: TimerQueue<Task>,
    /// Pending and open windows.
    windows: BTreeMap<WindowId, RecordingWindow>,
    /// The window whose recorder is running.
    active: Option<WindowId>,
    /// Windows due to open while another was recording.
    deferred: VecDeque<WindowId>,
    /// Windows closed since the last `take_closed`.
    closed: Vec<WindowId>,
    next_window: u64,
}

impl PlaybackRecordCoordinator {
    pub fn new(backends: Backends, settings: CoordinatorSettings, clock: Box<dyn Clock>) -> Self {
        let classifier = RangeClassifier::new(settings.ranges.clone());
        Self {
            backends,
            settings,
            clock,
            classifier,
            timers: TimerQueue::new(),
            windows: BTreeMap::new(),
            active: None,
            deferred: VecDeque::new(),
            closed: Vec::new(),
            next_window: 1,
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Current clock time in ms.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Compute triggers and the recording plan for `request` starting at `start_secs`.
    pub fn plan(&self, request: &PlaybackRequest, start_secs: f64) -> Result<PlaybackPlan> {
        plan_playback(request, start_secs, &self.settings)
    }

    /// Play `request` as the next attempt of the trial tracked by `session`.
    ///
    /// Fails without side effects if a pitch leaves the MIDI range, if the
    /// stimulus length cannot be scheduled, or if the overlap policy rejects a
    /// second recording window.
    pub fn play(
        &mut self,
        session: &mut PlaybackSession,
        request: &PlaybackRequest,
    ) -> Result<PlayOutcome> {
        let now = self.clock.now_ms();
        let plan = self.plan(request, now as f64 / 1000.0)?;
        let attempt = session.attempts() + 1;
        let records = self.settings.trial.records(attempt);

        if records && self.has_live_window() {
            match self.settings.trial.overlap {
                OverlapPolicy::Reject => {
                    log::warn!("play rejected: a recording window is still live");
                    return Err(Error::Busy);
                }
                OverlapPolicy::Replace => {
                    let live: Vec<WindowId> = self.windows.keys().copied().collect();
                    for id in live {
                        log::warn!("window {} replaced by a new request", id);
                        self.close_window(id);
                    }
                }
                OverlapPolicy::Queue => {
                    log::debug!("window will queue behind the live one");
                }
            }
        }

        self.classifier.report(&request.stimulus.pitches());

        let attempt = session.record_attempt(now, plan.duration);
        log::debug!(
            "attempt {} ({}, {:.3}s, gaps {:?})",
            attempt,
            plan.kind,
            plan.duration,
            session.attempt_gaps()
        );
        self.emit(BridgeEvent::PlaybackCount(attempt));
        self.emit(BridgeEvent::PlaybackTimes(session.playback_times()));

        if self.settings.trial.exhausted(attempt) {
            self.backends.ui.hide_play();
        }

        for trigger in &plan.triggers {
            if let Err(e) = self.backends.synth.trigger(trigger) {
                log::warn!("Failed to trigger {}: {}", trigger.name, e);
            }
        }

        self.report_stimulus(request);

        let window = if records {
            Some(self.schedule_window(plan.record, now))
        } else {
            log::debug!("attempt {} replays without recording", attempt);
            None
        };

        Ok(PlayOutcome {
            attempt,
            duration: plan.duration,
            triggers: plan.triggers,
            window,
        })
    }

    /// Stop the running recording, or drop a window that has not opened yet.
    ///
    /// Returns the window that was closed, if there was one.
    pub fn stop_recording(&mut self) -> Option<WindowId> {
        let target = self
            .active
            .or_else(|| self.windows.keys().next().copied())?;
        self.close_window(target);
        Some(target)
    }

    /// Stop or cancel a specific window.
    pub fn stop_window(&mut self, id: WindowId) -> Result<()> {
        if !self.windows.contains_key(&id) {
            return Err(Error::UnknownWindow(id));
        }
        self.close_window(id);
        Ok(())
    }

    /// Run every timer that is due. Returns how many fired.
    pub fn poll(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut fired = 0;
        while let Some((id, due, task)) = self.timers.pop_due(now) {
            if let Some(window) = self.windows.get_mut(&task.window) {
                window.timers.retain(|t| *t != id);
            }
            log::trace!("timer {:?} for window {} at {}ms", task.action, task.window, due);
            self.run_task(task, due);
            fired += 1;
        }
        fired
    }

    /// Windows that closed or failed since the last call.
    pub fn take_closed(&mut self) -> Vec<WindowId> {
        std::mem::take(&mut self.closed)
    }

    /// Clock time of the next timer, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_due()
    }

    /// The window whose recorder is running.
    pub fn active_window(&self) -> Option<WindowId> {
        self.active
    }

    /// Whether any window is pending or open.
    pub fn has_live_window(&self) -> bool {
        !self.windows.is_empty()
    }

    /// State of a window. Windows that closed are forgotten and report `Closed`.
    pub fn window_state(&self, id: WindowId) -> WindowState {
        self.windows
            .get(&id)
            .map_or(WindowState::Closed, |w| w.state)
    }

    /// Tell the host whether the client has the audio features it needs.
    pub fn report_capabilities(&mut self, capabilities: &Capabilities) {
        if capabilities.is_capable() {
            log::info!("client has the necessary audio features");
        } else {
            log::warn!(
                "client is missing audio features: {}",
                capabilities.missing().join(", ")
            );
        }
        self.emit(BridgeEvent::BrowserCapable(capabilities.is_capable()));
    }

    /// Send the client description to the host.
    pub fn report_user_info(&mut self, environment: &ClientEnvironment) -> Result<()> {
        let report = environment.to_report()?;
        log::debug!("user info: {}", report);
        self.emit(BridgeEvent::UserInfo(report));
        Ok(())
    }

    fn emit(&mut self, event: BridgeEvent) {
        self.backends.bridge.emit(&event);
    }

    fn report_stimulus(&mut self, request: &PlaybackRequest) {
        match &request.stimulus {
            Stimulus::Tone(note) => {
                self.emit(BridgeEvent::StimuliPitch(Pitches::One(note.pitch())));
            }
            Stimulus::Sequence { .. } => {
                self.emit(BridgeEvent::StimuliPitch(Pitches::Many(
                    request.stimulus.pitches(),
                )));
            }
            Stimulus::Midi { track, cap } => {
                let notes = track.capped(*cap);
                let pitches = notes.iter().map(|n| n.midi).collect();
                let ticks = notes.iter().map(|n| n.ticks).collect();
                let durations = notes
                    .iter()
                    .map(|n| track.unit.to_seconds(n.duration))
                    .collect();
                let duration_ticks = notes.iter().map(|n| n.duration_ticks).collect();
                self.emit(BridgeEvent::StimuliPitch(Pitches::Many(pitches)));
                self.emit(BridgeEvent::StimuliTicks(ticks));
                self.emit(BridgeEvent::StimuliDuration(durations));
                self.emit(BridgeEvent::StimuliDurationTicks(duration_ticks));
            }
        }
    }

    fn allocate_window(&mut self) -> WindowId {
        let id = WindowId(self.next_window);
        self.next_window += 1;
        id
    }

    fn schedule_window(&mut self, plan: RecordPlan, now: u64) -> WindowId {
        let id = self.allocate_window();
        self.windows.insert(id, RecordingWindow::new(id, plan));

        if plan.start_delay_ms == 0 {
            self.open_window(id, now);
        } else {
            log::debug!("window {} opens in {}ms", id, plan.start_delay_ms);
            self.add_timer(id, now.saturating_add(plan.start_delay_ms), Action::Open);
        }
        id
    }

    fn add_timer(&mut self, window: WindowId, due: u64, action: Action) {
        let timer = self.timers.schedule(due, Task { window, action });
        if let Some(w) = self.windows.get_mut(&window) {
            w.timers.push(timer);
        }
    }

    fn run_task(&mut self, task: Task, due: u64) {
        match task.action {
            Action::Open => self.open_window(task.window, due),
            Action::Close => self.close_window(task.window),
            Action::ShowIndicator => self.backends.ui.show_recording_indicator(),
            Action::ShowStopControl => self.backends.ui.show_stop_control(),
        }
    }

    fn open_window(&mut self, id: WindowId, now: u64) {
        if let Some(active) = self.active {
            if active != id {
                log::debug!("window {} waits for window {} to close", id, active);
                self.deferred.push_back(id);
                return;
            }
        }

        let plan = match self.windows.get(&id) {
            Some(window) => window.plan,
            None => return,
        };

        if let Err(e) = self.backends.recorder.start() {
            self.fail_window(id, e);
            return;
        }

        log::info!("window {} recording", id);
        self.active = Some(id);
        if let Some(window) = self.windows.get_mut(&id) {
            window.state = WindowState::Open;
            window.opened_at = Some(now);
        }

        if plan.hide_play {
            self.backends.ui.hide_play();
        }
        let indicator_at = now.saturating_add(plan.indicator_lag_ms);
        if plan.show_stop {
            self.add_timer(id, indicator_at, Action::ShowStopControl);
        }
        self.add_timer(id, indicator_at, Action::ShowIndicator);

        if let StopTrigger::After(ms) = plan.stop {
            self.add_timer(id, now.saturating_add(ms), Action::Close);
        }
    }

    fn fail_window(&mut self, id: WindowId, error: RecorderError) {
        match error {
            RecorderError::PermissionDenied => {
                log::error!("window {}: microphone permission denied", id);
                self.backends.ui.alert(PERMISSION_DENIED_MESSAGE);
            }
            other => log::warn!("window {} could not start recording: {}", id, other),
        }
        self.discard_window(id);
        self.open_next_deferred();
    }

    /// Cancel a window's timers and, if it was recording, stop and deliver the capture.
    fn close_window(&mut self, id: WindowId) {
        let window = match self.discard_window(id) {
            Some(window) => window,
            None => return,
        };

        if window.state == WindowState::Open {
            self.active = None;
            match self.backends.recorder.stop() {
                Ok(audio) => {
                    log::info!(
                        "window {} closed with {:.2}s of audio",
                        id,
                        audio.duration_secs()
                    );
                    self.emit(BridgeEvent::Audio(audio));
                }
                Err(e) => log::warn!("window {}: failed to stop recorder: {}", id, e),
            }
            self.backends.ui.recording_finished();
        } else {
            log::info!("window {} cancelled before it opened", id);
        }

        self.open_next_deferred();
    }

    fn discard_window(&mut self, id: WindowId) -> Option<RecordingWindow> {
        let mut window = self.windows.remove(&id)?;
        self.closed.push(id);
        for timer in window.timers.drain(..) {
            self.timers.cancel(timer);
        }
        self.deferred.retain(|w| *w != id);
        Some(window)
    }

    fn open_next_deferred(&mut self) {
        if self.active.is_some() {
            return;
        }
        if let Some(next) = self.deferred.pop_front() {
            let now = self.clock.now_ms();
            self.open_window(next, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::{MidiNote, MidiTrack, NoteCap, Voice};
    use crate::testing::{fake_backends, Call, CallLog, Faults};
    use crate::timing::ManualClock;
    use serde_json::json;

    fn coordinator_with(
        settings: CoordinatorSettings,
        faults: Faults,
    ) -> (PlaybackRecordCoordinator, ManualClock, CallLog) {
        let clock = ManualClock::new();
        let (backends, log) = fake_backends(&clock, faults);
        let coordinator =
            PlaybackRecordCoordinator::new(backends, settings, Box::new(clock.clone()));
        (coordinator, clock, log)
    }

    fn coordinator() -> (PlaybackRecordCoordinator, ManualClock, CallLog) {
        coordinator_with(CoordinatorSettings::default(), Faults::default())
    }

    fn advance_to(coordinator: &mut PlaybackRecordCoordinator, clock: &ManualClock, ms: u64) {
        clock.set(ms);
        coordinator.poll();
    }

    #[test]
    fn test_single_tone_end_to_end() {
        let (mut coordinator, clock, log) = coordinator();
        let mut session = PlaybackSession::new();

        let outcome = coordinator
            .play(&mut session, &PlaybackRequest::tone(64, 1.0))
            .unwrap();
        assert_eq!(outcome.attempt, 1);
        assert!(outcome.window.is_some());

        let triggers = log.triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].pitch, 64);
        assert!((triggers[0].duration - 1.0).abs() < 1e-9);

        assert_eq!(log.times_of(&Call::RecordStart), vec![0]);
        assert_eq!(log.times_of(&Call::HidePlay), vec![0]);
        assert_eq!(log.bridge("stimuli_pitch"), vec![json!(64)]);
        assert_eq!(log.bridge("playback_count"), vec![json!(1)]);
        assert_eq!(log.bridge("playback_times"), vec![json!([0])]);
        assert_eq!(coordinator.next_deadline(), Some(500));

        advance_to(&mut coordinator, &clock, 500);
        assert_eq!(log.times_of(&Call::ShowIndicator), vec![500]);
        assert_eq!(log.count(&Call::ShowStop), 0);

        advance_to(&mut coordinator, &clock, 1499);
        assert_eq!(log.count(&Call::RecordStop), 0);

        advance_to(&mut coordinator, &clock, 1500);
        assert_eq!(log.times_of(&Call::RecordStop), vec![1500]);
        assert_eq!(log.count(&Call::Finished), 1);
        assert_eq!(log.bridge("audio").len(), 1);
        assert_eq!(coordinator.take_closed(), vec![outcome.window.unwrap()]);
        assert!(coordinator.take_closed().is_empty());
        assert!(!coordinator.has_live_window());
        assert_eq!(coordinator.next_deadline(), None);
    }

    #[test]
    fn test_sequence_records_after_playback_and_waits_for_stop() {
        let (mut coordinator, clock, log) = coordinator();
        let mut session = PlaybackSession::new();
        let request = PlaybackRequest::sequence(&[60, 62, 64], 0.5);

        let outcome = coordinator.play(&mut session, &request).unwrap();
        let window = outcome.window.unwrap();
        assert!((outcome.duration - 1.5).abs() < 1e-9);
        assert_eq!(coordinator.window_state(window), WindowState::Pending);
        assert_eq!(log.bridge("stimuli_pitch"), vec![json!([60, 62, 64])]);

        advance_to(&mut coordinator, &clock, 1899);
        assert_eq!(log.count(&Call::RecordStart), 0);

        advance_to(&mut coordinator, &clock, 1900);
        assert_eq!(log.times_of(&Call::RecordStart), vec![1900]);
        assert_eq!(coordinator.window_state(window), WindowState::Open);

        advance_to(&mut coordinator, &clock, 2400);
        let ui: Vec<Call> = log
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::ShowStop | Call::ShowIndicator))
            .collect();
        assert_eq!(ui, vec![Call::ShowStop, Call::ShowIndicator]);

        advance_to(&mut coordinator, &clock, 60_000);
        assert_eq!(log.count(&Call::RecordStop), 0);

        assert_eq!(coordinator.stop_recording(), Some(window));
        assert_eq!(log.times_of(&Call::RecordStop), vec![60_000]);
        assert_eq!(coordinator.window_state(window), WindowState::Closed);
        assert_eq!(coordinator.stop_recording(), None);
    }

    #[test]
    fn test_empty_sequence_records_immediately() {
        let (mut coordinator, _clock, log) = coordinator();
        let mut session = PlaybackSession::new();

        coordinator
            .play(&mut session, &PlaybackRequest::sequence(&[], 0.5))
            .unwrap();
        assert!(log.triggers().is_empty());
        assert_eq!(log.times_of(&Call::RecordStart), vec![0]);
    }

    #[test]
    fn test_only_first_attempt_records_and_third_hides_play() {
        let (mut coordinator, clock, log) = coordinator();
        let mut session = PlaybackSession::new();
        let request = PlaybackRequest::sequence(&[60, 64], 0.5);

        coordinator.play(&mut session, &request).unwrap();
        advance_to(&mut coordinator, &clock, 5_000);
        assert_eq!(log.count(&Call::RecordStart), 1);
        assert_eq!(log.count(&Call::HidePlay), 0);

        let second = coordinator.play(&mut session, &request).unwrap();
        assert_eq!(second.attempt, 2);
        assert!(second.window.is_none());
        assert_eq!(log.count(&Call::HidePlay), 0);

        advance_to(&mut coordinator, &clock, 7_500);
        let third = coordinator.play(&mut session, &request).unwrap();
        assert_eq!(third.attempt, 3);
        assert!(third.window.is_none());
        assert_eq!(log.count(&Call::HidePlay), 1);

        advance_to(&mut coordinator, &clock, 20_000);
        assert_eq!(log.count(&Call::RecordStart), 1);
        assert_eq!(log.triggers().len(), 6);
        assert_eq!(
            log.bridge("playback_count"),
            vec![json!(1), json!(2), json!(3)]
        );
        assert_eq!(
            log.bridge("playback_times").last().unwrap(),
            &json!([0, 5_000, 7_500])
        );
    }

    #[test]
    fn test_attempt_counter_counts_every_request_type() {
        let (mut coordinator, _clock, _log) = coordinator();
        let mut session = PlaybackSession::new();
        let track = MidiTrack::new(vec![MidiNote::new(60, 0.0, 0.5)]);
        let requests = [
            PlaybackRequest::tone(60, 0.5),
            PlaybackRequest::sequence(&[60], 0.5),
            PlaybackRequest::midi(track, NoteCap::All),
        ];

        for (i, request) in requests.iter().enumerate() {
            let outcome = coordinator.play(&mut session, request).unwrap();
            assert_eq!(outcome.attempt, i as u32 + 1);
            assert_eq!(session.attempts(), i as u32 + 1);
        }
    }

    #[test]
    fn test_midi_playback_reports_parallel_arrays() {
        let (mut coordinator, clock, log) = coordinator();
        let mut session = PlaybackSession::new();
        let mut notes = vec![
            MidiNote::new(60, 0.0, 0.5),
            MidiNote::new(62, 0.5, 0.25),
            MidiNote::new(64, 0.75, 1.0),
        ];
        for (i, note) in notes.iter_mut().enumerate() {
            note.ticks = i as u32 * 480;
            note.duration_ticks = 480;
        }
        let request = PlaybackRequest::midi(MidiTrack::new(notes), NoteCap::First(2))
            .with_voice(Voice::Piano)
            .with_transpose(2);

        let outcome = coordinator.play(&mut session, &request).unwrap();
        assert!((outcome.duration - 0.75).abs() < 1e-9);

        let sent: Vec<u8> = log.triggers().iter().map(|t| t.pitch).collect();
        assert_eq!(sent, vec![50, 52]);
        assert_eq!(log.bridge("stimuli_pitch"), vec![json!([60, 62])]);
        assert_eq!(log.bridge("stimuli_ticks"), vec![json!([0, 480])]);
        assert_eq!(log.bridge("stimuli_duration"), vec![json!([0.5, 0.25])]);
        assert_eq!(log.bridge("stimuli_durationTicks"), vec![json!([480, 480])]);

        // 0.75s of notes behind a 0.5s lead-in, then the 400ms lag.
        advance_to(&mut coordinator, &clock, 1_649);
        assert_eq!(log.count(&Call::RecordStart), 0);
        advance_to(&mut coordinator, &clock, 1_650);
        assert_eq!(log.times_of(&Call::RecordStart), vec![1_650]);
    }

    #[test]
    fn test_midi_recording_starts_after_last_note_ends() {
        let (mut coordinator, clock, log) = coordinator();
        let mut session = PlaybackSession::new();
        let track = MidiTrack::new(vec![
            MidiNote::new(60, 0.0, 1.0),
            MidiNote::new(64, 1.0, 1.0),
        ]);

        clock.set(3_000);
        coordinator
            .play(&mut session, &PlaybackRequest::midi(track, NoteCap::All))
            .unwrap();
        let last_end = log
            .triggers()
            .iter()
            .map(|t| t.at.unwrap() + t.duration)
            .fold(0.0, f64::max);
        assert!((last_end - 5.5).abs() < 1e-9);

        advance_to(&mut coordinator, &clock, 60_000);
        let started = log.times_of(&Call::RecordStart);
        assert_eq!(started, vec![5_900]);
        assert!(started[0] as f64 / 1000.0 >= last_end);
    }

    #[test]
    fn test_pitch_error_has_no_side_effects() {
        let (mut coordinator, _clock, log) = coordinator();
        let mut session = PlaybackSession::new();
        let request = PlaybackRequest::tone(3, 1.0).with_voice(Voice::Piano);

        assert!(coordinator.play(&mut session, &request).is_err());
        assert_eq!(session.attempts(), 0);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_permission_denied_alerts_and_closes_window() {
        let faults = Faults {
            deny_microphone: true,
            ..Faults::default()
        };
        let (mut coordinator, _clock, log) =
            coordinator_with(CoordinatorSettings::default(), faults);
        let mut session = PlaybackSession::new();

        let outcome = coordinator
            .play(&mut session, &PlaybackRequest::tone(64, 1.0))
            .unwrap();
        let window = outcome.window.unwrap();

        assert_eq!(coordinator.window_state(window), WindowState::Closed);
        assert_eq!(log.count(&Call::RecordStart), 0);
        assert!(log
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Alert(m) if m.contains("Microphone"))));
        assert_eq!(coordinator.next_deadline(), None);
    }

    #[test]
    fn test_unschedulable_duration_is_rejected_without_side_effects() {
        let (mut coordinator, _clock, log) = coordinator();
        let mut session = PlaybackSession::new();

        for request in [
            PlaybackRequest::tone(64, 1.0e17),
            PlaybackRequest::tone(64, f64::INFINITY),
            PlaybackRequest::sequence(&[60, 62], f64::INFINITY),
        ] {
            let err = coordinator.play(&mut session, &request).unwrap_err();
            assert!(matches!(err, Error::InvalidDuration(_)));
        }
        assert_eq!(session.attempts(), 0);
        assert!(log.calls().is_empty());
        assert_eq!(coordinator.next_deadline(), None);
    }

    #[test]
    fn test_synth_failure_still_plays_remaining_notes() {
        let faults = Faults {
            synth_pitch: Some(62),
            ..Faults::default()
        };
        let (mut coordinator, clock, log) =
            coordinator_with(CoordinatorSettings::default(), faults);
        let mut session = PlaybackSession::new();

        let outcome = coordinator
            .play(&mut session, &PlaybackRequest::sequence(&[60, 62, 64], 0.5))
            .unwrap();
        assert_eq!(outcome.triggers.len(), 3);

        let sent: Vec<u8> = log.triggers().iter().map(|t| t.pitch).collect();
        assert_eq!(sent, vec![60, 64]);
        assert_eq!(log.bridge("playback_count"), vec![json!(1)]);
        assert_eq!(log.bridge("stimuli_pitch"), vec![json!([60, 62, 64])]);

        advance_to(&mut coordinator, &clock, 1_900);
        assert_eq!(coordinator.active_window(), outcome.window);
    }

    #[test]
    fn test_unavailable_recorder_skips_to_next_queued_window() {
        let faults = Faults {
            start_errors: [
                None,
                Some(RecorderError::Unavailable("no input device".to_string())),
            ]
            .into_iter()
            .collect(),
            ..Faults::default()
        };
        let (mut coordinator, clock, log) =
            coordinator_with(settings_with(OverlapPolicy::Queue), faults);
        let request = PlaybackRequest::sequence(&[60, 62], 0.5);

        let first = coordinator
            .play(&mut PlaybackSession::new(), &request)
            .unwrap()
            .window
            .unwrap();
        advance_to(&mut coordinator, &clock, 1_400);
        let second = coordinator
            .play(&mut PlaybackSession::new(), &request)
            .unwrap()
            .window
            .unwrap();
        let third = coordinator
            .play(&mut PlaybackSession::new(), &request)
            .unwrap()
            .window
            .unwrap();
        advance_to(&mut coordinator, &clock, 3_000);
        assert_eq!(coordinator.window_state(second), WindowState::Pending);
        assert_eq!(coordinator.window_state(third), WindowState::Pending);

        assert_eq!(coordinator.stop_recording(), Some(first));
        assert_eq!(coordinator.window_state(second), WindowState::Closed);
        assert_eq!(coordinator.active_window(), Some(third));
        assert_eq!(log.times_of(&Call::RecordStart), vec![1_400, 3_000]);
        assert!(!log.calls().iter().any(|c| matches!(c, Call::Alert(_))));
        assert_eq!(coordinator.take_closed(), vec![first, second]);
    }

    #[test]
    fn test_stop_failure_still_finishes_window() {
        let faults = Faults {
            stop_error: Some(RecorderError::Failed("encoder crashed".to_string())),
            ..Faults::default()
        };
        let (mut coordinator, clock, log) =
            coordinator_with(CoordinatorSettings::default(), faults);
        let mut session = PlaybackSession::new();

        let window = coordinator
            .play(&mut session, &PlaybackRequest::tone(64, 1.0))
            .unwrap()
            .window
            .unwrap();
        advance_to(&mut coordinator, &clock, 1_500);

        assert_eq!(log.times_of(&Call::RecordStop), vec![1_500]);
        assert_eq!(log.count(&Call::Finished), 1);
        assert!(log.bridge("audio").is_empty());
        assert_eq!(coordinator.active_window(), None);
        assert_eq!(coordinator.window_state(window), WindowState::Closed);
        assert_eq!(coordinator.take_closed(), vec![window]);
        assert_eq!(coordinator.next_deadline(), None);
    }

    fn settings_with(overlap: OverlapPolicy) -> CoordinatorSettings {
        CoordinatorSettings {
            trial: TrialPolicy {
                overlap,
                ..TrialPolicy::default()
            },
            ..CoordinatorSettings::default()
        }
    }

    #[test]
    fn test_overlap_reject() {
        let (mut coordinator, clock, log) =
            coordinator_with(settings_with(OverlapPolicy::Reject), Faults::default());
        let request = PlaybackRequest::sequence(&[60, 62], 0.5);

        let mut first_trial = PlaybackSession::new();
        coordinator.play(&mut first_trial, &request).unwrap();
        advance_to(&mut coordinator, &clock, 1_400);
        log.clear();

        let mut second_trial = PlaybackSession::new();
        let err = coordinator.play(&mut second_trial, &request).unwrap_err();
        assert!(matches!(err, Error::Busy));
        assert_eq!(second_trial.attempts(), 0);
        assert!(log.calls().is_empty());
        assert!(coordinator.active_window().is_some());
    }

    #[test]
    fn test_overlap_replace_cancels_pending_stop() {
        let (mut coordinator, clock, log) =
            coordinator_with(settings_with(OverlapPolicy::Replace), Faults::default());

        let mut first_trial = PlaybackSession::new();
        let first = coordinator
            .play(&mut first_trial, &PlaybackRequest::tone(60, 1.0))
            .unwrap()
            .window
            .unwrap();

        advance_to(&mut coordinator, &clock, 1_000);
        let mut second_trial = PlaybackSession::new();
        let second = coordinator
            .play(&mut second_trial, &PlaybackRequest::tone(62, 1.0))
            .unwrap()
            .window
            .unwrap();

        assert_eq!(coordinator.window_state(first), WindowState::Closed);
        assert_eq!(coordinator.window_state(second), WindowState::Open);
        assert_eq!(log.times_of(&Call::RecordStart), vec![0, 1_000]);
        assert_eq!(log.times_of(&Call::RecordStop), vec![1_000]);

        // The first window's 1500ms auto-stop must not cut the second short.
        advance_to(&mut coordinator, &clock, 1_500);
        assert_eq!(log.times_of(&Call::RecordStop), vec![1_000]);
        advance_to(&mut coordinator, &clock, 2_500);
        assert_eq!(log.times_of(&Call::RecordStop), vec![1_000, 2_500]);
    }

    #[test]
    fn test_overlap_queue_opens_after_current_closes() {
        let (mut coordinator, clock, log) =
            coordinator_with(settings_with(OverlapPolicy::Queue), Faults::default());
        let request = PlaybackRequest::sequence(&[60, 62], 0.5);

        let mut first_trial = PlaybackSession::new();
        let first = coordinator.play(&mut first_trial, &request).unwrap().window.unwrap();
        advance_to(&mut coordinator, &clock, 1_400);
        assert_eq!(coordinator.active_window(), Some(first));

        let mut second_trial = PlaybackSession::new();
        let second = coordinator.play(&mut second_trial, &request).unwrap().window.unwrap();
        assert_eq!(log.triggers().len(), 4);

        advance_to(&mut coordinator, &clock, 10_000);
        assert_eq!(coordinator.window_state(second), WindowState::Pending);
        assert_eq!(log.count(&Call::RecordStart), 1);

        assert_eq!(coordinator.stop_recording(), Some(first));
        assert_eq!(coordinator.active_window(), Some(second));
        assert_eq!(log.times_of(&Call::RecordStart), vec![1_400, 10_000]);

        coordinator.stop_window(second).unwrap();
        assert!(!coordinator.has_live_window());
        assert!(matches!(
            coordinator.stop_window(second),
            Err(Error::UnknownWindow(id)) if id == second
        ));
    }

    #[test]
    fn test_replays_never_consult_overlap_policy() {
        let (mut coordinator, clock, log) =
            coordinator_with(settings_with(OverlapPolicy::Reject), Faults::default());
        let mut session = PlaybackSession::new();
        let request = PlaybackRequest::sequence(&[60, 62], 0.5);

        coordinator.play(&mut session, &request).unwrap();
        advance_to(&mut coordinator, &clock, 1_400);
        assert!(coordinator.play(&mut session, &request).is_ok());
        assert_eq!(log.count(&Call::RecordStart), 1);
    }

    #[test]
    fn test_environment_reports() {
        let (mut coordinator, _clock, log) = coordinator();
        coordinator.report_capabilities(&Capabilities {
            audio: true,
            audio_preload: true,
            web_audio: true,
            media_recorder: false,
        });
        let env = ClientEnvironment::from_json(r#"{"userAgent": "x", "plugins": []}"#).unwrap();
        coordinator.report_user_info(&env).unwrap();

        assert_eq!(log.bridge("browser_capable"), vec![json!("FALSE")]);
        assert_eq!(log.bridge("user_info"), vec![json!(r#"{"userAgent":"x"}"#)]);
    }
}
