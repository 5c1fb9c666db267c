//! Per-trial playback bookkeeping.
//!
//! A [`PlaybackSession`] lives for one trial. The caller creates a fresh one
//! at the start of every trial and hands it to the coordinator on each play,
//! so nothing leaks from one trial into the next.

use serde::Serialize;

/// Attempt counter and timing for one trial.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackSession {
    attempts: u32,
    /// Clock time of each attempt, in ms.
    timestamps: Vec<u64>,
    /// Sum of the estimated durations of everything played so far, in seconds.
    expected_duration: f64,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one play attempt made at `now_ms`. Returns the new attempt number.
    pub fn record_attempt(&mut self, now_ms: u64, expected_seconds: f64) -> u32 {
        self.attempts += 1;
        self.timestamps.push(now_ms);
        self.expected_duration += expected_seconds.max(0.0);
        self.attempts
    }

    /// Number of play attempts so far (0 before the first play).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn expected_duration(&self) -> f64 {
        self.expected_duration
    }

    /// Milliseconds from the first attempt to each attempt.
    ///
    /// This is the running sum of the gaps between consecutive attempts, so
    /// the first entry is always 0.
    pub fn playback_times(&self) -> Vec<u64> {
        let first = match self.timestamps.first() {
            Some(&t) => t,
            None => return Vec::new(),
        };
        self.timestamps
            .iter()
            .map(|&t| t.saturating_sub(first))
            .collect()
    }

    /// Gaps between consecutive attempts, with a leading 0.
    pub fn attempt_gaps(&self) -> Vec<u64> {
        let mut gaps = vec![];
        let mut previous = None;
        for &t in &self.timestamps {
            gaps.push(previous.map_or(0, |p: u64| t.saturating_sub(p)));
            previous = Some(t);
        }
        gaps
    }
}
