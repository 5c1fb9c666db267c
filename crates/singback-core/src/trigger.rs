//! Turning a playback request into timed note triggers.
//!
//! Each trigger carries the pitch actually sent to the synthesis backend,
//! after the request's transposition and any per-voice correction, and an
//! absolute start time on the coordinator's clock.

use crate::error::Result;
use crate::note::{note_name, transpose, Note, OCTAVE};
use crate::stimulus::{PlaybackRequest, Stimulus, Voice};
use serde::Serialize;

/// One call to the synthesis backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTrigger {
    pub voice: Voice,
    pub pitch: u8,
    pub name: String,
    /// Sounding length in seconds.
    pub duration: f64,
    /// Absolute start time in seconds; `None` means "now".
    pub at: Option<f64>,
    pub velocity: Option<f32>,
}

/// Knobs that shape trigger construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerOptions {
    /// Shift sampled-instrument notes down one octave.
    ///
    /// The sampled piano renders an octave above the requested pitch.
    pub sampled_octave_correction: bool,
    /// Silence before the first MIDI note, in seconds.
    pub midi_lead_in: f64,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            sampled_octave_correction: true,
            midi_lead_in: 0.5,
        }
    }
}

/// Semitone correction applied to every note rendered by `voice`.
pub fn voice_correction(voice: Voice, options: &TriggerOptions) -> i32 {
    if voice.is_sampled() && options.sampled_octave_correction {
        -OCTAVE
    } else {
        0
    }
}

/// Build the triggers for `request`, with `start` as the session start in seconds.
///
/// Triggers are returned in non-decreasing time order.
pub fn plan_triggers(
    request: &PlaybackRequest,
    start: f64,
    options: &TriggerOptions,
) -> Result<Vec<NoteTrigger>> {
    let shift = request.transpose + voice_correction(request.voice, options);

    let mut triggers = match &request.stimulus {
        Stimulus::Tone(note) => {
            let at = note.offset().map(|offset| start + offset);
            vec![trigger_for(request.voice, note, shift, at)?]
        }
        Stimulus::Sequence { notes, spacing } => notes
            .iter()
            .enumerate()
            .map(|(slot, note)| {
                let at = start + slot as f64 * spacing.max(0.0);
                trigger_for(request.voice, note, shift, Some(at))
            })
            .collect::<Result<Vec<_>>>()?,
        Stimulus::Midi { track, cap } => {
            let origin = start + options.midi_lead_in.max(0.0);
            track
                .capped(*cap)
                .iter()
                .map(|n| -> Result<NoteTrigger> {
                    let pitch = transpose(n.midi, shift)?;
                    Ok(NoteTrigger {
                        voice: request.voice,
                        pitch,
                        name: note_name(pitch),
                        duration: track.unit.to_seconds(n.duration),
                        at: Some(origin + track.unit.to_seconds(n.time)),
                        velocity: Some(n.velocity),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        }
    };

    // Decoded tracks are usually sorted already; make it a guarantee.
    triggers.sort_by(|a, b| {
        a.at
            .unwrap_or(start)
            .partial_cmp(&b.at.unwrap_or(start))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    log::debug!(
        "planned {} triggers ({:?}, shift {:+})",
        triggers.len(),
        request.voice,
        shift
    );
    Ok(triggers)
}

fn trigger_for(voice: Voice, note: &Note, shift: i32, at: Option<f64>) -> Result<NoteTrigger> {
    let corrected = note.transposed(shift)?;
    Ok(NoteTrigger {
        voice,
        pitch: corrected.pitch(),
        name: corrected.name(),
        duration: corrected.duration(),
        at,
        velocity: corrected.velocity(),
    })
}
