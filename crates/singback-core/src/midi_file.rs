//! Standard MIDI file decoding.
//!
//! Tracks are decoded into [`MidiTrack`]s with times in seconds. Tempo
//! changes from every track form one tempo map, so a conductor track in a
//! multi-track file drives the timing of the note tracks.

use crate::error::{Error, Result};
use crate::note::note_name;
use crate::stimulus::{MidiNote, MidiTrack, TimeUnit};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

/// Microseconds per quarter note until the first tempo event (120 BPM).
const DEFAULT_TEMPO_US: u32 = 500_000;

/// A decoded MIDI file.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
    /// Ticks per quarter note, or ticks per second for timecode files.
    pub ticks_per_beat: u32,
    pub tracks: Vec<MidiTrack>,
}

impl MidiFile {
    /// First track that contains notes.
    pub fn first_note_track(&self) -> Option<&MidiTrack> {
        self.tracks.iter().find(|t| !t.notes.is_empty())
    }

    /// Track by index, falling back to the first track with notes.
    pub fn track_or_first(&self, index: Option<usize>) -> Result<&MidiTrack> {
        match index {
            Some(i) => self.tracks.get(i).ok_or_else(|| {
                Error::Midi(format!(
                    "track {} does not exist ({} tracks)",
                    i,
                    self.tracks.len()
                ))
            }),
            None => self
                .first_note_track()
                .ok_or_else(|| Error::Midi("file contains no notes".to_string())),
        }
    }
}

/// Read and decode a MIDI file from disk.
pub fn load_midi_file(path: &Path) -> Result<MidiFile> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Midi(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_midi_bytes(&bytes)
}

/// Fetch and decode a MIDI file over HTTP.
#[cfg(feature = "remote")]
pub fn fetch_midi(url: &str) -> Result<MidiFile> {
    log::info!("fetching MIDI from {}", url);
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Midi(format!("Failed to fetch {}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .map_err(|e| Error::Midi(format!("Failed to read {}: {}", url, e)))?;
    parse_midi_bytes(&bytes)
}

/// Decode an in-memory MIDI file.
pub fn parse_midi_bytes(bytes: &[u8]) -> Result<MidiFile> {
    let smf = Smf::parse(bytes).map_err(|e| Error::Midi(format!("Failed to parse: {}", e)))?;

    let clock = match smf.header.timing {
        Timing::Metrical(ppq) if ppq.as_int() > 0 => {
            TickClock::Metrical(TempoMap::from_smf(&smf, ppq.as_int() as u32))
        }
        Timing::Metrical(_) => {
            return Err(Error::Midi("header has zero ticks per beat".to_string()));
        }
        Timing::Timecode(fps, subframes) => {
            TickClock::Timecode(fps.as_f32() as f64 * subframes as f64)
        }
    };

    let tracks: Vec<MidiTrack> = smf
        .tracks
        .iter()
        .map(|events| decode_track(events, &clock))
        .collect();

    log::debug!(
        "decoded {} tracks ({} notes)",
        tracks.len(),
        tracks.iter().map(|t| t.notes.len()).sum::<usize>()
    );

    Ok(MidiFile {
        ticks_per_beat: clock.ticks_per_beat(),
        tracks,
    })
}

/// Converts absolute ticks to seconds.
enum TickClock {
    Metrical(TempoMap),
    /// Ticks per second.
    Timecode(f64),
}

impl TickClock {
    fn seconds(&self, tick: u32) -> f64 {
        match self {
            TickClock::Metrical(map) => map.seconds(tick),
            TickClock::Timecode(rate) if *rate > 0.0 => tick as f64 / rate,
            TickClock::Timecode(_) => 0.0,
        }
    }

    fn ticks_per_beat(&self) -> u32 {
        match self {
            TickClock::Metrical(map) => map.ppq,
            TickClock::Timecode(rate) => *rate as u32,
        }
    }
}

/// Tempo changes as (tick, seconds at that tick, microseconds per quarter).
struct TempoMap {
    ppq: u32,
    segments: Vec<(u32, f64, u32)>,
}

impl TempoMap {
    fn from_smf(smf: &Smf, ppq: u32) -> Self {
        let mut changes: Vec<(u32, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick: u32 = 0;
            for event in track {
                tick = tick.saturating_add(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    changes.push((tick, tempo.as_int()));
                }
            }
        }
        // Stable: among equal ticks the later event wins.
        changes.sort_by_key(|&(tick, _)| tick);

        let mut segments = vec![(0, 0.0, DEFAULT_TEMPO_US)];
        for (tick, tempo) in changes {
            let seconds = Self::advance(segments[segments.len() - 1], tick, ppq);
            match segments.last_mut() {
                Some(last) if last.0 == tick => *last = (tick, seconds, tempo),
                _ => segments.push((tick, seconds, tempo)),
            }
        }
        Self { ppq, segments }
    }

    fn advance((start_tick, start_secs, tempo): (u32, f64, u32), tick: u32, ppq: u32) -> f64 {
        let beats = tick.saturating_sub(start_tick) as f64 / ppq as f64;
        start_secs + beats * tempo as f64 / 1_000_000.0
    }

    fn seconds(&self, tick: u32) -> f64 {
        let index = self.segments.partition_point(|&(t, _, _)| t <= tick);
        let segment = self.segments[index.saturating_sub(1)];
        Self::advance(segment, tick, self.ppq)
    }
}

fn decode_track(events: &[midly::TrackEvent], clock: &TickClock) -> MidiTrack {
    let mut name = None;
    let mut tick: u32 = 0;
    // (start tick, velocity) per (channel, key), oldest first
    let mut sounding: HashMap<(u8, u8), VecDeque<(u32, u8)>> = HashMap::new();
    let mut spans: Vec<(u32, u32, u8, u8)> = Vec::new();

    for event in events {
        tick = tick.saturating_add(event.delta.as_int());
        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                name = Some(String::from_utf8_lossy(raw).trim().to_string());
            }
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        sounding
                            .entry((channel, key.as_int()))
                            .or_default()
                            .push_back((tick, vel.as_int()));
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let key = key.as_int();
                        if let Some((start, vel)) = sounding
                            .get_mut(&(channel, key))
                            .and_then(VecDeque::pop_front)
                        {
                            spans.push((start, tick, key, vel));
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // Notes still sounding end with the track.
    for ((_, key), starts) in sounding {
        for (start, vel) in starts {
            log::warn!("note {} at tick {} has no note-off", note_name(key), start);
            spans.push((start, tick, key, vel));
        }
    }
    spans.sort_by_key(|&(start, _, key, _)| (start, key));

    let notes: Vec<MidiNote> = spans
        .into_iter()
        .map(|(start, end, key, vel)| {
            let time = clock.seconds(start);
            MidiNote {
                name: note_name(key),
                midi: key,
                time,
                duration: clock.seconds(end) - time,
                velocity: vel as f32 / 127.0,
                ticks: start,
                duration_ticks: end - start,
            }
        })
        .collect();

    let duration = notes
        .iter()
        .map(|n| n.time + n.duration)
        .fold(0.0_f64, f64::max);

    MidiTrack {
        name: name.filter(|n| !n.is_empty()),
        notes,
        duration: Some(duration),
        unit: TimeUnit::Seconds,
    }
}
