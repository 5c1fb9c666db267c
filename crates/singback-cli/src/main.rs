//! singback - rehearse and inspect playback-then-record trials
//!
//! Plans stimuli without playing them, runs whole trials in real time with
//! logging backends, and inspects pitches and MIDI files.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use singback_core::duration::{check_seconds, MAX_STIMULUS_SECONDS};
use singback_core::{
    load_midi_file, note_name, parse_note_name, plan_playback, Backends, BridgeEvent, Config,
    HostBridge, JsonLinesBridge, LoggingSynth, LoggingUi, MidiFile, NoteCap, PlayOutcome,
    PlaybackRecordCoordinator, PlaybackRequest, RangeClassifier, Runtime, RuntimeEvent,
    RuntimeHandle, SilentRecorder, SystemClock, Voice, WindowId,
};

#[derive(Parser)]
#[command(name = "singback")]
#[command(author, version, about = "Playback-then-record trials for singing experiments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.config/singback/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init,
    /// Show the configuration file path
    ConfigPath,
    /// Print the triggers and recording timeline for a stimulus as JSON
    Plan {
        #[command(subcommand)]
        stimulus: StimulusCommand,
    },
    /// Play a stimulus in real time and record with a silent recorder
    Run {
        /// Number of times play is pressed
        #[arg(long, default_value = "1")]
        plays: u32,

        /// Pause between presses of play, in milliseconds
        #[arg(long, default_value = "2000")]
        interval_ms: u64,

        /// Press stop this long after the last play if recording is still open
        #[arg(long, default_value = "3000")]
        stop_after_ms: u64,

        /// Write each capture as a WAV file into this directory
        #[arg(long)]
        wav_dir: Option<PathBuf>,

        #[command(subcommand)]
        stimulus: StimulusCommand,
    },
    /// Show which voice ranges pitches fall in
    Classify {
        /// MIDI numbers or note names (e.g. 64 or E4)
        #[arg(required = true, value_parser = parse_pitch)]
        pitches: Vec<u8>,
    },
    /// List the tracks and notes of a MIDI file
    MidiInfo {
        /// Path (or http(s) URL with the `remote` feature)
        source: String,

        /// Print the decoded tracks as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
enum StimulusCommand {
    /// A single tone
    Tone {
        #[arg(value_parser = parse_pitch)]
        pitch: u8,

        /// Length in seconds
        #[arg(long, default_value = "1.0")]
        seconds: f64,

        #[command(flatten)]
        voice: VoiceArgs,
    },
    /// Evenly spaced notes
    Sequence {
        #[arg(required = true, value_parser = parse_pitch)]
        pitches: Vec<u8>,

        /// Seconds between notes (default from config)
        #[arg(long)]
        spacing: Option<f64>,

        #[command(flatten)]
        voice: VoiceArgs,
    },
    /// Notes from a MIDI file
    Midi {
        /// Path (or http(s) URL with the `remote` feature)
        source: String,

        /// Track index (default: first track with notes)
        #[arg(long)]
        track: Option<usize>,

        /// Play only this many notes ("max" for all)
        #[arg(long, default_value = "max")]
        cap: NoteCap,

        #[command(flatten)]
        voice: VoiceArgs,
    },
}

#[derive(Args, Clone)]
struct VoiceArgs {
    /// Voice: tone or piano (default from config)
    #[arg(long)]
    voice: Option<Voice>,

    /// Extra semitones on top of the configured transposition
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    transpose: i32,

    /// Keep the play button visible while recording
    #[arg(long)]
    keep_play: bool,
}

fn parse_pitch(s: &str) -> std::result::Result<u8, String> {
    match s.parse::<u8>() {
        Ok(n) if n <= 127 => Ok(n),
        Ok(n) => Err(format!("{} is outside the MIDI range", n)),
        Err(_) => parse_note_name(s).map_err(|e| e.to_string()),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Commands::ConfigPath => {
            let path = Config::config_path()?;
            println!("{}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Init | Commands::ConfigPath => Ok(()),
        Commands::Plan { stimulus } => plan(&config, &stimulus),
        Commands::Run {
            plays,
            interval_ms,
            stop_after_ms,
            wav_dir,
            stimulus,
        } => run(
            &config,
            &stimulus,
            plays,
            Duration::from_millis(interval_ms),
            Duration::from_millis(stop_after_ms),
            wav_dir,
        ),
        Commands::Classify { pitches } => {
            classify(&config, &pitches);
            Ok(())
        }
        Commands::MidiInfo { source, json } => midi_info(&source, json),
    }
}

fn load_midi(source: &str) -> Result<MidiFile> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return fetch_midi(source);
    }
    Ok(load_midi_file(Path::new(source))?)
}

#[cfg(feature = "remote")]
fn fetch_midi(url: &str) -> Result<MidiFile> {
    Ok(singback_core::fetch_midi(url)?)
}

#[cfg(not(feature = "remote"))]
fn fetch_midi(url: &str) -> Result<MidiFile> {
    bail!("loading {} needs the `remote` feature", url)
}

fn build_request(config: &Config, stimulus: &StimulusCommand) -> Result<PlaybackRequest> {
    let (request, voice) = match stimulus {
        StimulusCommand::Tone {
            pitch,
            seconds,
            voice,
        } => {
            if check_seconds(*seconds).is_err() {
                bail!(
                    "seconds must be a non-negative number of at most {}",
                    MAX_STIMULUS_SECONDS
                );
            }
            (PlaybackRequest::tone(*pitch, *seconds), voice)
        }
        StimulusCommand::Sequence {
            pitches,
            spacing,
            voice,
        } => {
            let spacing = spacing.unwrap_or(config.timing.sequence_spacing);
            if !(spacing.is_finite() && spacing >= 0.0) {
                bail!("spacing must be a non-negative number");
            }
            (PlaybackRequest::sequence(pitches, spacing), voice)
        }
        StimulusCommand::Midi {
            source,
            track,
            cap,
            voice,
        } => {
            let file = load_midi(source)?;
            let track = file.track_or_first(*track)?.clone();
            (PlaybackRequest::midi(track, *cap), voice)
        }
    };

    let mut request = config.apply_voice(request.with_transpose(voice.transpose));
    if let Some(v) = voice.voice {
        request = request.with_voice(v);
    }
    if voice.keep_play {
        request = request.with_hide_play(false);
    }
    Ok(request)
}

fn plan(config: &Config, stimulus: &StimulusCommand) -> Result<()> {
    let request = build_request(config, stimulus)?;
    let plan = plan_playback(&request, 0.0, &config.to_settings())?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn classify(config: &Config, pitches: &[u8]) {
    let classifier = RangeClassifier::new(config.ranges.clone());
    for &pitch in pitches {
        let ranges = classifier.classify(pitch);
        let label = if ranges.is_empty() {
            "-".to_string()
        } else {
            ranges.join(", ")
        };
        println!("{:>4} {:<4} {}", pitch, note_name(pitch), label);
    }
}

fn midi_info(source: &str, as_json: bool) -> Result<()> {
    let file = load_midi(source)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&file.tracks)?);
        return Ok(());
    }

    println!("{} ticks per beat, {} tracks", file.ticks_per_beat, file.tracks.len());
    for (i, track) in file.tracks.iter().enumerate() {
        println!(
            "track {}: {} ({} notes, {:.3}s)",
            i,
            track.name.as_deref().unwrap_or("unnamed"),
            track.notes.len(),
            track.duration_seconds()
        );
        for note in &track.notes {
            println!(
                "  {:>8.3}s {:<4} ({:>3}) {:.3}s vel {:.2} ticks {}+{}",
                note.time,
                note.name,
                note.midi,
                note.duration,
                note.velocity,
                note.ticks,
                note.duration_ticks
            );
        }
    }
    Ok(())
}

/// Forwards bridge events to stdout, writing captures to WAV files.
struct CliBridge {
    out: JsonLinesBridge<Stdout>,
    wav_dir: Option<PathBuf>,
    captures: usize,
}

impl CliBridge {
    fn write_wav(&mut self, event: &BridgeEvent) -> Result<Value> {
        let audio = match event {
            BridgeEvent::Audio(audio) => audio,
            _ => bail!("not an audio event"),
        };
        self.captures += 1;
        let mut value = json!({
            "sampleRate": audio.sample_rate,
            "seconds": audio.duration_secs(),
        });
        if let Some(dir) = &self.wav_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("capture-{}.wav", self.captures));
            std::fs::write(&path, audio.to_wav_bytes()?)?;
            log::info!("wrote {}", path.display());
            value["path"] = json!(path.display().to_string());
        }
        Ok(value)
    }
}

impl HostBridge for CliBridge {
    fn set_input(&mut self, name: &str, value: Value) {
        self.out.set_input(name, value);
    }

    fn emit(&mut self, event: &BridgeEvent) {
        if !matches!(event, BridgeEvent::Audio(_)) {
            self.out.emit(event);
            return;
        }
        match self.write_wav(event) {
            Ok(summary) => self.out.set_input(event.name(), summary),
            Err(e) => log::warn!("Failed to store capture: {}", e),
        }
    }
}

fn run(
    config: &Config,
    stimulus: &StimulusCommand,
    plays: u32,
    interval: Duration,
    stop_after: Duration,
    wav_dir: Option<PathBuf>,
) -> Result<()> {
    let request = build_request(config, stimulus)?;

    let backends = Backends {
        synth: Box::new(LoggingSynth::new(config.synth.clone())),
        recorder: Box::new(SilentRecorder::default()),
        ui: Box::new(LoggingUi),
        bridge: Box::new(CliBridge {
            out: JsonLinesBridge::new(io::stdout()),
            wav_dir,
            captures: 0,
        }),
    };
    let coordinator = PlaybackRecordCoordinator::new(
        backends,
        config.to_settings(),
        Box::new(SystemClock::new()),
    );
    let runtime = Runtime::start(coordinator)?;
    let handle = runtime.handle().clone();
    let mut live = BTreeSet::new();

    let mut last_duration = 0.0;

    handle.begin_trial()?;
    for press in 0..plays {
        if press > 0 {
            std::thread::sleep(interval);
        }
        handle.play(request.clone())?;
        let outcome = next_played(&handle, &mut live)?;
        match outcome.window {
            Some(window) => log::info!("press {} opened window {}", press + 1, window),
            None => log::info!("press {} replays without recording", press + 1),
        }
        last_duration = outcome.duration;
    }

    // Give the participant time to sing once the stimulus is over.
    let deadline = Instant::now()
        + Duration::try_from_secs_f64(last_duration).unwrap_or_default()
        + Duration::from_millis(config.timing.record_lag_ms)
        + stop_after;
    while !live.is_empty() {
        let now = Instant::now();
        if now >= deadline {
            log::info!("pressing stop");
            handle.stop_recording()?;
            wait_events(&handle, &mut live, Duration::from_millis(100));
            continue;
        }
        wait_events(&handle, &mut live, deadline - now);
    }

    runtime.shutdown();
    Ok(())
}

/// Wait for the outcome of the play just sent.
fn next_played(handle: &RuntimeHandle, live: &mut BTreeSet<WindowId>) -> Result<PlayOutcome> {
    loop {
        match handle.events().recv()? {
            RuntimeEvent::Played(outcome) => {
                if let Some(window) = outcome.window {
                    live.insert(window);
                }
                return Ok(outcome);
            }
            RuntimeEvent::WindowClosed(window) => {
                live.remove(&window);
            }
            RuntimeEvent::Error(e) => bail!("play failed: {}", e),
        }
    }
}

/// Track window closures for up to `timeout`.
fn wait_events(handle: &RuntimeHandle, live: &mut BTreeSet<WindowId>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match handle.events().recv_timeout(remaining) {
            Ok(RuntimeEvent::WindowClosed(window)) => {
                live.remove(&window);
                if live.is_empty() {
                    return;
                }
            }
            Ok(RuntimeEvent::Error(e)) => log::warn!("{}", e),
            Ok(RuntimeEvent::Played(_)) => {}
            Err(_) => return,
        }
    }
}
