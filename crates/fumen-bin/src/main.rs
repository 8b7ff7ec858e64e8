// fumen-player: plays a song in sync with claps and beat ticks from a chart.

mod chart;
mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use fumen_audio::time::pitch_from_f64;
use fumen_audio::{
    BeatTicks, ChordClaps, MusicStream, NewStream, NoteClaps, SoundBuffer, Status,
    SyncedAudioEngine,
};
use fumen_notes::{Note, NoteStore};
use fumen_timing::{RationalTime, TempoEvent, TimingMap};
use log::{info, warn};

use chart::{Chart, parse_long, parse_tap, parse_tempo};
use config::PlayerConfig;

#[derive(Parser, Debug)]
#[command(name = "fumen-player", about = "Play a song with claps and beat ticks in sync")]
struct Args {
    /// Song to play. Without it only the effects play.
    music: Option<PathBuf>,

    /// Tempo event as beat:bpm; repeat for tempo changes. Defaults to
    /// 120 BPM.
    #[arg(long = "tempo", value_parser = parse_tempo)]
    tempo: Vec<TempoEvent>,

    /// Song time of beat 0, in seconds.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    offset: RationalTime,

    /// Tap note as beat:button, buttons 0 to 15 row by row.
    #[arg(long = "note", value_parser = parse_tap)]
    notes: Vec<Note>,

    /// Long note as beat:button:duration:tail.
    #[arg(long = "long", value_parser = parse_long)]
    long_notes: Vec<Note>,

    /// Playback speed factor.
    #[arg(long)]
    pitch: Option<f64>,

    /// Position to start from, in seconds (e.g. 12 or 25/2).
    #[arg(long, default_value = "0")]
    start: RationalTime,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Play a tick on every beat.
    #[arg(long)]
    ticks: bool,

    /// Restart the song when it ends.
    #[arg(long = "loop")]
    looping: bool,

    /// Print the chart's note density and collisions instead of playing.
    #[arg(long)]
    summary: bool,

    /// Sections in the density summary.
    #[arg(long, default_value_t = 32)]
    sections: usize,

    /// Directory with the effect samples.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Player config JSON file.
    #[arg(long, default_value = "fumen-player.json", env = "FUMEN_PLAYER_CONFIG")]
    config: PathBuf,

    /// Write the effective config back to the config file.
    #[arg(long)]
    save_config: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = PlayerConfig::load_from(&args.config)?;
    if let Some(pitch) = args.pitch {
        config.pitch = pitch;
    }
    if let Some(assets) = &args.assets {
        config.assets_dir = assets.clone();
    }
    config.beat_ticks |= args.ticks;
    if args.save_config {
        config
            .save_to(&args.config)
            .with_context(|| format!("Failed to save {}", args.config.display()))?;
        info!("Saved config to {}", args.config.display());
    }

    let notes: Vec<Note> = args.notes.iter().chain(&args.long_notes).cloned().collect();
    let chart = Chart::build(&args.tempo, &args.offset, &notes)?;

    if args.summary {
        print_summary(&chart, &config, &args);
        return Ok(());
    }
    play(&args, &config, chart)
}

fn load_sample(dir: &Path, name: &str) -> Result<SoundBuffer> {
    let path = dir.join(name);
    SoundBuffer::from_file(&path).with_context(|| format!("Failed to load {}", path.display()))
}

fn effect_streams(
    config: &PlayerConfig,
    timing: &Arc<TimingMap>,
    notes: &Arc<NoteStore>,
) -> Result<Vec<(String, NewStream)>> {
    let length = config.audio.effect_buffer_length();
    let mut streams = Vec::new();
    if config.note_claps {
        let claps = NoteClaps::new(
            load_sample(&config.assets_dir, "clap.wav")?,
            Arc::clone(timing),
            Arc::clone(notes),
            &length,
        )
        .play_chords(!config.chord_claps)
        .play_long_note_ends(config.long_note_ends);
        streams.push(("note_claps".to_string(), NewStream::bypassing_pitch(claps)));
    }
    if config.chord_claps {
        let claps = ChordClaps::new(
            load_sample(&config.assets_dir, "chord_clap.wav")?,
            Arc::clone(timing),
            Arc::clone(notes),
            &length,
        );
        streams.push(("chord_claps".to_string(), NewStream::bypassing_pitch(claps)));
    }
    if config.beat_ticks {
        let ticks = BeatTicks::new(
            load_sample(&config.assets_dir, "beat_tick.wav")?,
            Arc::clone(timing),
            &length,
        );
        streams.push(("beat_ticks".to_string(), NewStream::bypassing_pitch(ticks)));
    }
    Ok(streams)
}

fn play(args: &Args, config: &PlayerConfig, chart: Chart) -> Result<()> {
    let timing = Arc::new(chart.timing);
    let notes = Arc::new(chart.notes);
    let pitch = pitch_from_f64(config.pitch)
        .with_context(|| format!("Pitch must be positive, got {}", config.pitch))?;

    // Missing effect samples are fatal; a broken song only loses the music.
    let mut streams = effect_streams(config, &timing, &notes)?;
    let mut song_end = None;
    if let Some(path) = &args.music {
        match MusicStream::open(path, &config.audio.music_buffer_length()) {
            Ok(music) => {
                song_end = music.duration();
                streams.push(("music".to_string(), NewStream::new(music)));
            }
            Err(e) => warn!("Could not load {}: {e}; playing effects only", path.display()),
        }
    }
    if streams.is_empty() {
        bail!("Nothing to play: no music and every effect is off");
    }

    let mut engine =
        SyncedAudioEngine::open(config.audio.clone()).context("Failed to open audio output")?;
    engine.set_looping(args.looping);
    engine.update_streams(streams, &[], Some(pitch))?;
    engine.set_playing_offset(&args.start)?;
    engine.play()?;
    info!(
        "Playing {} at x{} from {} s",
        engine.stream_names().collect::<Vec<_>>().join(", "),
        engine.pitch(),
        args.start
    );

    let deadline = args
        .duration
        .map(|seconds| Instant::now() + Duration::from_secs_f64(seconds.max(0.0)));
    let mut last_report = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(50));
        if let Some(e) = engine.take_error() {
            warn!("Playback error: {e}");
        }
        if engine.status() == Status::Stopped {
            info!("Playback finished");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        // The effect streams never end on their own.
        if !args.looping
            && song_end
                .as_ref()
                .is_some_and(|end| &engine.playing_offset() >= end)
        {
            info!("Song finished");
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let seconds = engine.precise_playing_offset();
            let beat = timing.beat_at(&seconds);
            info!(
                "{:8.3} s  beat {:8.3}  {} BPM",
                seconds.to_f64(),
                beat.to_f64(),
                timing.bpm_at(&beat)
            );
        }
    }
    engine.stop()?;
    Ok(())
}

fn print_summary(chart: &Chart, config: &PlayerConfig, args: &Args) {
    let timing = &chart.timing;
    let notes = &chart.notes;
    println!("Tempo:");
    for event in timing.events() {
        println!(
            "  beat {:>8}  {:>8} BPM  at {:.3} s",
            event.beat,
            event.bpm,
            event.seconds.to_f64()
        );
    }
    let Some((first, last)) = notes.time_bounds() else {
        println!("No notes");
        return;
    };
    println!(
        "{} notes from beat {first} to beat {last} ({:.3} s to {:.3} s)",
        notes.len(),
        timing.seconds_at(&first).to_f64(),
        timing.seconds_at(&last).to_f64()
    );

    let zone = RationalTime::new(config.collision_zone_ms, 1000);
    let colliding = notes
        .iter()
        .filter(|note| notes.is_colliding_on_button(note, timing, &zone))
        .count();
    println!(
        "{colliding} notes within {} ms of another on the same button",
        config.collision_zone_ms
    );

    let song_length = args
        .music
        .as_deref()
        .and_then(|path| MusicStream::open(path, &RationalTime::one()).ok())
        .and_then(|music| music.duration())
        .unwrap_or_else(|| timing.seconds_at(&last));
    let density = notes.density(timing, args.sections, &song_length);
    let peak = density.iter().copied().max().unwrap_or(0).max(1);
    println!("Density over {:.3} s:", song_length.to_f64());
    for (section, count) in density.iter().enumerate() {
        let bar = "#".repeat(count * 40 / peak);
        println!("  {section:>3} {count:>4} {bar}");
    }
}
