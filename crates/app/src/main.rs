use std::path::{Path, PathBuf};

use cantus_core::{
    pitch, schedule, synth::write_wav, AppConfig, CantusError, NotationLayoutEngine,
    PlaybackScheduler, RecordingSurface, ScoreDocument, SvgSurface, Synthesizer, ToneSynth,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> cantus_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Render { input, output } => run_render(&input, &output, &config),
        Commands::Play {
            input,
            output,
            tempo,
        } => run_play(&input, &output, tempo, &config),
        Commands::Inspect { input, json } => {
            if json {
                run_inspect_json(&input, &config)
            } else {
                run_inspect(&input)
            }
        }
        #[cfg(feature = "live")]
        Commands::Listen { input, tempo } => run_listen(&input, tempo, &config),
    }
}

fn run_render(input: &Path, output: &Path, config: &AppConfig) -> cantus_core::Result<()> {
    tracing::info!(?input, ?output, "rendering score");

    let document = ScoreDocument::from_path(input)?;
    let mut engine = NotationLayoutEngine::new(config.layout.clone());
    let mut surface = SvgSurface::new();
    engine.render(
        &mut surface,
        &document.voices,
        document.tonic,
        document.mode,
        &document.violations_by_voice(),
    );
    tracing::info!(state = ?engine.state(), "render finished");

    std::fs::write(output, surface.to_svg())?;
    Ok(())
}

fn run_play(
    input: &Path,
    output: &Path,
    tempo: Option<u32>,
    config: &AppConfig,
) -> cantus_core::Result<()> {
    let document = ScoreDocument::from_path(input)?;
    let tempo = tempo.unwrap_or(config.playback.default_tempo);
    tracing::info!(?input, ?output, tempo, "bouncing playback");

    let playback = config.playback.clone();
    let scheduler = PlaybackScheduler::new(move || {
        let synth = ToneSynth::new(playback.sample_rate, playback.envelope);
        synth.set_volume(playback.volume_db);
        Ok(synth)
    });
    scheduler.play(&document.voices, tempo);

    let synth = scheduler
        .synthesizer()
        .ok_or_else(|| CantusError::Audio("synthesizer was never created".to_string()))?;
    let seconds = synth.end_time()? + config.playback.tail_seconds;
    let samples = synth.bounce(seconds)?;
    write_wav(output, &samples, synth.sample_rate())
}

fn run_inspect(input: &Path) -> cantus_core::Result<()> {
    let document = ScoreDocument::from_path(input)?;
    println!(
        "key: {} ({} {})",
        pitch::key_signature(document.tonic, document.mode),
        pitch::decompose(document.tonic).name,
        document.mode
    );

    for voice in &document.voices {
        let names: Vec<String> = voice.notes.iter().map(|&midi| pitch::note_name(midi)).collect();
        println!(
            "{:<14} [{}] {}",
            voice.role.to_string(),
            pitch::determine_clef(&voice.notes),
            names.join(" ")
        );
    }

    println!("{}", document.summary());
    for violation in &document.violations {
        let notes: Vec<String> = violation.note_indices.iter().map(usize::to_string).collect();
        println!(
            "  {:?} {}: {} (notes: {})",
            violation.severity,
            violation.rule_code,
            violation.description,
            notes.join(", ")
        );
    }
    Ok(())
}

/// Machine-readable view of the engraved staves and the playback schedule.
fn run_inspect_json(input: &Path, config: &AppConfig) -> cantus_core::Result<()> {
    let document = ScoreDocument::from_path(input)?;
    let mut engine = NotationLayoutEngine::new(config.layout.clone());
    let mut surface = RecordingSurface::new();
    engine.render(
        &mut surface,
        &document.voices,
        document.tonic,
        document.mode,
        &document.violations_by_voice(),
    );

    let report = serde_json::json!({
        "key": pitch::key_signature(document.tonic, document.mode),
        "canvas": surface.canvas(),
        "staves": surface.staves(),
        "summary": document.summary(),
        "events": schedule(&document.voices, config.playback.default_tempo, 0.0),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(feature = "live")]
fn run_listen(input: &Path, tempo: Option<u32>, config: &AppConfig) -> cantus_core::Result<()> {
    use cantus_core::synth::LiveOutput;

    let document = ScoreDocument::from_path(input)?;
    let tempo = tempo.unwrap_or(config.playback.default_tempo);
    tracing::info!(?input, tempo, "starting live playback");

    let playback = config.playback.clone();
    let scheduler = PlaybackScheduler::new(move || LiveOutput::open(&playback));
    scheduler.play(&document.voices, tempo);

    if let Some(output) = scheduler.synthesizer() {
        let remaining = output.synth().end_time()? - output.now();
        std::thread::sleep(std::time::Duration::from_secs_f64(remaining.max(0.0)));
    }
    scheduler.stop();
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Engrave and play multi-voice counterpoint", long_about = None)]
struct Cli {
    /// JSON configuration file overriding layout and playback defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Engrave a score document as SVG.
    Render {
        /// Score document (JSON).
        input: PathBuf,
        /// Destination SVG file.
        output: PathBuf,
    },
    /// Render the scheduled playback of a score document to a WAV file.
    Play {
        input: PathBuf,
        output: PathBuf,
        /// Tempo in quarter notes per minute.
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(40..=200))]
        tempo: Option<u32>,
    },
    /// Print note names, clefs and violations of a score document.
    Inspect {
        input: PathBuf,
        /// Emit the engraved staves, violation summary and playback events as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Play a score document through the default output device.
    #[cfg(feature = "live")]
    Listen {
        input: PathBuf,
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(40..=200))]
        tempo: Option<u32>,
    },
}
