//! Application entry point: take studio.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (defaults on first run), apply CLI overrides.
//! 3. Open the microphone and, unless disabled, the monitor output.
//! 4. Build the HTTP backend and the [`Studio`].
//! 5. Spawn the [`StudioController`] and drive it from the prompt
//!    (`session`) or a fixed script (`record`).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use take_studio::{
    audio::{AudioCapture, AudioChunk, AudioPlayback, RingBuffer, StreamHandle, StreamInfo},
    backend::{ExportFormat, HttpBackend, StudioBackend},
    config::AppConfig,
    graph::ParameterValue,
    studio::{parse_line, prompt::HELP, Studio, StudioCommand, StudioController, StudioEvent},
    StudioError,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Record voice takes through a live effects chain and post-process them on
/// a recording server.
#[derive(Parser, Debug)]
#[command(name = "take-studio")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Recording server base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Do not play the processed signal back
    #[arg(long, global = true)]
    no_monitor: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session driven by typed commands
    Session,

    /// Record one take, then optionally process and export it
    Record {
        /// Take length in seconds
        #[arg(short, long, default_value_t = 5.0)]
        seconds: f32,

        /// Parameter override, e.g. `--set reverbMix=0.4` (repeatable)
        #[arg(long = "set", value_name = "PARAM=VALUE")]
        overrides: Vec<String>,

        /// Pitch-shift the take by this many semitones
        #[arg(long, allow_hyphen_values = true)]
        pitch: Option<f32>,

        /// Pitch-correct the take with this strength
        #[arg(long, conflicts_with = "pitch")]
        autotune: Option<f32>,

        /// Download the final take in this format
        #[arg(long)]
        export: Option<ExportFormat>,

        /// Also write the raw take to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Open streams.  Dropping this stops capture and monitoring.
struct Devices {
    stream: Option<StreamInfo>,
    _handles: Vec<StreamHandle>,
}

fn open_devices(
    config: &AppConfig,
    monitor: bool,
    studio: &mut Studio,
    audio_tx: mpsc::Sender<AudioChunk>,
) -> Devices {
    let capture = match AudioCapture::new(config.audio.input_device.as_deref()) {
        Ok(capture) => capture,
        Err(e) => {
            let err = StudioError::from(e);
            log::error!("{err}");
            return Devices {
                stream: None,
                _handles: Vec::new(),
            };
        }
    };

    let stream = capture.stream_info();
    let mut handles = Vec::new();
    match capture.start(audio_tx) {
        Ok(handle) => handles.push(handle),
        Err(e) => {
            log::error!("{}", StudioError::from(e));
            return Devices {
                stream: None,
                _handles: handles,
            };
        }
    }
    log::info!(
        "input open ({} Hz, {} ch)",
        stream.sample_rate,
        stream.channels
    );

    if monitor && config.monitor.enabled {
        let capacity = (config.monitor.buffer_secs.max(0.01) * stream.sample_rate as f32) as usize;
        let buffer = Arc::new(Mutex::new(RingBuffer::new(capacity.max(1))));
        match AudioPlayback::new(stream.sample_rate)
            .and_then(|playback| playback.start(Arc::clone(&buffer)))
        {
            Ok(handle) => {
                studio.set_monitor(buffer);
                handles.push(handle);
            }
            Err(e) => log::warn!("monitor unavailable: {e}"),
        }
    }

    Devices {
        stream: Some(stream),
        _handles: handles,
    }
}

// ---------------------------------------------------------------------------
// Event output
// ---------------------------------------------------------------------------

fn describe(event: &StudioEvent) -> String {
    match event {
        StudioEvent::Armed(s) => format!("armed ({} Hz)", s.sample_rate),
        StudioEvent::Disarmed => "disarmed".into(),
        StudioEvent::RecordingStarted => "recording…".into(),
        StudioEvent::TakeFinished { bytes } => format!("take finished ({bytes} bytes), saving"),
        StudioEvent::TakePersisted(take) => {
            format!("take saved: {}", take.server_path().unwrap_or("?"))
        }
        StudioEvent::ParameterChanged(v) => format!("{} = {} {}", v.id, v.value, v.id.unit()),
        StudioEvent::ReverbLoaded => "reverb ready".into(),
        StudioEvent::Exported(a) => {
            format!("exported {} → {} ({} bytes)", a.server.filename, a.path.display(), a.size)
        }
        StudioEvent::CurrentTakeChanged(take) => {
            format!("current take: {}", take.server_path().unwrap_or("?"))
        }
        StudioEvent::SavedLocally(path) => format!("written to {}", path.display()),
        StudioEvent::Failed { kind, message } => format!("error [{kind}]: {message}"),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn run_session(
    stream: Option<StreamInfo>,
    commands: mpsc::Sender<StudioCommand>,
    mut events: mpsc::UnboundedReceiver<StudioEvent>,
) -> Result<()> {
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", describe(&event));
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line, stream) {
            Ok(Some(cmd)) => {
                let quit = cmd == StudioCommand::Shutdown;
                commands.send(cmd).await?;
                if quit {
                    break;
                }
            }
            Ok(None) if line.trim().is_empty() => {}
            Ok(None) => println!("{HELP}"),
            Err(e) => println!("{e}"),
        }
    }

    drop(commands);
    printer.await?;
    Ok(())
}

/// Wait for the first event `pick` accepts.  Failures other than a missing
/// reverb abort the script.
async fn expect_event<T>(
    events: &mut mpsc::UnboundedReceiver<StudioEvent>,
    mut pick: impl FnMut(&StudioEvent) -> Option<T>,
) -> Result<T> {
    while let Some(event) = events.recv().await {
        println!("{}", describe(&event));
        if let Some(found) = pick(&event) {
            return Ok(found);
        }
        if let StudioEvent::Failed { kind, message } = &event {
            if *kind != "ResourceLoadFailure" {
                bail!("{kind}: {message}");
            }
        }
    }
    bail!("studio stopped unexpectedly")
}

#[allow(clippy::too_many_arguments)]
async fn run_record(
    stream: Option<StreamInfo>,
    commands: &mpsc::Sender<StudioCommand>,
    events: &mut mpsc::UnboundedReceiver<StudioEvent>,
    seconds: f32,
    overrides: Vec<String>,
    pitch: Option<f32>,
    autotune: Option<f32>,
    export: Option<ExportFormat>,
    save: Option<PathBuf>,
) -> Result<()> {
    let stream = stream.context("no input device is open")?;

    for spec in overrides {
        let (id, value) = spec
            .split_once('=')
            .with_context(|| format!("expected PARAM=VALUE, got `{spec}`"))?;
        let change = ParameterValue::parse(id, value)?;
        commands.send(StudioCommand::SetParameter(change)).await?;
    }

    commands.send(StudioCommand::Arm(stream)).await?;
    expect_event(events, |e| matches!(e, StudioEvent::Armed(_)).then_some(())).await?;
    commands.send(StudioCommand::Start).await?;
    expect_event(events, |e| (*e == StudioEvent::RecordingStarted).then_some(())).await?;

    tokio::time::sleep(Duration::from_secs_f32(seconds.max(0.0))).await;
    commands.send(StudioCommand::Stop).await?;
    expect_event(events, |e| matches!(e, StudioEvent::TakePersisted(_)).then_some(())).await?;

    if let Some(path) = save {
        commands.send(StudioCommand::SaveLocal(path)).await?;
        expect_event(events, |e| matches!(e, StudioEvent::SavedLocally(_)).then_some(())).await?;
    }

    let shift = match (pitch, autotune) {
        (Some(amount), _) => Some(StudioCommand::PitchShift {
            amount,
            correct: false,
        }),
        (None, Some(strength)) => Some(StudioCommand::Autotune(strength)),
        (None, None) => None,
    };
    if let Some(cmd) = shift {
        commands.send(cmd).await?;
        expect_event(events, |e| {
            matches!(e, StudioEvent::CurrentTakeChanged(_)).then_some(())
        })
        .await?;
    }

    if let Some(format) = export {
        commands.send(StudioCommand::Export(format)).await?;
        expect_event(events, |e| matches!(e, StudioEvent::Exported(_)).then_some(())).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // 2. Configuration
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    if let Some(server) = cli.server.clone() {
        config.backend.base_url = server;
    }
    log::info!("recording server: {}", config.backend.base_url);

    // 3-4. Studio and devices
    let backend: Arc<dyn StudioBackend> = Arc::new(HttpBackend::from_config(&config.backend));
    let mut studio = Studio::new(config.clone(), backend);

    let (audio_tx, audio_rx) = mpsc::channel::<AudioChunk>(64);
    let devices = open_devices(&config, !cli.no_monitor, &mut studio, audio_tx);

    // 5. Controller
    let (command_tx, command_rx) = mpsc::channel::<StudioCommand>(16);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StudioEvent>();
    let controller = tokio::spawn(StudioController::new(studio, event_tx).run(command_rx, audio_rx));

    let outcome = match cli.command {
        Command::Session => run_session(devices.stream, command_tx, event_rx).await,
        Command::Record {
            seconds,
            overrides,
            pitch,
            autotune,
            export,
            save,
        } => {
            let result = run_record(
                devices.stream,
                &command_tx,
                &mut event_rx,
                seconds,
                overrides,
                pitch,
                autotune,
                export,
                save,
            )
            .await;
            let _ = command_tx.send(StudioCommand::Shutdown).await;
            result
        }
    };

    drop(devices);
    controller.await?;
    outcome
}
