//! `pitchside` CLI: list dataset games or run one analysis session.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use pitchside_lib::{
    models::PlaybackMode, PipelineServices, SessionCreateRequest, SessionManager, SessionStatus,
    SessionUpdate, Settings, SourceKind,
};

const UPDATE_POLL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "pitchside")]
#[command(about = "Tactical pattern alerts for match video and event streams")]
#[command(version)]
struct Cli {
    /// JSON settings file (PITCHSIDE_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    EventLog,
    File,
    Device,
    Network,
}

impl From<Kind> for SourceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::EventLog => SourceKind::EventLog,
            Kind::File => SourceKind::File,
            Kind::Device => SourceKind::Device,
            Kind::Network => SourceKind::Network,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List games in the configured event dataset
    Games {
        /// Maximum number of games to list
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Create and start a session, printing status events and alerts as JSON lines
    Run {
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Video file or event CSV
        #[arg(short, long)]
        path: Option<String>,

        /// Previously uploaded file id
        #[arg(long)]
        file_id: Option<String>,

        #[arg(long)]
        stream_url: Option<String>,

        #[arg(long, default_value = "0")]
        device_id: i64,

        #[arg(short, long)]
        game_id: Option<i64>,

        #[arg(long, default_value = "25")]
        fps: u32,

        #[arg(long, default_value = "300")]
        buffer_ms: i64,

        /// Replay speed for event logs
        #[arg(long)]
        speed: Option<f64>,

        /// Decode as fast as possible instead of at native rate
        #[arg(long)]
        live: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    pitchside_lib::init_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    log::info!("pitchside starting, evidence under {}", settings.evidence_path.display());

    let services = PipelineServices::from_settings(Arc::new(settings))
        .context("failed to initialise pipeline services")?;
    let manager = SessionManager::new(services);

    match cli.command {
        Commands::Games { limit } => cmd_games(&manager, limit).await,
        Commands::Run {
            kind,
            path,
            file_id,
            stream_url,
            device_id,
            game_id,
            fps,
            buffer_ms,
            speed,
            live,
        } => {
            let mut request = SessionCreateRequest::new(kind.into());
            request.path = path;
            request.file_id = file_id;
            request.stream_url = stream_url;
            request.device_id = device_id;
            request.game_id = game_id;
            request.fps = fps;
            request.buffer_ms = buffer_ms;
            request.playback_speed =
                speed.unwrap_or(manager.services().settings.default_playback_speed);
            if live {
                request.mode = PlaybackMode::Live;
            }
            cmd_run(&manager, request).await
        }
    }
}

async fn cmd_games(manager: &SessionManager, limit: Option<usize>) -> Result<()> {
    for game in manager.games(limit).await? {
        println!("{}", serde_json::to_string(&game)?);
    }
    Ok(())
}

async fn cmd_run(manager: &SessionManager, request: SessionCreateRequest) -> Result<()> {
    let session = manager.create(request).await?;
    let mut updates = manager.subscribe(&session.id, UPDATE_POLL).await?;
    manager.start(&session.id).await?;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                println!("{}", serde_json::to_string(&update)?);
                if let SessionUpdate::Status(event) = &update {
                    if matches!(event.status, SessionStatus::Stopped | SessionStatus::Lost) {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, stopping session {}", session.id);
                manager.stop(&session.id, Some("Interrupted")).await?;
                break;
            }
        }
    }

    let alerts = manager.alerts(&session.id).await?;
    let status = manager.get(&session.id).await?.status;
    log::info!(
        "session {} finished as {} with {} alert(s)",
        session.id,
        status.as_str(),
        alerts.len()
    );
    Ok(())
}
