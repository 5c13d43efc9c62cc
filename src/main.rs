use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use novavoice::config::DeliveryKind;
use novavoice::{
    create_router, AppState, ClockedOutput, Collaborators, Config, Delivery, FileDelivery,
    NatsDelivery, NatsTransport, NoDelivery, SessionHandle, SessionStatus, VoiceEngine,
    WavFileBackend,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "novavoice", version, about = "Real-time voice session engine")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/novavoice")]
    config: String,

    /// WAV file used as the capture device, overriding `audio.capture_file`
    #[arg(long, global = true)]
    capture: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,
    /// Hold one conversation and print the transcript as it grows
    Call,
}

fn build_engine(
    cfg: &Config,
    capture: Option<PathBuf>,
) -> Result<(SessionHandle, tokio::task::JoinHandle<()>)> {
    let capture_path = capture
        .or_else(|| cfg.audio.capture_file.clone())
        .context("No capture source: set audio.capture_file or pass --capture")?;

    let delivery: Arc<dyn Delivery> = match cfg.delivery.kind {
        DeliveryKind::None => Arc::new(NoDelivery),
        DeliveryKind::File => Arc::new(FileDelivery::new(cfg.delivery.dir.clone())),
        DeliveryKind::Nats => Arc::new(NatsDelivery::new(
            cfg.transport.nats_url.clone(),
            cfg.delivery.subject.clone(),
        )),
    };

    let collaborators = Collaborators {
        capture: Box::new(WavFileBackend::new(capture_path, cfg.capture_config())),
        output: Box::new(ClockedOutput::new()),
        transport: Box::new(NatsTransport::new(
            cfg.transport.nats_url.clone(),
            cfg.transport.subject_prefix.clone(),
        )),
        delivery,
    };

    Ok(VoiceEngine::spawn(cfg.session_config(), collaborators))
}

async fn serve(cfg: Config, capture: Option<PathBuf>) -> Result<()> {
    let (handle, engine) = build_engine(&cfg, capture)?;

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    let shutdown_handle = handle.clone();
    axum::serve(listener, create_router(AppState::new(handle)))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            if let Err(e) = shutdown_handle.stop_session().await {
                warn!("Failed to stop session on shutdown: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    // Every handle is gone with the router; the engine finishes pending deliveries and exits
    engine.await.context("Voice engine task failed")?;
    Ok(())
}

async fn call(cfg: Config, capture: Option<PathBuf>) -> Result<()> {
    let (handle, engine) = build_engine(&cfg, capture)?;

    let session_id = handle.start_session().await?;
    info!("Session {} connecting", session_id);

    let mut updates = handle.subscribe();
    let mut printed = 0;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                for utterance in snapshot.transcript.iter().skip(printed) {
                    println!("{:?}: {}", utterance.role, utterance.text);
                }
                printed = snapshot.transcript.len();

                if snapshot.status == SessionStatus::Disconnected {
                    if let Some(err) = snapshot.last_error {
                        warn!("Session ended with error: {}", err);
                    }
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, ending session");
                handle.stop_session().await?;
            }
        }
    }

    drop(handle);
    engine.await.context("Voice engine task failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("NovaVoice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg, cli.capture).await,
        Command::Call => call(cfg, cli.capture).await,
    }
}
