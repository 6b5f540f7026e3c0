//! chanpoll-tail: follow a long-polling channel and log what arrives.
//!
//! - Engine settings from a strict YAML config
//! - Optional subscribe body (base64) sent on the channel-establishing poll
//! - Ctrl-C sends the terminate notice and exits

use std::process::ExitCode;
use std::sync::Arc;

use base64::Engine as _;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use chanpoll_client::config;
use chanpoll_client::engine::{PollEngine, SubscribeBody};
use chanpoll_client::retry::ExponentialBackoff;
use chanpoll_client::transport::http::HttpTransport;
use chanpoll_client::EngineEvent;

#[derive(Debug, Parser)]
#[command(name = "chanpoll-tail", version, about = "Tail a long-polling channel")]
struct Cli {
    /// Path to the YAML config.
    #[arg(short, long, default_value = "chanpoll.yaml")]
    config: String,

    /// Base64 body sent with the first poll.
    #[arg(short, long)]
    subscribe: Option<String>,

    /// Print metrics in Prometheus text format on exit.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match tail(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "chanpoll-tail failed");
            ExitCode::FAILURE
        }
    }
}

async fn tail(cli: Cli) -> chanpoll_core::Result<()> {
    let cfg = config::load_from_file(&cli.config)?;
    let transport = HttpTransport::new(&cfg.engine.base_url, cfg.engine.format)?;

    let mut builder = PollEngine::builder(Arc::new(transport), cfg.engine.clone())
        .retry_policy(Arc::new(ExponentialBackoff::from_config(&cfg.retry)));
    if let Some(encoded) = &cli.subscribe {
        let body = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| chanpoll_core::ChanpollError::BadRequest(format!("--subscribe: {e}")))?;
        builder = builder.hook(SubscribeBody(body.into()));
    }
    let engine = builder.build()?;

    let mut events = engine.subscribe_all();
    engine.run();
    tracing::info!(base_url = %cfg.engine.base_url, route = %cfg.engine.route, "tailing channel");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("signal received, stopping engine");
                engine.stop().await;
            }
            event = events.recv() => match event {
                Some(EngineEvent::Terminated { errors, by_caller }) => {
                    tracing::info!(by_caller, errors = errors.len(), "channel terminated");
                    break;
                }
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }

    if cli.metrics {
        print!("{}", engine.metrics().render());
    }
    Ok(())
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::MessageReceived { trace_id, body } => {
            tracing::info!(%trace_id, bytes = body.len(), "message");
            println!("{}", String::from_utf8_lossy(body));
        }
        EngineEvent::ServerErrors { trace_id, errors } => {
            for err in errors {
                tracing::warn!(%trace_id, code = err.code(), message = err.message(), "server error");
            }
        }
        EngineEvent::Fault(fault) => tracing::warn!(code = fault.code(), error = %fault, "fault"),
        EngineEvent::ReconnectStarted { attempt } => tracing::info!(attempt, "reconnecting"),
        EngineEvent::ReconnectSucceeded { attempt } => tracing::info!(attempt, "reconnected"),
        EngineEvent::ReconnectFailed { attempt, fault } => {
            tracing::debug!(attempt, code = fault.code(), "reconnect attempt failed")
        }
        EngineEvent::InvalidMessage { trace_id, reason } => {
            tracing::warn!(%trace_id, %reason, "invalid message")
        }
        EngineEvent::Terminated { .. } => {}
    }
}
