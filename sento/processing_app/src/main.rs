use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use sento_processing::{
    classifier::TextCategorizer,
    context::ProcessingContext,
    gateway::PgStatusGateway,
    inference::{InferenceLoop, InferenceSettings},
};
use serde_json::json;
use shared_logging::LogLevel;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "sento_processing", version, about = "Classifies unprocessed statuses")]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = ProcessingContext::load(&cli.config)
        .with_context(|| format!("loading configuration {}", cli.config.display()))?;
    let telemetry = context.telemetry("processing");
    let config = context.config();

    let model = TextCategorizer::from_disk(&config.nlp.model_path).with_context(|| {
        format!("loading model from {}", config.nlp.model_path.display())
    })?;
    let _ = telemetry.log(
        LogLevel::Info,
        "model.loaded",
        json!({
            "model_path": config.nlp.model_path.display().to_string(),
            "vocab_size": model.vocab_size(),
        }),
    );

    // lazy so that a store that is down at startup is retried by the loop
    let gateway = PgStatusGateway::connect_lazy(&config.postgres);
    let inference = InferenceLoop::new(
        Arc::new(gateway),
        Arc::new(model),
        InferenceSettings::from(&config.processing),
        context.telemetry("inference"),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_telemetry = telemetry.clone();
    let terminate = terminate_listener();
    tokio::spawn(async move {
        let signal = shutdown_signal(terminate).await;
        let _ = signal_telemetry.log(
            LogLevel::Info,
            "shutdown.requested",
            json!({ "signal": signal }),
        );
        let _ = shutdown_tx.send(true);
    });

    let stats = inference.run(shutdown_rx).await;
    let _ = telemetry.log(
        LogLevel::Info,
        "processing.stopped",
        serde_json::to_value(stats).unwrap_or_default(),
    );
    context.flush_logs();
    Ok(())
}

#[cfg(unix)]
type TerminateListener = Option<tokio::signal::unix::Signal>;
#[cfg(not(unix))]
type TerminateListener = ();

/// Installs the SIGTERM handler before the loop starts so an early stop is not lost.
#[cfg(unix)]
fn terminate_listener() -> TerminateListener {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(listener) => Some(listener),
        Err(err) => {
            eprintln!("SIGTERM handler unavailable, only Ctrl-C stops the loop: {err}");
            None
        }
    }
}

#[cfg(not(unix))]
const fn terminate_listener() -> TerminateListener {}

/// Waits for Ctrl-C or SIGTERM and names the one that arrived.
#[cfg(unix)]
async fn shutdown_signal(terminate: TerminateListener) -> &'static str {
    match terminate {
        Some(mut terminate) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "interrupt",
            _ = terminate.recv() => "terminate",
        },
        None => {
            let _ = tokio::signal::ctrl_c().await;
            "interrupt"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal((): TerminateListener) -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "interrupt"
}

#[cfg(all(test, unix))]
mod tests {
    use std::{process::Command, time::Duration};

    use super::*;

    #[tokio::test]
    async fn sigterm_requests_shutdown() {
        let listener = terminate_listener();
        assert!(listener.is_some());
        let pid = std::process::id().to_string();
        let status = Command::new("kill")
            .args(["-TERM", pid.as_str()])
            .status()
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), shutdown_signal(listener))
            .await
            .unwrap();
        assert_eq!(signal, "terminate");
    }
}
