use std::time::Duration;

use tokio_util::sync::CancellationToken;

use replay_engine::ReplayScheduler;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

/// Сколько ждать завершения активных сессий после Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("replay-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    let pacing = config.pacing_options()?;
    let source = config.build_source()?;
    let scheduler = ReplayScheduler::new(source, pacing);
    tracing::info!(
        wait = ?pacing.wait,
        poll_quantum = ?pacing.poll_quantum,
        send_timeout = ?pacing.send_timeout,
        default_session = %config.default_session_id,
        "replay scheduler ready"
    );

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- API server (HTTP + WS) ---
    let api_options = config.api_options();
    let api_token = token.clone();
    let mut api_handle = tokio::spawn(async move {
        replay_api_server::run(api_options, scheduler, api_token).await
    });

    tracing::info!(port = config.api_port, "server ready");

    // --- Ожидание Ctrl+C или падения API ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        result = &mut api_handle => {
            token.cancel();
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Api(e)),
                Err(e) => Err(ServerError::Api(format!("api task: {e}"))),
            };
        }
    }

    // Активные replay-сессии получают отмену и закрываются с 1001
    token.cancel();

    match tokio::time::timeout(DRAIN_TIMEOUT, &mut api_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "api server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "api task failed"),
        Err(_) => {
            tracing::warn!("api server did not stop in time, aborting");
            api_handle.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
