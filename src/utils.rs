use tracing::debug;

pub async fn shutdown_signal() {
    let name = wait_for_stop_signal().await;
    debug!("Received signal: {}", name);
}

/// Waits for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_stop_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut terminate), Ok(mut interrupt)) => tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        },
        _ => ctrl_c().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("ctrl_c handler error: {:?}", e);
        std::future::pending::<()>().await;
    }
    "CTRL_C"
}
