//! Process shutdown signals

use std::future::Future;
use std::io;

/// Resolve once `signal` fires. A handler that could not be installed never fires.
async fn on_signal<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if signal.await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = on_signal(tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = on_signal(async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        signal.recv().await;
        Ok::<(), io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
