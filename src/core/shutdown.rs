//! Termination signal wait used by [`LinkManager::run`](crate::LinkManager::run).
//!
//! Unix: SIGINT, SIGTERM, SIGQUIT (plus Ctrl-C). Elsewhere: Ctrl-C only.

/// Completes on the first termination signal.
///
/// Fails only if a signal handler cannot be installed.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut int = signal(SignalKind::interrupt())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = int.recv() => {}
        _ = term.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

/// Completes on Ctrl-C.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
