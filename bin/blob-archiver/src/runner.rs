//! Runs commands on a tokio runtime until they finish or the process is told to stop.

use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Builds a multi-threaded runtime, hands `command` a token that fires on `SIGINT` or `SIGTERM`,
/// and drives the command to completion.
///
/// Commands are expected to wind down on their own once the token fired, so their cleanup (the
/// last heartbeat, an in-flight write) is not cut short.
pub(crate) fn run_until_shutdown<F>(
    command: impl FnOnce(CancellationToken) -> F,
) -> eyre::Result<()>
where
    F: Future<Output = eyre::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let cancel = CancellationToken::new();

    let res = runtime.block_on(async {
        let signals = tokio::spawn(cancel_on_signal(cancel.clone()));
        let res = command(cancel.clone()).await;
        signals.abort();
        res
    });

    if res.is_err() {
        debug!(target: "archiver::cli", "Shutting down due to error");
    } else {
        debug!(target: "archiver::cli", "Shutting down gracefully");
    }
    runtime.shutdown_timeout(Duration::from_secs(5));
    res
}

/// Cancels `cancel` on `ctrl-c`, or on `SIGTERM` on unix.
async fn cancel_on_signal(cancel: CancellationToken) -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => trace!(target: "archiver::cli", "Received ctrl-c"),
            _ = stream.recv() => trace!(target: "archiver::cli", "Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        trace!(target: "archiver::cli", "Received ctrl-c");
    }

    cancel.cancel();
    Ok(())
}
