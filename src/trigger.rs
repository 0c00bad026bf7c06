//! Change sources that feed a [`CoalescingLimiter`].

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::coalesce::CoalescingLimiter;

/// Register one change for every non-blank line read from `reader`.
///
/// Returns the number of changes registered once the reader reaches EOF.
pub async fn watch_lines<R>(reader: R, limiter: CoalescingLimiter) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut registered = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!(line = %line, "Change notification received");
        limiter.register_change();
        registered += 1;
    }

    info!(registered = registered, "Line change source closed");
    Ok(registered)
}

/// Register one change for every SIGHUP delivered to the process.
///
/// Runs until the signal stream ends, which in practice means forever.
#[cfg(unix)]
pub async fn watch_hangup(limiter: CoalescingLimiter) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, registering change");
        limiter.register_change();
    }

    Ok(())
}
