#![forbid(unsafe_code)]

//! Daemon log follower.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::admin::{AdminConnection, LogEntry, LogFilter};
use crate::MeshResult;

/// Subscribe to the daemon log and hand every entry to `sink` until the
/// stream ends or `cancel` trips. The subscription is released on
/// cancellation. Returns the number of entries delivered.
pub async fn follow<C, F>(conn: &mut C, filter: &LogFilter, cancel: &CancellationToken, mut sink: F) -> MeshResult<u64>
where
    C: AdminConnection + ?Sized,
    F: FnMut(u64, &LogEntry),
{
    let stream_id = conn.subscribe_log(filter).await?;
    info!(%stream_id, level = %filter.level, "subscribed to daemon log");

    let mut counter: u64 = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%stream_id, "unsubscribing");
                conn.unsubscribe_log(&stream_id).await?;
                break;
            }
            entry = conn.next_log_entry() => entry?,
        };
        match next {
            Some(entry) => {
                counter += 1;
                sink(counter, &entry);
            }
            None => break,
        }
    }
    Ok(counter)
}
