use super::TrackerInner;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};

/// Drive ticks and periodic flushes until completion or shutdown.
///
/// Both timers first fire one period after start. When a tick and a flush
/// are due together, the tick is handled first so the flush carries it.
pub(crate) async fn run(inner: Arc<TrackerInner>, tick_interval: Duration, flush_interval: Duration) {
    let start = Instant::now();
    let mut ticks = interval_at(start + tick_interval, tick_interval);
    let mut flushes = interval_at(start + flush_interval, flush_interval);

    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.notified() => {
                break;
            }
            _ = ticks.tick() => {
                if inner.handle_tick().is_terminal() {
                    break;
                }
            }
            _ = flushes.tick() => {
                inner.buffer.flush_periodic(&inner.session);
            }
        }
    }

    tracing::debug!(session = %inner.session_id, "Tick driver stopped");
}
