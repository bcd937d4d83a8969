//! Heartbeat loop.

use std::time::Duration;

use tether_core::Envelope;
use tether_runtime::OutboundSink;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Push a liveness envelope every `interval` until cancelled.
///
/// The first heartbeat goes out one full interval after start. Heartbeats
/// only touch the outbound queue and never the socket.
#[instrument(skip_all, fields(interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)))]
pub async fn run_heartbeat(sink: OutboundSink, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("queueing heartbeat");
                sink.push(Envelope::heartbeat());
            }
            () = cancel.cancelled() => {
                debug!("heartbeat loop cancelled");
                return;
            }
        }
    }
}
