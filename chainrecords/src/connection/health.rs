use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{ConnectionManager, Provider};

/// Periodically asks for the chain head and reconnects with exponential
/// backoff when that fails. Never gives up on its own.
pub struct HealthCheck;

impl HealthCheck {
    pub fn start<P: Provider>(
        connection: Arc<ConnectionManager<P>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let settings = connection.get_settings().clone();
            let mut interval = interval(settings.health_check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and the connection was just verified
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => return,
                }
                if *shutdown.borrow() {
                    return;
                }

                match connection.current_block_height().await {
                    Ok(block_height) => debug!(block_height, "RPC health check passed"),
                    Err(error) => {
                        warn!(%error, "RPC health check failed, reconnecting");
                        connection.mark_unhealthy().await;

                        if !Self::reconnect(&connection, &mut shutdown).await {
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Returns false when interrupted by shutdown
    async fn reconnect<P: Provider>(
        connection: &ConnectionManager<P>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let settings = connection.get_settings();
        let mut backoff = settings.connect_retry_delay;
        let mut retries_so_far = 0_u32;

        loop {
            match connection.try_reconnect().await {
                Ok(()) => {
                    info!(retries_so_far, "RPC connection re-established");
                    return true;
                }
                Err(reconnect_error) => {
                    if reconnect_error.is_fatal() {
                        error!(%reconnect_error, "endpoint now reports a different chain");
                    } else {
                        warn!(%reconnect_error, ?backoff, "reconnect attempt failed");
                    }
                }
            }

            tokio::select! {
                _ = sleep(backoff) => {}
                _ = shutdown.changed() => return false,
            }
            if *shutdown.borrow() {
                return false;
            }

            retries_so_far += 1;
            backoff = next_backoff(backoff, settings.reconnect_backoff_ceiling);
        }
    }
}

fn next_backoff(current: Duration, ceiling: Duration) -> Duration {
    min(current.saturating_mul(2), ceiling)
}
