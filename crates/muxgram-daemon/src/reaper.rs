//! Timer loop driving the stale-session sweep and approval expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::router::Router;

/// How often the sweep runs.
pub const REAPER_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Run the reaper until shutdown. A store error here is as fatal as it is
/// anywhere else: the loop cancels the shared token so the daemon exits.
pub async fn run(router: Arc<Router>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of `interval` fires immediately; skip it so startup
    // does not race event processing with a sweep.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = router.reap_once(Utc::now()).await {
                    error!(error = %e, "store failure in reaper; shutting down");
                    shutdown.cancel();
                    break;
                }
            }
        }
    }
}
