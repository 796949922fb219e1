use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use buddies_utils::log_internal_error;

use crate::{AuthServiceImpl, AuthStorage};

/// Periodically deletes expired sessions until `cancellation_token` fires.
pub fn spawn_session_sweeper<A: AuthStorage>(
    auth_service: AuthServiceImpl<A>,
    period: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = interval.tick() => {},
            }

            match auth_service.purge_expired_sessions().await {
                Ok(0) => {},
                Ok(purged) => info!(purged, "expired sessions removed"),
                Err(e) => log_internal_error(e),
            }
        }
        debug!("session sweeper stopped");
    })
}
