use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::WeakCallSession;

/// Background status check for an active call.
///
/// Every `interval` it asks the provider for the call's status and, once the
/// provider says the call is over, reports an external end to the session.
/// The task stops when this handle is dropped.
pub(crate) struct StatusPoller {
    _guard: DropGuard,
}

impl StatusPoller {
    pub(crate) fn start(session: WeakCallSession, call_id: String, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        tokio::spawn(run(session, call_id, interval, cancel.clone()));
        Self {
            _guard: cancel.drop_guard(),
        }
    }
}

async fn run(session: WeakCallSession, call_id: String, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(call_id = %call_id, "Status poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(session) = session.upgrade() else {
            break;
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = session.provider.call_status(&call_id) => result,
        };

        match result {
            Ok(status) if status.is_ended() => {
                if !cancel.is_cancelled() {
                    session
                        .end_externally(&call_id, status.ended_reason, status.duration)
                        .await;
                }
                break;
            }
            Ok(status) => {
                tracing::trace!(call_id = %call_id, status = %status.status, "Call still live");
            }
            Err(e) => {
                // Transient: the next tick tries again.
                tracing::warn!(call_id = %call_id, "Status check failed: {e}");
            }
        }
    }

    tracing::debug!(call_id = %call_id, "Status poller stopped");
}
