//! Background token refresh.
//!
//! Universal Identity sessions rotate their token every rotation interval;
//! every other access type re-runs its authenticator every re-authentication
//! interval. A failure ends the loop: it is logged, recorded on the session
//! and reported through [`RefreshHandle::wait`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::authenticator::Authenticator;
use super::session::AuthSession;
use crate::config::{AccessType, Config};
use crate::errors::ProviderError;
use crate::gateway::GatewayApi;

/// Periods of the refresh loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIntervals {
    /// Universal Identity token rotation
    pub rotation: Duration,
    /// Re-authentication for every other access type
    pub reauthentication: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self { rotation: Duration::from_secs(120), reauthentication: Duration::from_secs(870) }
    }
}

impl RefreshIntervals {
    pub fn for_access_type(&self, access_type: AccessType) -> Duration {
        if access_type == AccessType::UniversalIdentity {
            self.rotation
        } else {
            self.reauthentication
        }
    }
}

/// Why a refresh loop stopped
#[derive(Debug)]
pub enum RefreshExit {
    /// Its cancellation token fired
    Cancelled,
    /// A refresh attempt failed
    Failed(ProviderError),
}

impl RefreshExit {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Owner's handle on a running refresh loop
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    done: oneshot::Receiver<RefreshExit>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Ask the loop to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the loop has already returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop's completion notification
    pub async fn wait(self) -> RefreshExit {
        match self.done.await {
            Ok(exit) => exit,
            Err(_) => RefreshExit::Failed(ProviderError::internal(
                "refresh loop ended without reporting its exit",
            )),
        }
    }

    /// Cancel the loop and wait until it has stopped
    pub async fn shutdown(self) -> RefreshExit {
        self.cancel();
        self.wait().await
    }
}

/// Start the refresh loop of `session`.
///
/// The loop runs until `cancel` fires or a refresh attempt fails. It never
/// runs an attempt immediately; the first one happens one period after start.
/// Cancellation also abandons an attempt still waiting on the gateway.
pub fn spawn_refresh_loop(
    session: Arc<AuthSession>,
    authenticator: Arc<dyn Authenticator>,
    config: Arc<Config>,
    gateway: Arc<dyn GatewayApi>,
    intervals: RefreshIntervals,
    cancel: CancellationToken,
) -> RefreshHandle {
    let period = intervals.for_access_type(session.access_type());
    let (done_tx, done_rx) = oneshot::channel();
    let loop_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            access_type = %session.access_type(),
            period_secs = period.as_secs(),
            "Started token refresh loop"
        );

        let exit = loop {
            tokio::select! {
                biased;
                _ = loop_cancel.cancelled() => break RefreshExit::Cancelled,
                _ = ticker.tick() => {
                    let current = session.token().await;
                    let attempt = tokio::select! {
                        biased;
                        _ = loop_cancel.cancelled() => break RefreshExit::Cancelled,
                        result = authenticator.refresh(&config, gateway.as_ref(), &current) => result,
                    };
                    match attempt {
                        Ok(token) => {
                            session.replace_token(token).await;
                            info!(access_type = %session.access_type(), "Refreshed session token");
                        }
                        Err(e) => {
                            error!(
                                access_type = %session.access_type(),
                                gateway_url = %session.gateway_url(),
                                error = %e,
                                "Token refresh failed, stopping refresh loop"
                            );
                            session.record_failure(e.to_string()).await;
                            break RefreshExit::Failed(e);
                        }
                    }
                }
            }
        };

        info!(access_type = %session.access_type(), "Token refresh loop stopped");
        // The owner may have stopped listening
        let _ = done_tx.send(exit);
    });

    RefreshHandle { cancel, done: done_rx, task }
}
