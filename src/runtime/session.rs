use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ports::{ExchangeRest, RestError};

/// The exchange invalidates listen tokens after 60 minutes; renew early.
pub const RENEWAL_PERIOD: Duration = Duration::from_secs(55 * 60);

/// Listen-session token required for the user-data stream.
///
/// Acquired once at launch. The token cell is swapped only by
/// [`ListenSession::refresh`] (on expiry) while the renewal task extends
/// the current token on a real sleeping timer with cancellation, not a
/// poll loop.
pub struct ListenSession {
    rest: Arc<dyn ExchangeRest>,
    token: ArcSwap<String>,
}

impl ListenSession {
    /// Issue a fresh token from the REST collaborator
    pub async fn acquire(rest: Arc<dyn ExchangeRest>) -> Result<Arc<Self>, RestError> {
        let token = rest.start_listen_session().await?;
        tracing::info!("listen session acquired");
        Ok(Arc::new(ListenSession {
            rest,
            token: ArcSwap::from_pointee(token),
        }))
    }

    /// Current token
    pub fn token(&self) -> Arc<String> {
        self.token.load_full()
    }

    /// Replace the token after expiry
    pub async fn refresh(&self) -> Result<Arc<String>, RestError> {
        let token = Arc::new(self.rest.start_listen_session().await?);
        self.token.store(token.clone());
        tracing::info!("listen session refreshed");
        Ok(token)
    }

    /// Keep the session alive on a fixed period until shutdown fires
    pub fn spawn_renewal(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the session was just issued
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let token = self.token.load_full();
                        match self.rest.keepalive_listen_session(&token).await {
                            Ok(()) => tracing::debug!("listen session renewed"),
                            Err(err) => tracing::warn!("listen session keepalive failed: {}", err),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}
