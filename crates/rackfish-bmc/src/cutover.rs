//! Management address cutover monitoring
//!
//! After the BMC is told to change its own IP, two watchers run side by side:
//! one keeps probing the old address until it stops answering, the other
//! pings the new address until it answers. The old watcher never pings
//! again after its first failure. As soon as the new address answers, the
//! old watcher is dropped (cancelling any ping in flight) and the client is
//! repointed at the new address.

use std::time::Duration;

use tracing::{info, warn};

use crate::client::Client;
use crate::error::{RedfishError, Result};
use crate::transport::TransportSession;
use crate::types::PollPolicy;

/// Ping until the address stops answering; returns the number of pings
async fn watch_until_down(transport: &TransportSession, interval: Duration, timeout: Duration) -> u32 {
    let mut pings = 0;
    loop {
        pings += 1;
        if !transport.ping(timeout).await {
            return pings;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Ping until the address answers or the budget is spent
async fn watch_until_up(transport: &TransportSession, policy: PollPolicy, timeout: Duration) -> Option<u32> {
    let max_polls = policy.max_polls.max(1);
    for poll in 1..=max_polls {
        if transport.ping(timeout).await {
            return Some(poll);
        }
        if poll < max_polls {
            tokio::time::sleep(policy.interval).await;
        }
    }
    None
}

impl Client {
    /// Follow the BMC to `new_base_url` using the configured cutover policy
    pub async fn monitor_address_cutover(&mut self, new_base_url: &str) -> Result<()> {
        let policy = self.config().cutover_poll;
        self.monitor_address_cutover_with(new_base_url, policy).await
    }

    /// Follow the BMC to `new_base_url`.
    ///
    /// Completes once the new address answers; the recorded base URL is then
    /// switched and a fresh session negotiated there. Fails with
    /// [`RedfishError::OperationTimeout`] if the new address never answers
    /// within `policy`.
    pub async fn monitor_address_cutover_with(&mut self, new_base_url: &str, policy: PollPolicy) -> Result<()> {
        let old = self.transport().clone();
        let new = self.transport().with_base_url(new_base_url)?;
        let ping_timeout = policy.interval.max(Duration::from_millis(100)).min(old.default_timeout());

        info!(old = %old.base_url(), new = %new.base_url(), "monitoring management address cutover");

        let old_watch = watch_until_down(&old, policy.interval, ping_timeout);
        let new_watch = watch_until_up(&new, policy, ping_timeout);
        tokio::pin!(old_watch, new_watch);

        let new_up = tokio::select! {
            pings = &mut old_watch => {
                info!(address = %old.base_url(), pings, "old address stopped responding");
                new_watch.await
            }
            up = &mut new_watch => {
                if up.is_some() {
                    warn!(address = %old.base_url(), "new address answered while old address still responds");
                }
                up
            }
        };

        let Some(polls) = new_up else {
            return Err(RedfishError::OperationTimeout {
                id: format!("cutover to {}", new.base_url()),
                polls: policy.max_polls.max(1),
            });
        };

        info!(address = %new.base_url(), polls, "new address confirmed");
        let new_url = new.base_url().clone();
        let (transport, sessions) = self.transport_and_sessions();
        transport.set_base_url(new_url);
        sessions.forget();
        if !sessions.create(transport).await {
            warn!(mode = ?sessions.mode(), "no session on new address, continuing without one");
        }
        Ok(())
    }
}
