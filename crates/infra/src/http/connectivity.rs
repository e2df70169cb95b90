//! Online/offline signal
//!
//! The host application reports connectivity changes here; the resilient
//! client reads the current value before dispatching and listens for the
//! offline → online edge to replay buffered requests.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Shared connectivity flag
///
/// Clones observe and drive the same flag. Subscribers are only woken by
/// actual transitions; setting the current value again is a no-op.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state: Arc::new(state) }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record the current connectivity
    ///
    /// Returns `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn go_online(&self) -> bool {
        self.set_online(true)
    }

    pub fn go_offline(&self) -> bool {
        self.set_online(false)
    }

    /// Receive transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Resolve once the flag reads online
    pub async fn wait_until_online(&self) {
        let mut receiver = self.subscribe();
        // Sender lives in `self`, so the channel cannot close while we wait
        let _ = receiver.wait_for(|online| *online).await;
    }
}
