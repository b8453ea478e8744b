//! Network reachability signal consumed by the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Source of the host platform's connectivity state.
pub trait NetworkStatus {
    /// `Some(reachable)` when the platform reports connectivity, `None` when
    /// no signal is available.
    fn is_online(&self) -> Option<bool>;

    /// Reachability with the unavailable case treated as online.
    fn reachable(&self) -> bool {
        self.is_online().unwrap_or(true)
    }
}

/// Platform without a connectivity signal; always dispatches online.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignal;

impl NetworkStatus for NoSignal {
    fn is_online(&self) -> Option<bool> {
        None
    }
}

/// Connectivity flag flipped by the host application's platform hooks.
///
/// Clones share state, so the host can keep one and hand another to the client.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Record a connectivity transition.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(
                "Network is now {}",
                if online { "online" } else { "offline" }
            );
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus for ConnectivityFlag {
    fn is_online(&self) -> Option<bool> {
        Some(self.online.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_signal_counts_as_online() {
        assert_eq!(NoSignal.is_online(), None);
        assert!(NoSignal.reachable());
    }

    #[test]
    fn flag_clones_share_state() {
        let host = ConnectivityFlag::new(true);
        let client = host.clone();

        host.set_online(false);
        assert_eq!(client.is_online(), Some(false));
        assert!(!client.reachable());

        host.set_online(true);
        assert!(client.reachable());
    }
}
