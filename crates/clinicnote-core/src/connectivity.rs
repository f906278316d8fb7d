//! Connectivity monitor
//!
//! Two-state machine over the platform's reachability signal. The
//! initial state is probed by the embedding platform and handed to the
//! constructor; afterwards the platform reports state changes through
//! `report`, which is edge-triggered: re-reporting the retained state
//! fires no event.

use tokio::sync::watch;

/// Network reachability as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Observes network reachability and emits online/offline transitions.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the state probed at startup.
    #[must_use]
    pub fn new(initial: ConnectivityState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Report the current platform state. Returns `true` when this was
    /// a transition (and subscribers were woken).
    pub fn report(&self, state: ConnectivityState) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.sender.borrow()
    }

    /// Whether the client is currently online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Subscribe to transitions. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        assert!(!monitor.is_online());
    }

    #[test]
    fn test_report_is_edge_triggered() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);

        assert!(monitor.report(ConnectivityState::Online));
        // Retained-state re-report fires no event.
        assert!(!monitor.report(ConnectivityState::Online));
        assert!(monitor.report(ConnectivityState::Offline));
    }

    #[tokio::test]
    async fn test_subscriber_sees_transition() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let mut rx = monitor.subscribe();
        rx.mark_unchanged();

        monitor.report(ConnectivityState::Online);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectivityState::Online);
    }
}
