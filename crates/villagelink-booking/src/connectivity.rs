//! # Connectivity Monitor
//!
//! Holds the last network state reported by the platform and fans changes
//! out to the queue drainer. Repeated reports of the same state are
//! swallowed, so a flapping "online, online" event pair wakes subscribers
//! once.

use tokio::sync::watch;
use tracing::info;

use villagelink_core::Connectivity;

/// Shared network state.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        ConnectivityMonitor { tx }
    }

    /// Records a platform report. Returns `true` if the state changed.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        });
        if changed {
            info!(?connectivity, "Connectivity changed");
        }
        changed
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_reports_are_coalesced() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        let mut rx = monitor.subscribe();

        assert!(monitor.set(Connectivity::Online));
        assert!(!monitor.set(Connectivity::Online));

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Connectivity::Online);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(monitor.current(), Connectivity::Online);
    }
}
