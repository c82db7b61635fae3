//! Process-wide automated posting kill switch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Global switch deciding whether automated posting is permitted at all.
///
/// Cloning shares the underlying flag, so the server and the orchestrator
/// observe the same value. The orchestrator only reads it.
#[derive(Debug, Clone)]
pub struct PostingGate {
    enabled: Arc<AtomicBool>,
}

impl PostingGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_auto_posting_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_auto_posting(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Automated posting gate changed");
        }
    }
}

impl Default for PostingGate {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let gate = PostingGate::new(false);
        let observer = gate.clone();
        assert!(!observer.is_auto_posting_enabled());

        gate.set_auto_posting(true);
        assert!(observer.is_auto_posting_enabled());
    }

    #[test]
    fn test_default_is_closed() {
        assert!(!PostingGate::default().is_auto_posting_enabled());
    }
}
