//! Cosmetic lifecycle notifications.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Ready,
    Processing,
    Idle,
}

/// Receives lifecycle updates. Implementations must return immediately.
pub trait PresenceUpdater: Send + Sync {
    fn update(&self, presence: Presence);
}

/// Writes presence changes to the log.
pub struct TracingPresence;

impl PresenceUpdater for TracingPresence {
    fn update(&self, presence: Presence) {
        match presence {
            Presence::Ready => info!("🟢 Ready"),
            Presence::Processing => debug!("Processing"),
            Presence::Idle => debug!("Idle"),
        }
    }
}
