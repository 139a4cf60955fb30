//! Lifecycle event broadcasting.
//!
//! One producer side (the download/install task) and any number of
//! subscribers. Subscribers only see events emitted after they subscribed;
//! there is no replay, so observers should probe status once right after
//! subscribing. A subscriber that falls more than the channel capacity behind
//! loses the oldest events; [`Subscription::missed`] reports how many, and
//! such an observer must re-probe status instead of trusting its event log.

use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Buffered events per subscriber before the slowest one starts lagging.
///
/// Progress is coalesced upstream, so a full download emits at most ~100
/// progress events plus one terminal event.
const CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the engine lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Download progress, 0-100, never decreasing within one download.
    DownloadProgress(u8),
    /// The engine was installed successfully.
    Installed,
    /// Download or install failed. Carries the cause.
    InstallFailed(String),
}

impl EngineEvent {
    /// Wire name used by UI observers.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::DownloadProgress(_) => "download-progress",
            EngineEvent::Installed => "engine-installed",
            EngineEvent::InstallFailed(_) => "engine-install-failed",
        }
    }

    /// Whether this event ends a download.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineEvent::DownloadProgress(_))
    }
}

/// Broadcast channel for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Start receiving events emitted from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            missed: 0,
        }
    }

    /// Deliver an event to all current subscribers.
    pub fn emit(&self, event: EngineEvent) {
        trace!(event = event.name(), ?event, "Emitting engine event");
        // No subscribers is fine: events are fire-and-forget.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription. Dropping it (or calling [`Subscription::unsubscribe`])
/// stops delivery.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<EngineEvent>,
    missed: u64,
}

impl Subscription {
    /// Wait for the next event.
    ///
    /// Returns `None` once every [`EventBus`] handle has been dropped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => self.lagged(n),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.lagged(n),
                Err(_) => return None,
            }
        }
    }

    /// Events dropped because this subscriber fell behind.
    ///
    /// Non-zero means progress or terminal events may be missing; re-probe.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}

    fn lagged(&mut self, n: u64) {
        self.missed += n;
        warn!(missed = n, "Event subscriber fell behind; events were dropped");
    }
}
