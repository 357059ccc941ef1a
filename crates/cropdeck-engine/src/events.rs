//! Typed engine events.
//!
//! Components publish state changes onto a broadcast bus; hosts subscribe to
//! drive their presentation layer. Publishing is fire-and-forget: a bus with
//! no subscribers drops events silently, and a slow subscriber that lags
//! behind the channel capacity loses the oldest events, never blocks the
//! publisher.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::images::ImageId;
use crate::settings::SettingsScope;
use crate::task::TaskStatus;

const BUS_CAPACITY: usize = 256;

/// A state change worth telling subscribers about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Fresh crop stats were published for an image.
    StatsChanged { image: ImageId },
    /// A tracked task's progress or status changed.
    TaskProgress {
        task: Uuid,
        progress: u8,
        status: TaskStatus,
    },
    /// Settings changed at the given scope; dependent results were
    /// invalidated.
    SettingsChanged { scope: SettingsScope },
    /// A batch finished; hosts should surface the results view.
    RevealResults,
}

/// Broadcast bus for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send with no live subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
