use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-resource broadcast of persisted booking events.
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a resource's events, creating the channel on first use.
    pub fn subscribe(&self, resource_id: ResourceId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, resource_id: ResourceId, event: &Event) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn subscriber_count(&self, resource_id: &ResourceId) -> usize {
        self.channels
            .get(resource_id)
            .map_or(0, |s| s.receiver_count())
    }
}
