//! Tile-ready notifications.
//!
//! The loader runs on its own thread, while observers usually belong to a UI
//! or some other event loop. Observers therefore never get called "on their
//! own thread": [`TileObserver::tile_updated`] must be a cheap, thread-safe
//! hand-off. [`ChannelObserver`] is the stock implementation, forwarding events
//! into a tokio channel that the consumer drains on its own schedule.
//!
//! Delivery is best effort. An observer whose consumer has gone away reports
//! itself closed and is dropped from the registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::cache::ObjectKey;

/// Posted after fetched data has been written into a tile entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileUpdatedEvent {
    pub key: ObjectKey,
}

/// Receiver of tile-ready notifications.
pub trait TileObserver: Send + Sync {
    /// Hand `event` off to the observer's consumer. Called on the loader thread.
    fn tile_updated(&self, event: TileUpdatedEvent);

    /// Whether the consumer is gone and the observer can be dropped.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Observer that forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<TileUpdatedEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver its events arrive on.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TileUpdatedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl TileObserver for ChannelObserver {
    fn tile_updated(&self, event: TileUpdatedEvent) {
        // A closed receiver just means nobody is listening anymore
        let _ = self.sender.send(event);
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registered observers, deduplicated by identity.
#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: Vec<Arc<dyn TileObserver>>,
}

impl ObserverSet {
    /// Register `observer` unless the same instance is already registered.
    ///
    /// Returns `true` if it was added.
    pub(crate) fn register(&mut self, observer: &Arc<dyn TileObserver>) -> bool {
        if self.observers.iter().any(|o| same_observer(o, observer)) {
            return false;
        }
        self.observers.push(Arc::clone(observer));
        true
    }

    /// Drop observers whose consumer is gone, then return the rest.
    pub(crate) fn live(&mut self) -> Vec<Arc<dyn TileObserver>> {
        self.observers.retain(|o| !o.is_closed());
        self.observers.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }
}

/// Compare observers by data pointer; vtable pointers may differ across
/// codegen units for the same object.
fn same_observer(a: &Arc<dyn TileObserver>, b: &Arc<dyn TileObserver>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
