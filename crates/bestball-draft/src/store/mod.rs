// Draft state store contract and backends.
//
// The engine needs three things from persistence: a consistent read of one
// room, an optimistic compare-and-swap write of that room (optionally
// appending one pick), and a change feed. Both backends publish the new
// snapshot to subscribers while still holding their write lock, so a
// subscriber never observes versions out of order.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::model::{DraftRoom, Pick, QueueEntry, RoomSnapshot};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The document changed since it was read; re-read and try again.
    #[error("write conflict: room document changed concurrently")]
    Conflict,

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("room {0} already exists")]
    AlreadyExists(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// One optimistic write of a room document.
#[derive(Debug, Clone)]
pub struct RoomWrite {
    /// The new header document.
    pub room: DraftRoom,
    /// Version the caller read; the write fails with `Conflict` otherwise.
    pub expected_version: u64,
    /// Pick appended in the same transaction. Its index must equal the
    /// number of picks already stored and its player must be unused.
    pub pick: Option<Pick>,
}

/// Live view of one room. `borrow()` always holds the latest snapshot.
pub type RoomSubscription = watch::Receiver<RoomSnapshot>;

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn create_room(&self, room: DraftRoom) -> Result<RoomSnapshot, StoreError>;

    async fn load_room(&self, room_id: &str) -> Result<RoomSnapshot, StoreError>;

    /// Apply `write` atomically if the stored version still equals
    /// `write.expected_version`. Returns the new snapshot.
    async fn commit_room(&self, write: RoomWrite) -> Result<RoomSnapshot, StoreError>;

    async fn list_rooms(&self) -> Result<Vec<String>, StoreError>;

    /// A participant's queue; empty when none has been saved.
    async fn load_queue(&self, room_id: &str, participant_id: &str)
        -> Result<QueueEntry, StoreError>;

    async fn save_queue(&self, room_id: &str, entry: &QueueEntry) -> Result<(), StoreError>;

    async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError>;
}

/// Per-room change feeds shared by the backends.
#[derive(Default)]
pub(crate) struct RoomNotifier {
    channels: Mutex<HashMap<String, watch::Sender<RoomSnapshot>>>,
}

impl RoomNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Subscribe, seeding a new channel with `current` if none exists yet.
    /// Callers hold their store lock so `current` cannot be stale.
    pub(crate) fn subscribe(&self, current: RoomSnapshot) -> RoomSubscription {
        let mut channels = self.channels.lock().expect("notifier mutex poisoned");
        let room_id = current.room.room_id.clone();
        match channels.get(&room_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(current);
                channels.insert(room_id, tx);
                rx
            }
        }
    }

    /// Push a snapshot to subscribers. Older versions never replace newer ones.
    pub(crate) fn publish(&self, snapshot: &RoomSnapshot) {
        let channels = self.channels.lock().expect("notifier mutex poisoned");
        if let Some(tx) = channels.get(&snapshot.room.room_id) {
            tx.send_if_modified(|current| {
                if snapshot.version > current.version {
                    *current = snapshot.clone();
                    true
                } else {
                    false
                }
            });
        }
    }
}
