// Room lifecycle transitions: create, activate, pause, resume, autodraft.
//
// These are the only non-pick writes to a room document. They go through the
// same optimistic version check as pick commits, so a transition racing a
// commit simply re-reads and re-applies.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::commit::DEFAULT_COMMIT_ATTEMPTS;
use crate::model::{DraftRoom, RoomSnapshot, RoomStatus};
use crate::store::{DraftStore, RoomWrite, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("cannot {action} a room that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },

    #[error("invalid room: {0}")]
    InvalidRoom(String),

    #[error("participant {0} is not in this room")]
    UnknownParticipant(String),

    #[error("room update abandoned after {attempts} conflicting attempts")]
    Contention { attempts: u32 },

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(id) => LifecycleError::RoomNotFound(id),
            other => LifecycleError::Store(other),
        }
    }
}

fn invalid(action: &'static str, status: RoomStatus) -> LifecycleError {
    LifecycleError::InvalidTransition {
        action,
        status: status.as_str(),
    }
}

pub struct RoomLifecycle {
    store: Arc<dyn DraftStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl RoomLifecycle {
    pub fn new(store: Arc<dyn DraftStore>, clock: Arc<dyn Clock>) -> Self {
        RoomLifecycle {
            store,
            clock,
            max_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Store a new room in `scheduled` status.
    pub async fn create_room(&self, room: DraftRoom) -> Result<RoomSnapshot, LifecycleError> {
        if room.participants.is_empty() {
            return Err(LifecycleError::InvalidRoom("room has no participants".into()));
        }
        if room.rounds == 0 {
            return Err(LifecycleError::InvalidRoom("rounds must be at least 1".into()));
        }
        if room.pick_time_secs == 0 {
            return Err(LifecycleError::InvalidRoom("pick time must be at least 1 second".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &room.participants {
            if !seen.insert(p.participant_id.as_str()) {
                return Err(LifecycleError::InvalidRoom(format!(
                    "duplicate participant {}",
                    p.participant_id
                )));
            }
        }
        if room.status != RoomStatus::Scheduled || room.current_pick_index != 0 {
            return Err(invalid("create", room.status));
        }

        let snapshot = self.store.create_room(room).await.map_err(|e| match e {
            StoreError::AlreadyExists(id) => LifecycleError::InvalidRoom(format!("room {id} already exists")),
            other => other.into(),
        })?;
        info!(
            "room {} created: {} participants, {} rounds, {}s per pick",
            snapshot.room.room_id,
            snapshot.room.participant_count(),
            snapshot.room.rounds,
            snapshot.room.pick_time_secs
        );
        Ok(snapshot)
    }

    /// `scheduled → active`; the first turn gets a full pick clock.
    pub async fn activate(&self, room_id: &str) -> Result<RoomSnapshot, LifecycleError> {
        self.update(room_id, "activate", |room, now| {
            if room.status != RoomStatus::Scheduled {
                return Err(invalid("activate", room.status));
            }
            if room.is_complete() {
                room.status = RoomStatus::Complete;
                room.current_turn_deadline = None;
            } else {
                room.status = RoomStatus::Active;
                room.current_turn_deadline = Some(now + room.pick_time_limit());
            }
            Ok(())
        })
        .await
    }

    /// `active → paused`. The deadline is kept; the time left on the clock
    /// is recorded for `resume`.
    pub async fn pause(&self, room_id: &str) -> Result<RoomSnapshot, LifecycleError> {
        self.update(room_id, "pause", |room, now| {
            if room.status != RoomStatus::Active {
                return Err(invalid("pause", room.status));
            }
            let remaining = room
                .current_turn_deadline
                .map(|d| (d - now).num_milliseconds().max(0))
                .unwrap_or_else(|| room.pick_time_limit().num_milliseconds());
            room.status = RoomStatus::Paused;
            room.paused_remaining_ms = Some(remaining);
            Ok(())
        })
        .await
    }

    /// `paused → active`. The on-clock participant gets back exactly the time
    /// they had left when the room was paused.
    pub async fn resume(&self, room_id: &str) -> Result<RoomSnapshot, LifecycleError> {
        self.update(room_id, "resume", |room, now| {
            if room.status != RoomStatus::Paused {
                return Err(invalid("resume", room.status));
            }
            let remaining = room
                .paused_remaining_ms
                .map(Duration::milliseconds)
                .unwrap_or_else(|| room.pick_time_limit());
            room.status = RoomStatus::Active;
            room.current_turn_deadline = Some(now + remaining);
            room.paused_remaining_ms = None;
            Ok(())
        })
        .await
    }

    pub async fn set_autodraft(
        &self,
        room_id: &str,
        participant_id: &str,
        enabled: bool,
    ) -> Result<RoomSnapshot, LifecycleError> {
        self.update(room_id, "change autodraft in", |room, _now| {
            if room.status == RoomStatus::Complete {
                return Err(invalid("change autodraft in", room.status));
            }
            let participant = room
                .participant_mut(participant_id)
                .ok_or_else(|| LifecycleError::UnknownParticipant(participant_id.to_string()))?;
            participant.autodraft = enabled;
            Ok(())
        })
        .await
    }

    /// Read, apply `change`, and compare-and-swap, retrying on conflict.
    async fn update<F>(
        &self,
        room_id: &str,
        action: &'static str,
        mut change: F,
    ) -> Result<RoomSnapshot, LifecycleError>
    where
        F: FnMut(&mut DraftRoom, DateTime<Utc>) -> Result<(), LifecycleError> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let snapshot = self.store.load_room(room_id).await?;
            let mut room = snapshot.room.clone();
            change(&mut room, self.clock.now())?;

            let write = RoomWrite {
                room,
                expected_version: snapshot.version,
                pick: None,
            };
            match self.store.commit_room(write).await {
                Ok(next) => {
                    info!(
                        "room {}: {} -> {} ({})",
                        room_id,
                        snapshot.room.status.as_str(),
                        next.room.status.as_str(),
                        action
                    );
                    return Ok(next);
                }
                Err(StoreError::Conflict) => {
                    debug!(
                        "conflict during {} on room {} (attempt {}/{})",
                        action, room_id, attempt, self.max_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LifecycleError::Contention {
            attempts: self.max_attempts,
        })
    }
}
