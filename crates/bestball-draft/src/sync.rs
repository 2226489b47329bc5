// Client-side view of a room, reconciled against authoritative snapshots.
//
// The view may show an optimistic "pick pending" state, but requests are
// always built from the last authoritative snapshot and the pending state is
// resolved only by what the store says happened.

use crate::commit::PickRequest;
use crate::error::ErrorClass;
use crate::model::{Pick, PickOrigin, RoomSnapshot, RoomStatus};

/// A submitted pick awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPick {
    pub player_id: String,
    pub pick_index: u32,
}

/// Rejection as the client received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: String,
    pub class: ErrorClass,
    pub message: String,
}

/// Result of folding one snapshot into the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Snapshot was not newer than what the view already had.
    Ignored,
    Updated,
    /// Our pending pick is now committed.
    PickConfirmed(Pick),
    /// The slot we were picking for was filled by something else.
    PickSuperseded { pick_index: u32 },
}

#[derive(Debug, Clone)]
pub struct ClientDraftView {
    participant_id: String,
    snapshot: Option<RoomSnapshot>,
    pending: Option<PendingPick>,
    last_rejection: Option<Rejection>,
}

impl ClientDraftView {
    pub fn new(participant_id: &str) -> Self {
        ClientDraftView {
            participant_id: participant_id.to_string(),
            snapshot: None,
            pending: None,
            last_rejection: None,
        }
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingPick> {
        self.pending.as_ref()
    }

    pub fn last_rejection(&self) -> Option<&Rejection> {
        self.last_rejection.as_ref()
    }

    /// Fold in an authoritative snapshot. Out-of-order deliveries with an
    /// older or equal version are dropped.
    pub fn apply_snapshot(&mut self, snapshot: RoomSnapshot) -> SyncEvent {
        if let Some(current) = &self.snapshot {
            if snapshot.version <= current.version {
                return SyncEvent::Ignored;
            }
        }

        let mut event = SyncEvent::Updated;
        if let Some(pending) = &self.pending {
            if let Some(pick) = snapshot.picks.get(pending.pick_index as usize) {
                event = if pick.participant_id == self.participant_id
                    && pick.player_id == pending.player_id
                {
                    SyncEvent::PickConfirmed(pick.clone())
                } else {
                    SyncEvent::PickSuperseded {
                        pick_index: pending.pick_index,
                    }
                };
                self.pending = None;
            }
        }

        self.snapshot = Some(snapshot);
        event
    }

    pub fn is_my_turn(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| {
            s.room.status == RoomStatus::Active
                && s.room
                    .on_clock()
                    .is_some_and(|p| p.participant_id == self.participant_id)
        })
    }

    pub fn is_available(&self, player_id: &str) -> bool {
        self.snapshot.as_ref().is_some_and(|s| !s.is_taken(player_id))
    }

    /// Build a manual pick request against the last authoritative state.
    /// `None` when it is not our turn, the player is gone, or a pick is
    /// already in flight.
    pub fn begin_pick(&mut self, player_id: &str) -> Option<PickRequest> {
        if self.pending.is_some() || !self.is_my_turn() || !self.is_available(player_id) {
            return None;
        }
        let snapshot = self.snapshot.as_ref()?;
        let pick_index = snapshot.room.current_pick_index;
        self.pending = Some(PendingPick {
            player_id: player_id.to_string(),
            pick_index,
        });
        self.last_rejection = None;
        Some(PickRequest {
            room_id: snapshot.room.room_id.clone(),
            participant_id: self.participant_id.clone(),
            player_id: player_id.to_string(),
            expected_pick_index: pick_index,
            origin: PickOrigin::Manual,
        })
    }

    /// The server refused our pick; drop the optimistic state.
    pub fn apply_rejection(&mut self, rejection: Rejection) {
        self.pending = None;
        self.last_rejection = Some(rejection);
    }
}
