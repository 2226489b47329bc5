// Draft room documents: the room header, committed picks, and derived views.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::pick_order::{round_number, turn_participant};
use crate::pool::{PlayerPool, PlayerPoolEntry};
use crate::roster::Position;

/// Lifecycle status of a draft room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Scheduled,
    Active,
    Paused,
    Complete,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Scheduled => "scheduled",
            RoomStatus::Active => "active",
            RoomStatus::Paused => "paused",
            RoomStatus::Complete => "complete",
        }
    }
}

/// Which path produced a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickOrigin {
    /// Submitted by the drafting user.
    Manual,
    /// Made by the timer after the turn deadline passed.
    Auto,
    /// Made immediately for a participant with autodraft enabled.
    Queue,
}

impl PickOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickOrigin::Manual => "manual",
            PickOrigin::Auto => "auto",
            PickOrigin::Queue => "queue",
        }
    }

    pub fn from_str_origin(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(PickOrigin::Manual),
            "auto" => Some(PickOrigin::Auto),
            "queue" => Some(PickOrigin::Queue),
            _ => None,
        }
    }
}

/// One drafting seat in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    /// 1-based seat in the draft order seed.
    pub seed_position: u32,
    /// When set, the timer picks for this participant as soon as their turn
    /// begins instead of waiting for the deadline.
    #[serde(default)]
    pub autodraft: bool,
}

/// The authoritative header document of one draft room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRoom {
    pub room_id: String,
    /// Participants in seed order.
    pub participants: Vec<Participant>,
    pub rounds: u32,
    pub pick_time_secs: u32,
    pub status: RoomStatus,
    /// 0-based index of the pick currently on the clock. Never decreases.
    pub current_pick_index: u32,
    /// Absolute deadline for the current turn. `None` before the room starts
    /// and after it completes.
    pub current_turn_deadline: Option<DateTime<Utc>>,
    /// When the room leaves `scheduled`.
    pub starts_at: DateTime<Utc>,
    /// Turn time left when the room was paused, in milliseconds.
    #[serde(default)]
    pub paused_remaining_ms: Option<i64>,
}

impl DraftRoom {
    /// Create a scheduled room from a seeded participant list.
    pub fn new(
        room_id: &str,
        participant_ids: Vec<String>,
        rounds: u32,
        pick_time_secs: u32,
        starts_at: DateTime<Utc>,
    ) -> Self {
        let participants = participant_ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| Participant {
                participant_id: id,
                seed_position: i as u32 + 1,
                autodraft: false,
            })
            .collect();

        DraftRoom {
            room_id: room_id.to_string(),
            participants,
            rounds,
            pick_time_secs,
            status: RoomStatus::Scheduled,
            current_pick_index: 0,
            current_turn_deadline: None,
            starts_at,
            paused_remaining_ms: None,
        }
    }

    pub fn participant_count(&self) -> u32 {
        self.participants.len() as u32
    }

    /// Participants × rounds.
    pub fn total_picks(&self) -> u32 {
        self.participant_count() * self.rounds
    }

    pub fn pick_time_limit(&self) -> Duration {
        Duration::seconds(i64::from(self.pick_time_secs))
    }

    pub fn is_complete(&self) -> bool {
        self.current_pick_index >= self.total_picks()
    }

    /// Participant who owns `pick_index`, or `None` past the last pick.
    pub fn participant_for_pick(&self, pick_index: u32) -> Option<&Participant> {
        let n = self.participant_count();
        if n == 0 || pick_index >= self.total_picks() {
            return None;
        }
        self.participants
            .get(turn_participant(pick_index, n) as usize)
    }

    /// Participant currently on the clock.
    pub fn on_clock(&self) -> Option<&Participant> {
        self.participant_for_pick(self.current_pick_index)
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn current_round(&self) -> u32 {
        round_number(self.current_pick_index, self.participant_count().max(1))
    }
}

/// An immutable committed pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    /// Global 0-based pick index within the room.
    pub pick_index: u32,
    /// 1-based round.
    pub round: u32,
    pub participant_id: String,
    pub player_id: String,
    /// Player position at commit time (denormalised from the pool).
    pub position: Position,
    pub committed_at: DateTime<Utc>,
    pub origin: PickOrigin,
}

/// Denormalised view of one filled roster position. Derived from picks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSlot {
    pub position: Position,
    pub player_id: String,
    pub pick_index: u32,
}

/// One participant's ranked autodraft preferences within a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub participant_id: String,
    /// First preference first.
    pub player_ids: Vec<String>,
}

impl QueueEntry {
    pub fn empty(participant_id: &str) -> Self {
        QueueEntry {
            participant_id: participant_id.to_string(),
            player_ids: Vec::new(),
        }
    }
}

/// A consistent read of one room: header, every committed pick in index
/// order, and the document version the store will compare against on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: DraftRoom,
    pub picks: Vec<Pick>,
    pub version: u64,
}

impl RoomSnapshot {
    pub fn is_taken(&self, player_id: &str) -> bool {
        self.picks.iter().any(|p| p.player_id == player_id)
    }

    pub fn taken_players(&self) -> HashSet<&str> {
        self.picks.iter().map(|p| p.player_id.as_str()).collect()
    }

    /// Roster for one participant, in pick order.
    pub fn roster(&self, participant_id: &str) -> Vec<RosterSlot> {
        self.picks
            .iter()
            .filter(|p| p.participant_id == participant_id)
            .map(|p| RosterSlot {
                position: p.position,
                player_id: p.player_id.clone(),
                pick_index: p.pick_index,
            })
            .collect()
    }

    /// Pool players not referenced by any pick in this room, in pool order.
    pub fn available_players<'a>(&self, pool: &'a dyn PlayerPool) -> Vec<&'a PlayerPoolEntry> {
        let taken = self.taken_players();
        pool.ranked()
            .iter()
            .filter(|p| !taken.contains(p.player_id.as_str()))
            .collect()
    }

    /// Picks whose index is `from` or later.
    pub fn picks_from(&self, from: u32) -> &[Pick] {
        let start = (from as usize).min(self.picks.len());
        &self.picks[start..]
    }
}
