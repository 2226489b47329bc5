// Roster positions, position limits, and the pick legality check.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RuleViolation;
use crate::model::{RoomSnapshot, RoomStatus, RosterSlot};
use crate::pool::PlayerPoolEntry;

/// Football positions drafted in best-ball rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "QB")]
    Quarterback,
    #[serde(rename = "RB")]
    RunningBack,
    #[serde(rename = "WR")]
    WideReceiver,
    #[serde(rename = "TE")]
    TightEnd,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Quarterback,
        Position::RunningBack,
        Position::WideReceiver,
        Position::TightEnd,
    ];

    /// Parse a position abbreviation (case-insensitive). Ranking exports
    /// sometimes carry a position rank suffix ("WR12"); the digits are ignored.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        let letters: String = s
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        match letters.to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Inclusive bounds on how many players of one position a roster may hold
/// at the end of the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLimit {
    #[serde(default)]
    pub min: u32,
    pub max: u32,
}

/// Per-position limits for every roster in a room. Positions without an
/// entry are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRules {
    pub limits: BTreeMap<Position, PositionLimit>,
}

impl RosterRules {
    pub fn new(limits: BTreeMap<Position, PositionLimit>) -> Self {
        RosterRules { limits }
    }

    /// Build from a config mapping of position strings ("QB", "RB", ...).
    /// Unknown position keys are returned as an error naming the key.
    pub fn from_config(limits: &HashMap<String, PositionLimit>) -> Result<Self, String> {
        let mut parsed = BTreeMap::new();
        for (key, limit) in limits {
            let pos = Position::from_str_pos(key).ok_or_else(|| key.clone())?;
            parsed.insert(pos, *limit);
        }
        Ok(RosterRules { limits: parsed })
    }

    /// Sum of every position minimum.
    pub fn total_minimum(&self) -> u32 {
        self.limits.values().map(|l| l.min).sum()
    }

    /// Check only the roster-shape rules: position ceiling, then whether the
    /// remaining rounds can still satisfy every position minimum once the
    /// candidate is added.
    pub fn check_roster(
        &self,
        roster: &[RosterSlot],
        candidate: Position,
        rounds: u32,
    ) -> Result<(), RuleViolation> {
        let mut counts: BTreeMap<Position, u32> = BTreeMap::new();
        for slot in roster {
            *counts.entry(slot.position).or_default() += 1;
        }
        *counts.entry(candidate).or_default() += 1;

        if let Some(limit) = self.limits.get(&candidate) {
            if counts[&candidate] > limit.max {
                return Err(RuleViolation::PositionCeilingExceeded {
                    position: candidate,
                    max: limit.max,
                });
            }
        }

        let remaining_after = rounds.saturating_sub(roster.len() as u32 + 1);
        let mut deficit = 0;
        let mut first_short = None;
        for (pos, limit) in &self.limits {
            let have = counts.get(pos).copied().unwrap_or(0);
            if have < limit.min {
                deficit += limit.min - have;
                first_short.get_or_insert((*pos, limit.min));
            }
        }
        if deficit > remaining_after {
            if let Some((position, min)) = first_short {
                return Err(RuleViolation::RosterMinimumUnreachable { position, min });
            }
        }

        Ok(())
    }
}

/// Full legality check for one candidate pick, in commit order: room status,
/// turn ownership, duplicate player, then roster shape.
pub fn validate_pick(
    rules: &RosterRules,
    snapshot: &RoomSnapshot,
    participant_id: &str,
    candidate: &PlayerPoolEntry,
) -> Result<(), RuleViolation> {
    let room = &snapshot.room;
    if room.status != RoomStatus::Active {
        return Err(RuleViolation::RoomNotActive);
    }

    match room.on_clock() {
        Some(p) if p.participant_id == participant_id => {}
        _ => return Err(RuleViolation::NotParticipantsTurn),
    }

    if snapshot.is_taken(&candidate.player_id) {
        return Err(RuleViolation::PlayerAlreadyRosteredElsewhere {
            player_id: candidate.player_id.clone(),
        });
    }

    let roster = snapshot.roster(participant_id);
    rules.check_roster(&roster, candidate.position, room.rounds)
}
