// Typed outcomes of the draft engine.
//
// Everything here is an expected result of normal operation (lost races,
// out-of-turn clicks, rule violations) and is returned as a value, never used
// for control flow past the commit boundary.

use thiserror::Error;

use crate::roster::Position;
use crate::store::StoreError;

/// Reasons the roster rule validator refuses a candidate pick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("room is not active")]
    RoomNotActive,

    #[error("it is not this participant's turn")]
    NotParticipantsTurn,

    #[error("player {player_id} is already rostered")]
    PlayerAlreadyRosteredElsewhere { player_id: String },

    #[error("roster already holds the maximum of {max} {position}")]
    PositionCeilingExceeded { position: Position, max: u32 },

    #[error("not enough picks left to reach the minimum of {min} {position}")]
    RosterMinimumUnreachable { position: Position, min: u32 },
}

/// How a client should present a failed commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// "You can't do that": shown inline, the request itself was invalid.
    Rejected,
    /// "Something else happened first": refresh and pick again.
    Superseded,
    /// Infrastructure trouble: "retrying...".
    Transient,
}

/// Result of a failed `commit_pick`.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("room is not active")]
    RoomNotActive,

    #[error("it is not this participant's turn")]
    NotParticipantsTurn,

    #[error("player {player_id} is already rostered")]
    PlayerAlreadyRosteredElsewhere { player_id: String },

    #[error("roster already holds the maximum of {max} {position}")]
    PositionCeilingExceeded { position: Position, max: u32 },

    #[error("not enough picks left to reach the minimum of {min} {position}")]
    RosterMinimumUnreachable { position: Position, min: u32 },

    #[error("turn already advanced: expected pick {expected}, current pick is {current}")]
    StaleTurn { expected: u32, current: u32 },

    #[error("time ran out for pick {pick_index}")]
    TurnExpired { pick_index: u32 },

    #[error("commit abandoned after {attempts} conflicting attempts")]
    CommitContention { attempts: u32 },

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("participant {0} is not in this room")]
    UnknownParticipant(String),

    #[error("player {0} is not in the player pool")]
    UnknownPlayer(String),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl CommitError {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::RoomNotActive => "ROOM_NOT_ACTIVE",
            CommitError::NotParticipantsTurn => "NOT_PARTICIPANTS_TURN",
            CommitError::PlayerAlreadyRosteredElsewhere { .. } => "PLAYER_ALREADY_ROSTERED_ELSEWHERE",
            CommitError::PositionCeilingExceeded { .. } => "POSITION_CEILING_EXCEEDED",
            CommitError::RosterMinimumUnreachable { .. } => "ROSTER_MINIMUM_UNREACHABLE",
            CommitError::StaleTurn { .. } => "STALE_TURN",
            CommitError::TurnExpired { .. } => "TURN_EXPIRED",
            CommitError::CommitContention { .. } => "COMMIT_CONTENTION",
            CommitError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            CommitError::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
            CommitError::UnknownPlayer(_) => "UNKNOWN_PLAYER",
            CommitError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CommitError::StaleTurn { .. }
            | CommitError::TurnExpired { .. }
            | CommitError::PlayerAlreadyRosteredElsewhere { .. } => ErrorClass::Superseded,
            CommitError::CommitContention { .. } | CommitError::Store(_) => ErrorClass::Transient,
            _ => ErrorClass::Rejected,
        }
    }

    /// True for failures of the store itself rather than of the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, CommitError::Store(_))
    }
}

impl From<RuleViolation> for CommitError {
    fn from(v: RuleViolation) -> Self {
        match v {
            RuleViolation::RoomNotActive => CommitError::RoomNotActive,
            RuleViolation::NotParticipantsTurn => CommitError::NotParticipantsTurn,
            RuleViolation::PlayerAlreadyRosteredElsewhere { player_id } => {
                CommitError::PlayerAlreadyRosteredElsewhere { player_id }
            }
            RuleViolation::PositionCeilingExceeded { position, max } => {
                CommitError::PositionCeilingExceeded { position, max }
            }
            RuleViolation::RosterMinimumUnreachable { position, min } => {
                CommitError::RosterMinimumUnreachable { position, min }
            }
        }
    }
}

impl From<StoreError> for CommitError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(id) => CommitError::RoomNotFound(id),
            other => CommitError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_taxonomy() {
        assert_eq!(CommitError::StaleTurn { expected: 3, current: 4 }.code(), "STALE_TURN");
        assert_eq!(CommitError::RoomNotActive.code(), "ROOM_NOT_ACTIVE");
        assert_eq!(CommitError::CommitContention { attempts: 5 }.code(), "COMMIT_CONTENTION");
        assert_eq!(CommitError::NotParticipantsTurn.code(), "NOT_PARTICIPANTS_TURN");
        assert_eq!(CommitError::TurnExpired { pick_index: 2 }.code(), "TURN_EXPIRED");
    }

    #[test]
    fn classes_drive_user_treatment() {
        assert_eq!(
            CommitError::StaleTurn { expected: 0, current: 1 }.class(),
            ErrorClass::Superseded
        );
        assert_eq!(
            CommitError::PlayerAlreadyRosteredElsewhere { player_id: "x".into() }.class(),
            ErrorClass::Superseded
        );
        assert_eq!(
            CommitError::PositionCeilingExceeded { position: Position::TightEnd, max: 2 }.class(),
            ErrorClass::Rejected
        );
        assert_eq!(CommitError::TurnExpired { pick_index: 0 }.class(), ErrorClass::Superseded);
        assert_eq!(CommitError::CommitContention { attempts: 5 }.class(), ErrorClass::Transient);
        assert_eq!(
            CommitError::Store(StoreError::Backend("disk".into())).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn store_not_found_maps_to_room_not_found() {
        let err: CommitError = StoreError::RoomNotFound("r9".into()).into();
        assert!(matches!(err, CommitError::RoomNotFound(ref id) if id == "r9"));
        assert!(!err.is_infrastructure());

        let err: CommitError = StoreError::Backend("io".into()).into();
        assert!(err.is_infrastructure());
    }

    #[test]
    fn rule_violations_convert_one_to_one() {
        let err: CommitError = RuleViolation::NotParticipantsTurn.into();
        assert_eq!(err.code(), "NOT_PARTICIPANTS_TURN");
        let err: CommitError = RuleViolation::RosterMinimumUnreachable {
            position: Position::Quarterback,
            min: 1,
        }
        .into();
        assert_eq!(err.code(), "ROSTER_MINIMUM_UNREACHABLE");
    }
}
