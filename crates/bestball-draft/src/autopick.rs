// Player selection for picks the system makes on a participant's behalf.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{QueueEntry, RoomSnapshot};
use crate::pool::{PlayerPool, PlayerPoolEntry};
use crate::roster::RosterRules;

/// Where an automatic pick came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceSource {
    /// The participant's own autodraft queue.
    Queue,
    /// Best available by external ranking.
    Ranking,
    /// No ranked player fits; smallest unranked player id.
    ColdStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoPickChoice {
    pub player_id: String,
    pub source: ChoiceSource,
}

/// Choose the player to draft for `participant_id`: the first queued player
/// that is still available and legal, else the best-ranked legal player, else
/// the lowest unranked player id that is legal. `None` only when no available
/// player at all fits the roster rules.
pub fn choose_player(
    snapshot: &RoomSnapshot,
    participant_id: &str,
    queue: &QueueEntry,
    pool: &dyn PlayerPool,
    rules: &RosterRules,
) -> Option<AutoPickChoice> {
    let taken = snapshot.taken_players();
    let roster = snapshot.roster(participant_id);
    let rounds = snapshot.room.rounds;

    let legal = |player: &PlayerPoolEntry| {
        !taken.contains(player.player_id.as_str())
            && rules.check_roster(&roster, player.position, rounds).is_ok()
    };

    for player_id in &queue.player_ids {
        match pool.get_player(player_id) {
            Some(player) if legal(player) => {
                return Some(AutoPickChoice {
                    player_id: player.player_id.clone(),
                    source: ChoiceSource::Queue,
                });
            }
            Some(_) => {}
            None => debug!("queued player {} is not in the pool, skipping", player_id),
        }
    }

    // ranked() lists every ranked player first, then unranked ones by id.
    pool.ranked().iter().find(|p| legal(*p)).map(|p| AutoPickChoice {
        player_id: p.player_id.clone(),
        source: if p.rank.is_some() {
            ChoiceSource::Ranking
        } else {
            ChoiceSource::ColdStart
        },
    })
}
