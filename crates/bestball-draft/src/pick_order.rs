// Snake (serpentine) pick order.
//
// Every component re-derives "whose turn is it" from the pick index with
// these functions instead of trusting a cached on-clock value.

/// Index into the seeded participant list for the given global pick index.
///
/// Even rounds run forward through the seed order, odd rounds run backward.
/// `participant_count` must be non-zero.
pub fn turn_participant(pick_index: u32, participant_count: u32) -> u32 {
    let round = pick_index / participant_count;
    let position_in_round = pick_index % participant_count;
    if round % 2 == 0 {
        position_in_round
    } else {
        participant_count - 1 - position_in_round
    }
}

/// 1-based round number for a pick index.
pub fn round_number(pick_index: u32, participant_count: u32) -> u32 {
    pick_index / participant_count + 1
}

/// Pick indices (ascending) owned by one seat over a whole draft.
pub fn picks_for_seat(seat: u32, participant_count: u32, rounds: u32) -> Vec<u32> {
    (0..participant_count * rounds)
        .filter(|&idx| turn_participant(idx, participant_count) == seat)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_team_snake_sequence() {
        let order: Vec<u32> = (0..12).map(|i| turn_participant(i, 4)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 3, 2, 1, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn three_team_two_round_sequence() {
        let order: Vec<u32> = (0..6).map(|i| turn_participant(i, 3)).collect();
        assert_eq!(order, vec![0, 1, 2, 2, 1, 0]);
    }

    #[test]
    fn every_round_is_a_permutation_that_reverses() {
        for n in 1..=12u32 {
            for round in 0..18u32 {
                let seats: Vec<u32> = (0..n).map(|p| turn_participant(round * n + p, n)).collect();
                let mut sorted = seats.clone();
                sorted.sort_unstable();
                assert_eq!(sorted, (0..n).collect::<Vec<_>>(), "n={n} round={round}");

                if round > 0 {
                    let prev: Vec<u32> =
                        (0..n).map(|p| turn_participant((round - 1) * n + p, n)).collect();
                    let reversed: Vec<u32> = prev.into_iter().rev().collect();
                    assert_eq!(seats, reversed, "n={n} round={round}");
                }
            }
        }
    }

    #[test]
    fn single_participant_always_on_clock() {
        for i in 0..10 {
            assert_eq!(turn_participant(i, 1), 0);
        }
    }

    #[test]
    fn round_numbers_are_one_based() {
        assert_eq!(round_number(0, 4), 1);
        assert_eq!(round_number(3, 4), 1);
        assert_eq!(round_number(4, 4), 2);
        assert_eq!(round_number(11, 4), 3);
    }

    #[test]
    fn seat_pick_lists_wrap_at_the_turn() {
        // Last seat picks back-to-back at the turn.
        assert_eq!(picks_for_seat(2, 3, 2), vec![2, 3]);
        assert_eq!(picks_for_seat(0, 3, 2), vec![0, 5]);
        assert_eq!(picks_for_seat(1, 4, 3), vec![1, 6, 9]);
    }
}
