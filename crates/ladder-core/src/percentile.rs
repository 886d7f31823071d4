use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// A player's position within a queue's rating table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub player_id: PlayerId,
    pub rating: i32,
    /// 1-based competition rank; tied players share the lowest rank of their group.
    pub rank: usize,
    /// 0.0 for the top of the table, 1.0 for the bottom.
    pub percentile: f64,
}

/// Assign ranks and percentiles to every rated player of a queue.
///
/// Players are ordered by rating descending (input order breaks ties). A tie
/// group spanning 0-based indices `first..=last` gets rank `first + 1` and
/// percentile `(first + last) / 2 / (n - 1)`. A table of one player sits at
/// percentile 0.
pub fn rank_percentiles(ratings: &[(PlayerId, i32)]) -> Vec<Standing> {
    let mut sorted = ratings.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    let n = sorted.len();
    let denominator = n.saturating_sub(1) as f64;
    let mut standings = Vec::with_capacity(n);

    let mut first = 0;
    while first < n {
        let mut last = first;
        while last + 1 < n && sorted[last + 1].1 == sorted[first].1 {
            last += 1;
        }

        let percentile = if denominator > 0.0 {
            (first + last) as f64 / 2.0 / denominator
        } else {
            0.0
        };

        for &(player_id, rating) in &sorted[first..=last] {
            standings.push(Standing {
                player_id,
                rating,
                rank: first + 1,
                percentile,
            });
        }
        first = last + 1;
    }

    standings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table() {
        assert!(rank_percentiles(&[]).is_empty());
    }

    #[test]
    fn single_player_is_top() {
        let s = rank_percentiles(&[(7, 1500)]);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].rank, 1);
        assert_eq!(s[0].percentile, 0.0);
    }

    #[test]
    fn distinct_ratings_spread_evenly() {
        let s = rank_percentiles(&[(1, 1600), (2, 1550), (3, 1500), (4, 1450), (5, 1400)]);
        let pct: Vec<f64> = s.iter().map(|x| x.percentile).collect();
        assert_eq!(pct, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let ranks: Vec<usize> = s.iter().map(|x| x.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ties_share_rank_and_midpoint_percentile() {
        // indices 1..=2 tie
        let s = rank_percentiles(&[(1, 1600), (2, 1500), (3, 1500), (4, 1400), (5, 1300)]);
        assert_eq!(s[1].rank, 2);
        assert_eq!(s[2].rank, 2);
        assert_eq!(s[3].rank, 4);
        assert_eq!(s[1].percentile, 0.375);
        assert_eq!(s[2].percentile, 0.375);
    }

    #[test]
    fn everyone_tied() {
        let s = rank_percentiles(&[(1, 1500), (2, 1500), (3, 1500)]);
        assert!(s.iter().all(|x| x.rank == 1 && x.percentile == 0.5));
    }

    #[test]
    fn unsorted_input_is_ordered_by_rating() {
        let s = rank_percentiles(&[(1, 1400), (2, 1600), (3, 1500)]);
        let ids: Vec<PlayerId> = s.iter().map(|x| x.player_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn percentile_is_monotone_in_rating() {
        let ratings: Vec<(PlayerId, i32)> = [1800, 1700, 1700, 1650, 1500, 1500, 1500, 1200, 1100]
            .iter()
            .enumerate()
            .map(|(i, &r)| (i as PlayerId, r))
            .collect();
        let s = rank_percentiles(&ratings);
        for pair in s.windows(2) {
            assert!(pair[0].percentile <= pair[1].percentile);
            if pair[0].rating == pair[1].rating {
                assert_eq!(pair[0].percentile, pair[1].percentile);
                assert_eq!(pair[0].rank, pair[1].rank);
            }
        }
    }
}
