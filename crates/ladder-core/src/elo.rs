/// Starting rating for a player's first appearance in a queue.
pub const DEFAULT_RATING: i32 = 1500;

/// Default K-factor for rating updates.
pub const DEFAULT_K: f64 = 32.0;

/// Rating change for each possible outcome of one match, from one player's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EloGains {
    pub win: i32,
    pub draw: i32,
    pub loss: i32,
}

/// Expected score of `player_rating` against `opponent_rating`.
pub fn expected_score(player_rating: i32, opponent_rating: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent_rating - player_rating) as f64 / 400.0))
}

/// Calculate the rating change `player_rating` would see for a win, a draw
/// and a loss against `opponent_rating`.
pub fn calculate_elo_gains(player_rating: i32, opponent_rating: i32, k: f64) -> EloGains {
    let expected = expected_score(player_rating, opponent_rating);
    EloGains {
        win: (k * (1.0 - expected)).round() as i32,
        draw: (k * (0.5 - expected)).round() as i32,
        loss: (k * -expected).round() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings() {
        let gains = calculate_elo_gains(1500, 1500, DEFAULT_K);
        assert_eq!(gains.win, 16);
        assert_eq!(gains.draw, 0);
        assert_eq!(gains.loss, -16);
    }

    #[test]
    fn underdog_wins() {
        let gains = calculate_elo_gains(1300, 1700, DEFAULT_K);
        // Underdog gains more
        assert!(gains.win > 16);
        assert!(gains.draw > 0);
    }

    #[test]
    fn favorite_wins() {
        let gains = calculate_elo_gains(1700, 1300, DEFAULT_K);
        // Favorite gains less
        assert!(gains.win < 16);
        assert!(gains.draw < 0);
    }

    #[test]
    fn win_and_loss_mirror_between_opponents() {
        let a = calculate_elo_gains(1620, 1480, DEFAULT_K);
        let b = calculate_elo_gains(1480, 1620, DEFAULT_K);
        assert_eq!(a.win, -b.loss);
        assert_eq!(a.loss, -b.win);
    }
}
