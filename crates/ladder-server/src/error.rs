use std::borrow::Cow;

use ladder_core::{PlayerId, WeightError};

pub type Result<T> = std::result::Result<T, LadderError>;

#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    /* Storage, infrastructure */
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("storage failure: {reason}")]
    Storage { reason: Cow<'static, str> },

    #[error("notification failed: {reason}")]
    Notify { reason: Cow<'static, str> },

    #[error("corrupt row: {reason}")]
    Corrupt { reason: Cow<'static, str> },

    #[error("configuration error: {reason}")]
    Config { reason: Cow<'static, str> },

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("json error")]
    Json(#[from] serde_json::Error),

    /* Lookups */
    #[error("queue not found: {name}")]
    QueueNotFound { name: String },

    #[error("queue has expired: {name}")]
    QueueExpired { name: String },

    #[error("player not found: {player_id}")]
    PlayerNotFound { player_id: PlayerId },

    #[error("match not found: {match_id}")]
    MatchNotFound { match_id: i64 },

    #[error("player name already taken: {name}")]
    NameTaken { name: String },

    /* Match lifecycle */
    #[error("match {match_id} already has a result")]
    MatchAlreadyDecided { match_id: i64 },

    #[error("player {player_id} did not play in match {match_id}")]
    NotAParticipant { match_id: i64, player_id: PlayerId },

    /* Matchmaking consistency */
    #[error("player {player_id} has no rating in queue {queue}")]
    MissingRating { player_id: PlayerId, queue: String },

    #[error("solver left player {player_id} without a partner")]
    UnmatchedPlayer { player_id: PlayerId },

    #[error("waiting entry for player {player_id} vanished before finalization")]
    StaleWaitingEntry { player_id: PlayerId },

    #[error(transparent)]
    Weights(#[from] WeightError),
}

impl LadderError {
    pub fn storage(reason: impl Into<Cow<'static, str>>) -> Self {
        LadderError::Storage {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<Cow<'static, str>>) -> Self {
        LadderError::Config {
            reason: reason.into(),
        }
    }

    /// Whether the error reflects a bad request rather than a broken system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LadderError::QueueNotFound { .. }
                | LadderError::QueueExpired { .. }
                | LadderError::PlayerNotFound { .. }
                | LadderError::MatchNotFound { .. }
                | LadderError::NameTaken { .. }
                | LadderError::MatchAlreadyDecided { .. }
                | LadderError::NotAParticipant { .. }
        )
    }
}
