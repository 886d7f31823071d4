//! Persistence collaborator used by the matchmaker.

mod memory;
mod sqlite;

pub use memory::{Fault, MemoryStore};
pub use sqlite::{SqliteStore, init_db};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ladder_core::PlayerId;

use crate::error::Result;
use crate::model::{
    EnqueueSource, Match, MatchId, MatchResolution, MatchResult, NewMatch, NewQueue, Player,
    PlayerRating, Queue, QueueId, WaitingEntry,
};

/// The narrow set of queries the ladder needs from storage.
#[async_trait]
pub trait LadderStore: Send + Sync {
    /// Register a player. Fails with `NameTaken` on a case-insensitive clash.
    async fn create_player(&self, name: &str) -> Result<Player>;

    async fn player(&self, player_id: PlayerId) -> Result<Option<Player>>;

    async fn set_banned(&self, player_id: PlayerId, banned: bool) -> Result<()>;

    async fn create_queue(&self, queue: &NewQueue) -> Result<Queue>;

    /// Look up a queue by name, case-insensitively.
    async fn queue(&self, name: &str) -> Result<Option<Queue>>;

    /// Queues that have not been retired.
    async fn active_queues(&self) -> Result<Vec<Queue>>;

    async fn set_queue_expired(&self, queue_id: QueueId, expired: bool) -> Result<()>;

    /// Waiting entries of a queue, oldest first.
    async fn waiting_entries(&self, queue_id: QueueId) -> Result<Vec<WaitingEntry>>;

    async fn waiting_entry(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
    ) -> Result<Option<WaitingEntry>>;

    /// Create a waiting entry. Returns `None` if the player already waits in this queue.
    async fn create_waiting_entry(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        at: DateTime<Utc>,
        source: EnqueueSource,
    ) -> Result<Option<WaitingEntry>>;

    /// Returns whether an entry was removed.
    async fn delete_waiting_entry(&self, player_id: PlayerId, queue_id: QueueId) -> Result<bool>;

    /// Move a waiting entry's timestamp to `at`.
    async fn touch_waiting_entry(&self, entry_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Create the player's rating row for this queue if missing. Returns
    /// whether a row was created.
    async fn ensure_rating(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        default_rating: i32,
    ) -> Result<bool>;

    async fn rating(&self, player_id: PlayerId, queue_id: QueueId) -> Result<Option<PlayerRating>>;

    /// Ratings of non-banned players in a queue, highest first.
    async fn ratings(&self, queue_id: QueueId) -> Result<Vec<PlayerRating>>;

    /// Up to `limit` decided matches of a player in a queue, most recently decided first.
    async fn recent_decided_matches(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        limit: usize,
    ) -> Result<Vec<Match>>;

    /// Pending matches of a player in a queue, oldest first.
    async fn pending_matches(&self, player_id: PlayerId, queue_id: QueueId) -> Result<Vec<Match>>;

    async fn count_pending_matches(&self, player_id: PlayerId, queue_id: QueueId) -> Result<usize>;

    /// Atomically create a pending match and remove both players' waiting
    /// entries. Nothing is written if either entry is gone.
    async fn finalize_match(&self, new_match: &NewMatch) -> Result<Match>;

    async fn match_by_id(&self, match_id: MatchId) -> Result<Option<Match>>;

    /// Atomically record a result on a pending match and update both rating rows.
    async fn record_result(&self, resolution: &MatchResolution) -> Result<Match>;

    /// Flip a player's autoqueue opt-in. Returns the new state.
    async fn toggle_autoqueue(&self, player_id: PlayerId, queue_id: QueueId) -> Result<bool>;

    /// Players opted into autoqueue for a queue.
    async fn autoqueue_players(&self, queue_id: QueueId) -> Result<Vec<PlayerId>>;
}

/// Counter increments a resolution applies to one participant's rating row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub wins: i32,
    pub draws: i32,
    pub losses: i32,
    pub aborts: i32,
}

pub(crate) fn tally(resolution: &MatchResolution, player_id: PlayerId) -> Tally {
    match (&resolution.result, resolution.winner) {
        (MatchResult::Abort, _) => Tally {
            aborts: 1,
            ..Tally::default()
        },
        (MatchResult::Draw, _) => Tally {
            draws: 1,
            ..Tally::default()
        },
        (MatchResult::Winner(_), Some(winner)) if winner == player_id => Tally {
            wins: 1,
            ..Tally::default()
        },
        (MatchResult::Winner(_), _) => Tally {
            losses: 1,
            ..Tally::default()
        },
        (MatchResult::Pending, _) => Tally::default(),
    }
}
