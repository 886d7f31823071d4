use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use ladder_core::{DEFAULT_RATING, PlayerId};

use super::{LadderStore, tally};
use crate::error::{LadderError, Result};
use crate::model::{
    EnqueueSource, Match, MatchId, MatchResolution, MatchResult, NewMatch, NewQueue, Player,
    PlayerRating, Queue, QueueId, WaitingEntry,
};

/// Store operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    WaitingEntries,
    TouchEntry,
    EnsureRating,
    Ratings,
    History,
    FinalizeMatch,
    RecordResult,
}

/// In-memory ladder storage for tests.
///
/// Every operation optionally sleeps before touching state so that
/// concurrent callers interleave at await points the way they would
/// against a real database.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

struct Inner {
    next_id: i64,
    players: BTreeMap<PlayerId, Player>,
    queues: BTreeMap<QueueId, Queue>,
    entries: Vec<WaitingEntry>,
    ratings: BTreeMap<(PlayerId, QueueId), PlayerRating>,
    matches: BTreeMap<MatchId, Match>,
    autoqueues: BTreeSet<(PlayerId, QueueId)>,
    /// Armed faults: number of calls still allowed to succeed.
    faults: HashMap<Fault, usize>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check(&mut self, fault: Fault) -> Result<()> {
        match self.faults.get_mut(&fault) {
            Some(0) => Err(LadderError::storage(format!("injected failure: {:?}", fault))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn player_name(&self, player_id: PlayerId) -> String {
        self.players
            .get(&player_id)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                players: BTreeMap::new(),
                queues: BTreeMap::new(),
                entries: Vec::new(),
                ratings: BTreeMap::new(),
                matches: BTreeMap::new(),
                autoqueues: BTreeSet::new(),
                faults: HashMap::new(),
            }),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call to `fault` fail until [`MemoryStore::clear_faults`].
    pub fn fail_on(&self, fault: Fault) {
        self.fail_after(fault, 0);
    }

    /// Let `successes` calls to `fault` through, then fail the rest.
    pub fn fail_after(&self, fault: Fault, successes: usize) {
        self.inner.lock().faults.insert(fault, successes);
    }

    pub fn clear_faults(&self) {
        self.inner.lock().faults.clear();
    }

    /// Overwrite a player's rating in a queue, creating the row if needed.
    pub fn set_rating(&self, player_id: PlayerId, queue_id: QueueId, rating: i32) {
        let mut inner = self.inner.lock();
        let player_name = inner.player_name(player_id);
        let row = inner
            .ratings
            .entry((player_id, queue_id))
            .or_insert_with(|| PlayerRating {
                player_id,
                player_name,
                queue_id,
                rating,
                wins: 0,
                draws: 0,
                losses: 0,
                aborts: 0,
                peak_rating: rating,
            });
        row.rating = rating;
        row.peak_rating = row.peak_rating.max(rating);
    }

    /// Every match ever created, in creation order.
    pub fn all_matches(&self) -> Vec<Match> {
        self.inner.lock().matches.values().cloned().collect()
    }

    async fn enter(&self, fault: Option<Fault>) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match fault {
            Some(fault) => self.inner.lock().check(fault),
            None => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LadderStore for MemoryStore {
    async fn create_player(&self, name: &str) -> Result<Player> {
        self.enter(None).await?;
        let mut inner = self.inner.lock();
        if inner
            .players
            .values()
            .any(|p| p.name.eq_ignore_ascii_case(name))
        {
            return Err(LadderError::NameTaken {
                name: name.to_string(),
            });
        }
        let player = Player {
            id: inner.next_id(),
            name: name.to_string(),
            banned: false,
        };
        inner.players.insert(player.id, player.clone());
        Ok(player)
    }

    async fn player(&self, player_id: PlayerId) -> Result<Option<Player>> {
        self.enter(None).await?;
        Ok(self.inner.lock().players.get(&player_id).cloned())
    }

    async fn set_banned(&self, player_id: PlayerId, banned: bool) -> Result<()> {
        self.enter(None).await?;
        let mut inner = self.inner.lock();
        let player = inner
            .players
            .get_mut(&player_id)
            .ok_or(LadderError::PlayerNotFound { player_id })?;
        player.banned = banned;
        for entry in inner.entries.iter_mut().filter(|e| e.player.id == player_id) {
            entry.player.banned = banned;
        }
        Ok(())
    }

    async fn create_queue(&self, queue: &NewQueue) -> Result<Queue> {
        self.enter(None).await?;
        let mut inner = self.inner.lock();
        if inner
            .queues
            .values()
            .any(|q| q.name.eq_ignore_ascii_case(&queue.name))
        {
            return Err(LadderError::NameTaken {
                name: queue.name.clone(),
            });
        }
        let created = Queue {
            id: inner.next_id(),
            name: queue.name.clone(),
            expired: false,
            requirements: queue.requirements.clone(),
            special_instructions: queue.special_instructions,
        };
        inner.queues.insert(created.id, created.clone());
        Ok(created)
    }

    async fn queue(&self, name: &str) -> Result<Option<Queue>> {
        self.enter(None).await?;
        Ok(self
            .inner
            .lock()
            .queues
            .values()
            .find(|q| q.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn active_queues(&self) -> Result<Vec<Queue>> {
        self.enter(None).await?;
        Ok(self
            .inner
            .lock()
            .queues
            .values()
            .filter(|q| !q.expired)
            .cloned()
            .collect())
    }

    async fn set_queue_expired(&self, queue_id: QueueId, expired: bool) -> Result<()> {
        self.enter(None).await?;
        if let Some(queue) = self.inner.lock().queues.get_mut(&queue_id) {
            queue.expired = expired;
        }
        Ok(())
    }

    async fn waiting_entries(&self, queue_id: QueueId) -> Result<Vec<WaitingEntry>> {
        self.enter(Some(Fault::WaitingEntries)).await?;
        let inner = self.inner.lock();
        let mut entries: Vec<WaitingEntry> = inner
            .entries
            .iter()
            .filter(|e| e.queue_id == queue_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.enqueued_at, e.id));
        Ok(entries)
    }

    async fn waiting_entry(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
    ) -> Result<Option<WaitingEntry>> {
        self.enter(None).await?;
        Ok(self
            .inner
            .lock()
            .entries
            .iter()
            .find(|e| e.player.id == player_id && e.queue_id == queue_id)
            .cloned())
    }

    async fn create_waiting_entry(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        at: DateTime<Utc>,
        source: EnqueueSource,
    ) -> Result<Option<WaitingEntry>> {
        self.enter(None).await?;
        let mut inner = self.inner.lock();
        if inner
            .entries
            .iter()
            .any(|e| e.player.id == player_id && e.queue_id == queue_id)
        {
            return Ok(None);
        }
        let player = inner
            .players
            .get(&player_id)
            .cloned()
            .ok_or(LadderError::PlayerNotFound { player_id })?;
        let entry = WaitingEntry {
            id: inner.next_id(),
            player,
            queue_id,
            enqueued_at: at,
            source,
        };
        inner.entries.push(entry.clone());
        Ok(Some(entry))
    }

    async fn delete_waiting_entry(&self, player_id: PlayerId, queue_id: QueueId) -> Result<bool> {
        self.enter(None).await?;
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|e| !(e.player.id == player_id && e.queue_id == queue_id));
        Ok(inner.entries.len() < before)
    }

    async fn touch_waiting_entry(&self, entry_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.enter(Some(Fault::TouchEntry)).await?;
        if let Some(entry) = self
            .inner
            .lock()
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
        {
            entry.enqueued_at = at;
        }
        Ok(())
    }

    async fn ensure_rating(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        default_rating: i32,
    ) -> Result<bool> {
        self.enter(Some(Fault::EnsureRating)).await?;
        let mut inner = self.inner.lock();
        if inner.ratings.contains_key(&(player_id, queue_id)) {
            return Ok(false);
        }
        let player_name = inner.player_name(player_id);
        inner.ratings.insert(
            (player_id, queue_id),
            PlayerRating {
                player_id,
                player_name,
                queue_id,
                rating: default_rating,
                wins: 0,
                draws: 0,
                losses: 0,
                aborts: 0,
                peak_rating: default_rating,
            },
        );
        Ok(true)
    }

    async fn rating(&self, player_id: PlayerId, queue_id: QueueId) -> Result<Option<PlayerRating>> {
        self.enter(Some(Fault::Ratings)).await?;
        Ok(self.inner.lock().ratings.get(&(player_id, queue_id)).cloned())
    }

    async fn ratings(&self, queue_id: QueueId) -> Result<Vec<PlayerRating>> {
        self.enter(Some(Fault::Ratings)).await?;
        let inner = self.inner.lock();
        let mut rows: Vec<PlayerRating> = inner
            .ratings
            .values()
            .filter(|r| r.queue_id == queue_id)
            .filter(|r| inner.players.get(&r.player_id).is_some_and(|p| !p.banned))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.player_id.cmp(&b.player_id)));
        Ok(rows)
    }

    async fn recent_decided_matches(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        limit: usize,
    ) -> Result<Vec<Match>> {
        self.enter(Some(Fault::History)).await?;
        let inner = self.inner.lock();
        let mut decided: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| m.queue_id == queue_id && m.involves(player_id) && !m.result.is_pending())
            .cloned()
            .collect();
        decided.sort_by(|a, b| b.decided_at.cmp(&a.decided_at).then(b.id.cmp(&a.id)));
        decided.truncate(limit);
        Ok(decided)
    }

    async fn pending_matches(&self, player_id: PlayerId, queue_id: QueueId) -> Result<Vec<Match>> {
        self.enter(Some(Fault::History)).await?;
        let inner = self.inner.lock();
        let mut pending: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| m.queue_id == queue_id && m.involves(player_id) && m.result.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|m| (m.created_at, m.id));
        Ok(pending)
    }

    async fn count_pending_matches(&self, player_id: PlayerId, queue_id: QueueId) -> Result<usize> {
        self.enter(None).await?;
        Ok(self
            .inner
            .lock()
            .matches
            .values()
            .filter(|m| m.queue_id == queue_id && m.involves(player_id) && m.result.is_pending())
            .count())
    }

    async fn finalize_match(&self, new_match: &NewMatch) -> Result<Match> {
        self.enter(Some(Fault::FinalizeMatch)).await?;
        let mut inner = self.inner.lock();

        for player_id in [new_match.player1, new_match.player2] {
            let waiting = inner
                .entries
                .iter()
                .any(|e| e.player.id == player_id && e.queue_id == new_match.queue_id);
            if !waiting {
                return Err(LadderError::StaleWaitingEntry { player_id });
            }
        }
        inner.entries.retain(|e| {
            e.queue_id != new_match.queue_id
                || (e.player.id != new_match.player1 && e.player.id != new_match.player2)
        });

        let created = Match {
            id: inner.next_id(),
            queue_id: new_match.queue_id,
            player1: new_match.player1,
            player2: new_match.player2,
            result: MatchResult::Pending,
            tier1: new_match.tier1,
            tier2: new_match.tier2,
            rating_change1: 0,
            rating_change2: 0,
            created_at: new_match.created_at,
            decided_at: None,
        };
        inner.matches.insert(created.id, created.clone());
        Ok(created)
    }

    async fn match_by_id(&self, match_id: MatchId) -> Result<Option<Match>> {
        self.enter(None).await?;
        Ok(self.inner.lock().matches.get(&match_id).cloned())
    }

    async fn record_result(&self, resolution: &MatchResolution) -> Result<Match> {
        self.enter(Some(Fault::RecordResult)).await?;
        let mut inner = self.inner.lock();

        let current = inner
            .matches
            .get(&resolution.match_id)
            .cloned()
            .ok_or(LadderError::MatchNotFound {
                match_id: resolution.match_id,
            })?;
        if !current.result.is_pending() {
            return Err(LadderError::MatchAlreadyDecided {
                match_id: current.id,
            });
        }

        for (player_id, change) in [
            (current.player1, resolution.rating_change1),
            (current.player2, resolution.rating_change2),
        ] {
            let player_name = inner.player_name(player_id);
            let row = inner
                .ratings
                .entry((player_id, current.queue_id))
                .or_insert_with(|| PlayerRating {
                    player_id,
                    player_name,
                    queue_id: current.queue_id,
                    rating: DEFAULT_RATING,
                    wins: 0,
                    draws: 0,
                    losses: 0,
                    aborts: 0,
                    peak_rating: DEFAULT_RATING,
                });
            let t = tally(resolution, player_id);
            row.rating += change;
            row.peak_rating = row.peak_rating.max(row.rating);
            row.wins += t.wins;
            row.draws += t.draws;
            row.losses += t.losses;
            row.aborts += t.aborts;
        }

        let decided = Match {
            result: resolution.result.clone(),
            rating_change1: resolution.rating_change1,
            rating_change2: resolution.rating_change2,
            decided_at: Some(resolution.decided_at),
            ..current
        };
        inner.matches.insert(decided.id, decided.clone());
        Ok(decided)
    }

    async fn toggle_autoqueue(&self, player_id: PlayerId, queue_id: QueueId) -> Result<bool> {
        self.enter(None).await?;
        let mut inner = self.inner.lock();
        if inner.autoqueues.remove(&(player_id, queue_id)) {
            return Ok(false);
        }
        inner.autoqueues.insert((player_id, queue_id));
        Ok(true)
    }

    async fn autoqueue_players(&self, queue_id: QueueId) -> Result<Vec<PlayerId>> {
        self.enter(None).await?;
        let inner = self.inner.lock();
        Ok(inner
            .autoqueues
            .iter()
            .filter(|(_, q)| *q == queue_id)
            .map(|(p, _)| *p)
            .filter(|p| inner.players.get(p).is_some_and(|p| !p.banned))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_core::Tier;

    async fn seeded() -> (MemoryStore, Queue, Player, Player) {
        let store = MemoryStore::new();
        let queue = store
            .create_queue(&NewQueue {
                name: "Blitz".into(),
                ..NewQueue::default()
            })
            .await
            .unwrap();
        let a = store.create_player("Ada").await.unwrap();
        let b = store.create_player("Bo").await.unwrap();
        (store, queue, a, b)
    }

    fn new_match(queue: &Queue, a: &Player, b: &Player) -> NewMatch {
        NewMatch {
            queue_id: queue.id,
            player1: a.id,
            player2: b.id,
            tier1: Tier::Gold,
            tier2: Tier::Gold,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn names_are_case_insensitive() {
        let (store, _, _, _) = seeded().await;
        assert!(matches!(
            store.create_player("ADA").await,
            Err(LadderError::NameTaken { .. })
        ));
        assert!(store.queue("blitz").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finalize_requires_both_entries() {
        let (store, queue, a, b) = seeded().await;
        store
            .create_waiting_entry(a.id, queue.id, Utc::now(), EnqueueSource::Manual)
            .await
            .unwrap();

        let err = store.finalize_match(&new_match(&queue, &a, &b)).await;
        assert!(matches!(err, Err(LadderError::StaleWaitingEntry { player_id }) if player_id == b.id));
        // Nothing written: a still waits, no match exists.
        assert_eq!(store.waiting_entries(queue.id).await.unwrap().len(), 1);
        assert!(store.all_matches().is_empty());
    }

    #[tokio::test]
    async fn injected_fault_after_successes() {
        let (store, queue, _, _) = seeded().await;
        store.fail_after(Fault::Ratings, 1);
        assert!(store.ratings(queue.id).await.is_ok());
        assert!(store.ratings(queue.id).await.is_err());
        store.clear_faults();
        assert!(store.ratings(queue.id).await.is_ok());
    }

    #[tokio::test]
    async fn record_result_updates_both_rows() {
        let (store, queue, a, b) = seeded().await;
        for p in [&a, &b] {
            store
                .create_waiting_entry(p.id, queue.id, Utc::now(), EnqueueSource::Manual)
                .await
                .unwrap();
            store.ensure_rating(p.id, queue.id, DEFAULT_RATING).await.unwrap();
        }
        let m = store.finalize_match(&new_match(&queue, &a, &b)).await.unwrap();

        let decided = store
            .record_result(&MatchResolution {
                match_id: m.id,
                result: MatchResult::Winner("ada".into()),
                winner: Some(a.id),
                rating_change1: 16,
                rating_change2: -16,
                decided_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(!decided.result.is_pending());

        let ratings = store.ratings(queue.id).await.unwrap();
        assert_eq!(ratings[0].player_id, a.id);
        assert_eq!(ratings[0].rating, 1516);
        assert_eq!(ratings[0].peak_rating, 1516);
        assert_eq!(ratings[0].wins, 1);
        assert_eq!(ratings[1].rating, 1484);
        assert_eq!(ratings[1].peak_rating, 1500);
        assert_eq!(ratings[1].losses, 1);
    }
}
