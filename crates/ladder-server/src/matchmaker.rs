//! Per-queue matchmaking cycles and the player-facing operations around them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use ladder_core::weight::HISTORY_WINDOW;
use ladder_core::{
    DEFAULT_RATING, GraphEdge, PairingCandidate, PlayerId, Requirement, Tier, build_graph,
    calculate_elo_gains, gate_open, matched_pairs, rank_percentiles,
};

use crate::config::LadderConfig;
use crate::error::{LadderError, Result};
use crate::finalizer::{Finalizer, Seated};
use crate::lock::LockRegistry;
use crate::model::{
    EnqueueSource, LeaderboardRow, Match, MatchId, MatchResolution, MatchResult, Queue,
    ReportedOutcome, WaitingEntry,
};
use crate::notify::Notifier;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::store::LadderStore;

const ODD_POOL_NOTICE: &str = "There were an odd number of players in the queue during this \
     round of matchmaking, and we were unable to find you a match. You are still in the queue \
     and will be matched with an opponent soon.";

/// Step of a matchmaking cycle, reported when the cycle aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadPool,
    EnsureRatings,
    Rollover,
    Rank,
    History,
    Weights,
    Solve,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::LoadPool => "load_pool",
            Phase::EnsureRatings => "ensure_ratings",
            Phase::Rollover => "rollover",
            Phase::Rank => "rank",
            Phase::History => "history",
            Phase::Weights => "weights",
            Phase::Solve => "solve",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// How a call to [`Matchmaker::run_matchmaking`] ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Another run holds the queue's lock.
    Busy,
    NoQueue,
    Empty,
    GateClosed,
    Matched {
        matches: Vec<Match>,
        /// Odd player rolled over to the next cycle.
        held_over: Option<PlayerId>,
    },
    /// A collaborator failed. Matches finalized before the failure stand.
    Aborted { phase: Phase, finalized: Vec<Match> },
}

impl RunOutcome {
    /// Matches this run created.
    pub fn matches(&self) -> &[Match] {
        match self {
            RunOutcome::Matched { matches, .. } => matches,
            RunOutcome::Aborted { finalized, .. } => finalized,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued,
    /// A manual enqueue of a waiting player takes them out again.
    Unqueued,
    AlreadyQueued,
    PendingCapReached { pending: usize },
}

/// The weighted graph of the most recent cycle that got that far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub queue: String,
    /// Vertex `i` of `edges` is `players[i]`.
    pub players: Vec<PlayerId>,
    pub edges: Vec<GraphEdge>,
    pub built_at: DateTime<Utc>,
}

#[derive(Default)]
struct Progress {
    phase: Option<Phase>,
    finalized: Vec<Match>,
}

impl Progress {
    fn enter(&mut self, phase: Phase) {
        self.phase = Some(phase);
    }
}

pub struct Matchmaker {
    store: Arc<dyn LadderStore>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn Scheduler>,
    locks: LockRegistry,
    config: RwLock<LadderConfig>,
    last_graph: Mutex<Option<GraphSnapshot>>,
}

impl Matchmaker {
    pub fn new(
        store: Arc<dyn LadderStore>,
        notifier: Arc<dyn Notifier>,
        scheduler: Arc<dyn Scheduler>,
        config: LadderConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            scheduler,
            locks: LockRegistry::new(),
            config: RwLock::new(config),
            last_graph: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn LadderStore> {
        &self.store
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn config(&self) -> LadderConfig {
        self.config.read().clone()
    }

    // ── Matchmaking cycle ───────────────────────────────────────────────

    /// Run one matchmaking cycle for `queue_name`.
    ///
    /// Never fails: errors are logged, reported to the admin channel and
    /// turned into [`RunOutcome::Aborted`]. The queue lock is released on
    /// every exit path.
    pub async fn run_matchmaking(&self, queue_name: &str) -> RunOutcome {
        let span = tracing::info_span!("matchmaking", queue = %queue_name);
        async move {
            let Some(_guard) = self.locks.try_acquire(queue_name) else {
                tracing::info!("matchmaker already running, trigger dropped");
                return RunOutcome::Busy;
            };

            let mut progress = Progress::default();
            let outcome = match self.cycle(queue_name, &mut progress).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let phase = progress.phase.unwrap_or(Phase::LoadPool);
                    tracing::error!(queue = %queue_name, phase = %phase, error = %e, "matchmaking aborted");
                    let alert = format!(
                        "Matchmaking for `{}` aborted during {}: {}",
                        queue_name, phase, e
                    );
                    if let Err(e) = self.notifier.alert_admin(&alert).await {
                        tracing::warn!(error = %e, "admin alert failed");
                    }
                    RunOutcome::Aborted {
                        phase,
                        finalized: progress.finalized,
                    }
                }
            };

            if !outcome.matches().is_empty() {
                let cooldown = self.config.read().requeue_cooldown();
                self.scheduler.schedule(
                    cooldown,
                    ScheduledTask::Requeue {
                        queue: queue_name.to_string(),
                    },
                );
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn cycle(&self, queue_name: &str, progress: &mut Progress) -> Result<RunOutcome> {
        let config = self.config();

        progress.enter(Phase::LoadPool);
        let Some(queue) = self.store.queue(queue_name).await? else {
            tracing::debug!("no such queue");
            return Ok(RunOutcome::NoQueue);
        };
        let mut pool: Vec<WaitingEntry> = self
            .store
            .waiting_entries(queue.id)
            .await?
            .into_iter()
            .filter(|e| !e.player.banned)
            .collect();
        let Some(oldest) = pool.first() else {
            tracing::debug!("no players waiting");
            return Ok(RunOutcome::Empty);
        };

        let waited = (Utc::now() - oldest.enqueued_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let requirements = queue
            .requirements
            .as_deref()
            .unwrap_or(&config.matchmaking_requirements);
        if !gate_open(requirements, pool.len(), waited, queue.expired) {
            tracing::debug!(
                pool = pool.len(),
                ?waited,
                expired = queue.expired,
                "matchmaking conditions not met"
            );
            return Ok(RunOutcome::GateClosed);
        }

        progress.enter(Phase::EnsureRatings);
        for entry in &pool {
            if self
                .store
                .ensure_rating(entry.player.id, queue.id, DEFAULT_RATING)
                .await?
            {
                tracing::debug!(player_id = entry.player.id, "created rating for new player");
            }
        }

        progress.enter(Phase::Rollover);
        let held_over = if pool.len() % 2 == 1 { pool.pop() } else { None };
        if let Some(entry) = &held_over {
            self.store.touch_waiting_entry(entry.id, Utc::now()).await?;
            if let Err(e) = self
                .notifier
                .notify_player(&entry.player, ODD_POOL_NOTICE)
                .await
            {
                tracing::warn!(player_id = entry.player.id, error = %e, "rollover notice failed");
            }
            tracing::info!(player_id = entry.player.id, "odd pool, player held over");
        }
        let held_over = held_over.map(|e| e.player.id);
        if pool.is_empty() {
            return Ok(RunOutcome::Matched {
                matches: Vec::new(),
                held_over,
            });
        }

        progress.enter(Phase::Rank);
        let table: Vec<(PlayerId, i32)> = self
            .store
            .ratings(queue.id)
            .await?
            .iter()
            .map(|r| (r.player_id, r.rating))
            .collect();
        let standings: HashMap<PlayerId, f64> = rank_percentiles(&table)
            .into_iter()
            .map(|s| (s.player_id, s.percentile))
            .collect();
        let percentiles = pool
            .iter()
            .map(|e| {
                standings
                    .get(&e.player.id)
                    .copied()
                    .ok_or_else(|| LadderError::MissingRating {
                        player_id: e.player.id,
                        queue: queue.name.clone(),
                    })
            })
            .collect::<Result<Vec<f64>>>()?;

        progress.enter(Phase::History);
        let mut candidates = Vec::with_capacity(pool.len());
        for (entry, &percentile) in pool.iter().zip(&percentiles) {
            let recent = self
                .store
                .recent_decided_matches(entry.player.id, queue.id, HISTORY_WINDOW)
                .await?;
            let pending = self.store.pending_matches(entry.player.id, queue.id).await?;
            candidates.push(PairingCandidate {
                player_id: entry.player.id,
                percentile,
                pending: pending.iter().map(Match::match_up).collect(),
                recent: recent.iter().map(Match::match_up).collect(),
            });
        }

        progress.enter(Phase::Weights);
        let graph = build_graph(&candidates, config.max_matches)?;
        *self.last_graph.lock() = Some(GraphSnapshot {
            queue: queue.name.clone(),
            players: pool.iter().map(|e| e.player.id).collect(),
            edges: graph.edges.clone(),
            built_at: Utc::now(),
        });

        progress.enter(Phase::Solve);
        let mate = graph.solve();
        if let Some(i) = mate.iter().position(Option::is_none) {
            return Err(LadderError::UnmatchedPlayer {
                player_id: pool[i].player.id,
            });
        }

        progress.enter(Phase::Finalize);
        let finalizer = Finalizer {
            store: self.store.as_ref(),
            notifier: self.notifier.as_ref(),
            tags: &config.tags,
        };
        for (i, j) in matched_pairs(&mate) {
            let created = finalizer
                .finalize(
                    &queue,
                    Seated {
                        entry: &pool[i],
                        percentile: percentiles[i],
                    },
                    Seated {
                        entry: &pool[j],
                        percentile: percentiles[j],
                    },
                )
                .await?;
            progress.finalized.push(created);
        }

        tracing::info!(matches = progress.finalized.len(), "matchmaking finished");
        Ok(RunOutcome::Matched {
            matches: std::mem::take(&mut progress.finalized),
            held_over,
        })
    }

    /// Run every active queue in turn, pausing between queues.
    pub async fn sweep(&self) -> Vec<(String, RunOutcome)> {
        let queues = match self.store.active_queues().await {
            Ok(queues) => queues,
            Err(e) => {
                tracing::error!(error = %e, "sweep could not list queues");
                return Vec::new();
            }
        };
        let spacing = self.config.read().sweep_spacing();

        let mut outcomes = Vec::with_capacity(queues.len());
        for (i, queue) in queues.into_iter().enumerate() {
            if i > 0 && !spacing.is_zero() {
                tokio::time::sleep(spacing).await;
            }
            let outcome = self.run_matchmaking(&queue.name).await;
            outcomes.push((queue.name, outcome));
        }
        outcomes
    }

    /// Execute a task handed over by the scheduler.
    pub async fn dispatch(&self, task: ScheduledTask) {
        match task {
            ScheduledTask::Matchmake { queue } => {
                self.run_matchmaking(&queue).await;
            }
            ScheduledTask::Requeue { queue } => {
                if let Err(e) = self.requeue_autoqueue(&queue).await {
                    tracing::error!(queue = %queue, error = %e, "autoqueue requeue failed");
                }
            }
        }
    }

    // ── Queue membership ────────────────────────────────────────────────

    async fn open_queue(&self, queue_name: &str) -> Result<Queue> {
        let queue = self
            .store
            .queue(queue_name)
            .await?
            .ok_or_else(|| LadderError::QueueNotFound {
                name: queue_name.to_string(),
            })?;
        if queue.expired {
            return Err(LadderError::QueueExpired { name: queue.name });
        }
        Ok(queue)
    }

    /// Put a player into a queue's waiting pool, or take them out again when
    /// a manual request finds them already waiting.
    pub async fn enqueue(
        &self,
        player_id: PlayerId,
        queue_name: &str,
        source: EnqueueSource,
    ) -> Result<EnqueueOutcome> {
        let queue = self.open_queue(queue_name).await?;
        self.store
            .player(player_id)
            .await?
            .ok_or(LadderError::PlayerNotFound { player_id })?;

        let (cap, delay) = {
            let config = self.config.read();
            (config.pending_match_cap, config.enqueue_trigger_delay())
        };
        let pending = self.store.count_pending_matches(player_id, queue.id).await?;
        if pending >= cap {
            return Ok(EnqueueOutcome::PendingCapReached { pending });
        }

        if self.store.waiting_entry(player_id, queue.id).await?.is_some() {
            return match source {
                EnqueueSource::Manual => {
                    self.store.delete_waiting_entry(player_id, queue.id).await?;
                    tracing::info!(player_id, queue = %queue.name, "player unqueued");
                    Ok(EnqueueOutcome::Unqueued)
                }
                EnqueueSource::Auto => Ok(EnqueueOutcome::AlreadyQueued),
            };
        }

        if self
            .store
            .create_waiting_entry(player_id, queue.id, Utc::now(), source)
            .await?
            .is_none()
        {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        tracing::info!(player_id, queue = %queue.name, ?source, "player queued");

        self.scheduler
            .schedule(delay, ScheduledTask::Matchmake { queue: queue.name });
        Ok(EnqueueOutcome::Queued)
    }

    /// Flip a player's autoqueue opt-in for a queue. Returns the new state.
    pub async fn toggle_autoqueue(&self, player_id: PlayerId, queue_name: &str) -> Result<bool> {
        let queue = self.open_queue(queue_name).await?;
        self.store
            .player(player_id)
            .await?
            .ok_or(LadderError::PlayerNotFound { player_id })?;
        let enabled = self.store.toggle_autoqueue(player_id, queue.id).await?;
        tracing::info!(player_id, queue = %queue.name, enabled, "autoqueue toggled");
        Ok(enabled)
    }

    /// Enqueue every autoqueue player of a queue. A failure for one player
    /// is logged and does not stop the others.
    pub async fn requeue_autoqueue(
        &self,
        queue_name: &str,
    ) -> Result<Vec<(PlayerId, EnqueueOutcome)>> {
        let queue = self.open_queue(queue_name).await?;
        let players = self.store.autoqueue_players(queue.id).await?;

        let mut outcomes = Vec::with_capacity(players.len());
        for player_id in players {
            match self
                .enqueue(player_id, &queue.name, EnqueueSource::Auto)
                .await
            {
                Ok(outcome) => outcomes.push((player_id, outcome)),
                Err(e) => {
                    tracing::warn!(player_id, queue = %queue.name, error = %e, "autoqueue skipped")
                }
            }
        }
        Ok(outcomes)
    }

    // ── Results and standings ───────────────────────────────────────────

    /// Decide a pending match and apply the rating changes.
    pub async fn report_result(&self, match_id: MatchId, outcome: ReportedOutcome) -> Result<Match> {
        let current = self
            .store
            .match_by_id(match_id)
            .await?
            .ok_or(LadderError::MatchNotFound { match_id })?;
        if !current.result.is_pending() {
            return Err(LadderError::MatchAlreadyDecided { match_id });
        }

        let rating_of = |row: Option<crate::model::PlayerRating>| {
            row.map(|r| r.rating).unwrap_or(DEFAULT_RATING)
        };
        let r1 = rating_of(self.store.rating(current.player1, current.queue_id).await?);
        let r2 = rating_of(self.store.rating(current.player2, current.queue_id).await?);
        let k = self.config.read().k_factor;
        let g1 = calculate_elo_gains(r1, r2, k);
        let g2 = calculate_elo_gains(r2, r1, k);

        let (result, winner, change1, change2) = match outcome {
            ReportedOutcome::Winner(player_id) => {
                if !current.involves(player_id) {
                    return Err(LadderError::NotAParticipant {
                        match_id,
                        player_id,
                    });
                }
                let winner = self
                    .store
                    .player(player_id)
                    .await?
                    .ok_or(LadderError::PlayerNotFound { player_id })?;
                let (c1, c2) = if player_id == current.player1 {
                    (g1.win, g2.loss)
                } else {
                    (g1.loss, g2.win)
                };
                (
                    MatchResult::Winner(winner.name.to_lowercase()),
                    Some(player_id),
                    c1,
                    c2,
                )
            }
            ReportedOutcome::Draw => (MatchResult::Draw, None, g1.draw, g2.draw),
            ReportedOutcome::Abort => (MatchResult::Abort, None, 0, 0),
        };

        let decided = self
            .store
            .record_result(&MatchResolution {
                match_id,
                result,
                winner,
                rating_change1: change1,
                rating_change2: change2,
                decided_at: Utc::now(),
            })
            .await?;
        tracing::info!(
            match_id,
            result = %decided.result,
            change1,
            change2,
            "match decided"
        );
        Ok(decided)
    }

    /// Leaderboard of a queue: every rated, non-banned player, best first.
    pub async fn standings(&self, queue_name: &str) -> Result<Vec<LeaderboardRow>> {
        let queue = self
            .store
            .queue(queue_name)
            .await?
            .ok_or_else(|| LadderError::QueueNotFound {
                name: queue_name.to_string(),
            })?;
        let ratings = self.store.ratings(queue.id).await?;
        let by_player: HashMap<PlayerId, &crate::model::PlayerRating> =
            ratings.iter().map(|r| (r.player_id, r)).collect();
        let table: Vec<(PlayerId, i32)> = ratings.iter().map(|r| (r.player_id, r.rating)).collect();

        Ok(rank_percentiles(&table)
            .into_iter()
            .filter_map(|s| {
                let row = by_player.get(&s.player_id)?;
                Some(LeaderboardRow {
                    rank: s.rank,
                    player_id: s.player_id,
                    name: row.player_name.clone(),
                    rating: s.rating,
                    games: row.games(),
                    percentile: s.percentile,
                    tier: Tier::from_percentile(s.percentile),
                })
            })
            .collect())
    }

    // ── Admin ───────────────────────────────────────────────────────────

    /// Force-release every queue lock. Returns how many were held.
    pub fn clear_locks(&self) -> usize {
        let cleared = self.locks.clear_all();
        tracing::warn!(cleared, "matchmaker locks force-cleared");
        cleared
    }

    pub fn last_graph(&self) -> Option<GraphSnapshot> {
        self.last_graph.lock().clone()
    }

    /// Replace the global matchmaking requirements.
    pub fn set_requirements(&self, requirements: Vec<Requirement>) -> LadderConfig {
        let mut config = self.config.write();
        config.matchmaking_requirements = requirements;
        tracing::info!(requirements = ?config.matchmaking_requirements, "matchmaking requirements updated");
        config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names() {
        assert_eq!(Phase::LoadPool.to_string(), "load_pool");
        assert_eq!(
            serde_json::to_string(&Phase::EnsureRatings).unwrap(),
            "\"ensure_ratings\""
        );
    }

    #[test]
    fn outcome_wire_format() {
        let json = serde_json::to_value(RunOutcome::GateClosed).unwrap();
        assert_eq!(json["outcome"], "gate_closed");

        let json = serde_json::to_value(EnqueueOutcome::PendingCapReached { pending: 5 }).unwrap();
        assert_eq!(json["status"], "pending_cap_reached");
        assert_eq!(json["pending"], 5);
    }

    #[test]
    fn busy_run_created_nothing() {
        assert!(RunOutcome::Busy.matches().is_empty());
    }
}
