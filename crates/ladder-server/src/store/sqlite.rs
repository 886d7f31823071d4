use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ladder_core::{DEFAULT_RATING, PlayerId, Requirement, Tier};

use super::{LadderStore, tally};
use crate::error::{LadderError, Result};
use crate::model::{
    EnqueueSource, Match, MatchId, MatchResolution, MatchResult, NewMatch, NewQueue, Player,
    PlayerRating, Queue, QueueId, SpecialInstructions, UnknownInstructions, WaitingEntry,
    from_millis,
};

/// Create all tables if they don't exist.
pub async fn init_db(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            lowercase_name TEXT UNIQUE NOT NULL,
            banned INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS queues (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            lowercase_name TEXT UNIQUE NOT NULL,
            expired INTEGER NOT NULL DEFAULT 0,
            requirements TEXT,
            special_instructions TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS waiting_entries (
            id INTEGER PRIMARY KEY,
            player_id INTEGER NOT NULL,
            queue_id INTEGER NOT NULL,
            enqueued_at INTEGER NOT NULL,
            auto INTEGER NOT NULL DEFAULT 0,
            UNIQUE (player_id, queue_id),
            FOREIGN KEY (player_id) REFERENCES players(id),
            FOREIGN KEY (queue_id) REFERENCES queues(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS player_ratings (
            player_id INTEGER NOT NULL,
            queue_id INTEGER NOT NULL,
            rating INTEGER NOT NULL DEFAULT 1500,
            wins INTEGER NOT NULL DEFAULT 0,
            draws INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            aborts INTEGER NOT NULL DEFAULT 0,
            peak_rating INTEGER NOT NULL DEFAULT 1500,
            PRIMARY KEY (player_id, queue_id),
            FOREIGN KEY (player_id) REFERENCES players(id),
            FOREIGN KEY (queue_id) REFERENCES queues(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            queue_id INTEGER NOT NULL,
            player1_id INTEGER NOT NULL,
            player2_id INTEGER NOT NULL,
            result TEXT NOT NULL DEFAULT 'PENDING',
            tier1 TEXT NOT NULL,
            tier2 TEXT NOT NULL,
            rating_change1 INTEGER NOT NULL DEFAULT 0,
            rating_change2 INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            decided_at INTEGER,
            FOREIGN KEY (queue_id) REFERENCES queues(id),
            FOREIGN KEY (player1_id) REFERENCES players(id),
            FOREIGN KEY (player2_id) REFERENCES players(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS matches_by_queue ON matches (queue_id, result)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS autoqueues (
            player_id INTEGER NOT NULL,
            queue_id INTEGER NOT NULL,
            PRIMARY KEY (player_id, queue_id),
            FOREIGN KEY (player_id) REFERENCES players(id),
            FOREIGN KEY (queue_id) REFERENCES queues(id)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

const MATCH_COLUMNS: &str = "id, queue_id, player1_id, player2_id, result, tier1, tier2, \
     rating_change1, rating_change2, created_at, decided_at";

const ENTRY_SELECT: &str = "SELECT w.id, w.player_id, w.queue_id, w.enqueued_at, w.auto, \
     p.name, p.banned FROM waiting_entries w JOIN players p ON p.id = w.player_id";

/// [`LadderStore`] backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>> {
    from_millis(ms).ok_or_else(|| LadderError::Corrupt {
        reason: format!("timestamp out of range: {}", ms).into(),
    })
}

fn tier(raw: &str) -> Result<Tier> {
    raw.parse().map_err(|e: ladder_core::tier::UnknownTier| LadderError::Corrupt {
        reason: e.to_string().into(),
    })
}

fn player_from_row(r: &SqliteRow) -> Player {
    Player {
        id: r.get("id"),
        name: r.get("name"),
        banned: r.get::<i64, _>("banned") != 0,
    }
}

fn queue_from_row(r: &SqliteRow) -> Result<Queue> {
    let requirements = r
        .get::<Option<String>, _>("requirements")
        .map(|raw| serde_json::from_str::<Vec<Requirement>>(&raw))
        .transpose()?;
    let special_instructions = r
        .get::<Option<String>, _>("special_instructions")
        .map(|raw| {
            raw.parse::<SpecialInstructions>()
                .map_err(|e: UnknownInstructions| LadderError::Corrupt {
                    reason: e.to_string().into(),
                })
        })
        .transpose()?;

    Ok(Queue {
        id: r.get("id"),
        name: r.get("name"),
        expired: r.get::<i64, _>("expired") != 0,
        requirements,
        special_instructions,
    })
}

fn entry_from_row(r: &SqliteRow) -> Result<WaitingEntry> {
    Ok(WaitingEntry {
        id: r.get("id"),
        player: Player {
            id: r.get("player_id"),
            name: r.get("name"),
            banned: r.get::<i64, _>("banned") != 0,
        },
        queue_id: r.get("queue_id"),
        enqueued_at: timestamp(r.get("enqueued_at"))?,
        source: if r.get::<i64, _>("auto") != 0 {
            EnqueueSource::Auto
        } else {
            EnqueueSource::Manual
        },
    })
}

fn rating_from_row(r: &SqliteRow) -> PlayerRating {
    PlayerRating {
        player_id: r.get("player_id"),
        player_name: r.get("name"),
        queue_id: r.get("queue_id"),
        rating: r.get("rating"),
        wins: r.get("wins"),
        draws: r.get("draws"),
        losses: r.get("losses"),
        aborts: r.get("aborts"),
        peak_rating: r.get("peak_rating"),
    }
}

fn match_from_row(r: &SqliteRow) -> Result<Match> {
    Ok(Match {
        id: r.get("id"),
        queue_id: r.get("queue_id"),
        player1: r.get("player1_id"),
        player2: r.get("player2_id"),
        result: MatchResult::from(r.get::<String, _>("result").as_str()),
        tier1: tier(&r.get::<String, _>("tier1"))?,
        tier2: tier(&r.get::<String, _>("tier2"))?,
        rating_change1: r.get("rating_change1"),
        rating_change2: r.get("rating_change2"),
        created_at: timestamp(r.get("created_at"))?,
        decided_at: r
            .get::<Option<i64>, _>("decided_at")
            .map(timestamp)
            .transpose()?,
    })
}

#[async_trait]
impl LadderStore for SqliteStore {
    async fn create_player(&self, name: &str) -> Result<Player> {
        let inserted = sqlx::query("INSERT INTO players (name, lowercase_name) VALUES (?1, ?2)")
            .bind(name)
            .bind(name.to_lowercase())
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(done) => Ok(Player {
                id: done.last_insert_rowid(),
                name: name.to_string(),
                banned: false,
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(LadderError::NameTaken {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn player(&self, player_id: PlayerId) -> Result<Option<Player>> {
        let row = sqlx::query("SELECT id, name, banned FROM players WHERE id = ?1")
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(player_from_row))
    }

    async fn set_banned(&self, player_id: PlayerId, banned: bool) -> Result<()> {
        let done = sqlx::query("UPDATE players SET banned = ?1 WHERE id = ?2")
            .bind(banned as i64)
            .bind(player_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(LadderError::PlayerNotFound { player_id });
        }
        Ok(())
    }

    async fn create_queue(&self, queue: &NewQueue) -> Result<Queue> {
        let requirements = queue
            .requirements
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let done = sqlx::query(
            "INSERT INTO queues (name, lowercase_name, requirements, special_instructions)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&queue.name)
        .bind(queue.name.to_lowercase())
        .bind(requirements)
        .bind(queue.special_instructions.map(|s| s.as_str()))
        .execute(&self.pool)
        .await;

        match done {
            Ok(done) => Ok(Queue {
                id: done.last_insert_rowid(),
                name: queue.name.clone(),
                expired: false,
                requirements: queue.requirements.clone(),
                special_instructions: queue.special_instructions,
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(LadderError::NameTaken {
                name: queue.name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn queue(&self, name: &str) -> Result<Option<Queue>> {
        let row = sqlx::query(
            "SELECT id, name, expired, requirements, special_instructions
             FROM queues WHERE lowercase_name = ?1",
        )
        .bind(name.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(queue_from_row).transpose()
    }

    async fn active_queues(&self) -> Result<Vec<Queue>> {
        let rows = sqlx::query(
            "SELECT id, name, expired, requirements, special_instructions
             FROM queues WHERE expired = 0 ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(queue_from_row).collect()
    }

    async fn set_queue_expired(&self, queue_id: QueueId, expired: bool) -> Result<()> {
        sqlx::query("UPDATE queues SET expired = ?1 WHERE id = ?2")
            .bind(expired as i64)
            .bind(queue_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn waiting_entries(&self, queue_id: QueueId) -> Result<Vec<WaitingEntry>> {
        let rows = sqlx::query(&format!(
            "{} WHERE w.queue_id = ?1 ORDER BY w.enqueued_at ASC, w.id ASC",
            ENTRY_SELECT
        ))
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn waiting_entry(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
    ) -> Result<Option<WaitingEntry>> {
        let row = sqlx::query(&format!(
            "{} WHERE w.player_id = ?1 AND w.queue_id = ?2",
            ENTRY_SELECT
        ))
        .bind(player_id)
        .bind(queue_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn create_waiting_entry(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        at: DateTime<Utc>,
        source: EnqueueSource,
    ) -> Result<Option<WaitingEntry>> {
        let done = sqlx::query(
            "INSERT INTO waiting_entries (player_id, queue_id, enqueued_at, auto)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (player_id, queue_id) DO NOTHING",
        )
        .bind(player_id)
        .bind(queue_id)
        .bind(millis(at))
        .bind((source == EnqueueSource::Auto) as i64)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Ok(None);
        }
        self.waiting_entry(player_id, queue_id).await
    }

    async fn delete_waiting_entry(&self, player_id: PlayerId, queue_id: QueueId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM waiting_entries WHERE player_id = ?1 AND queue_id = ?2")
            .bind(player_id)
            .bind(queue_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn touch_waiting_entry(&self, entry_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE waiting_entries SET enqueued_at = ?1 WHERE id = ?2")
            .bind(millis(at))
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_rating(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        default_rating: i32,
    ) -> Result<bool> {
        let done = sqlx::query(
            "INSERT INTO player_ratings (player_id, queue_id, rating, peak_rating)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (player_id, queue_id) DO NOTHING",
        )
        .bind(player_id)
        .bind(queue_id)
        .bind(default_rating)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn rating(&self, player_id: PlayerId, queue_id: QueueId) -> Result<Option<PlayerRating>> {
        let row = sqlx::query(
            "SELECT r.player_id, p.name, r.queue_id, r.rating, r.wins, r.draws, r.losses,
                    r.aborts, r.peak_rating
             FROM player_ratings r JOIN players p ON p.id = r.player_id
             WHERE r.player_id = ?1 AND r.queue_id = ?2",
        )
        .bind(player_id)
        .bind(queue_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(rating_from_row))
    }

    async fn ratings(&self, queue_id: QueueId) -> Result<Vec<PlayerRating>> {
        let rows = sqlx::query(
            "SELECT r.player_id, p.name, r.queue_id, r.rating, r.wins, r.draws, r.losses,
                    r.aborts, r.peak_rating
             FROM player_ratings r JOIN players p ON p.id = r.player_id
             WHERE r.queue_id = ?1 AND p.banned = 0
             ORDER BY r.rating DESC, r.player_id ASC",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(rating_from_row).collect())
    }

    async fn recent_decided_matches(
        &self,
        player_id: PlayerId,
        queue_id: QueueId,
        limit: usize,
    ) -> Result<Vec<Match>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM matches
             WHERE queue_id = ?1 AND (player1_id = ?2 OR player2_id = ?2) AND result != 'PENDING'
             ORDER BY decided_at DESC, id DESC LIMIT ?3",
            MATCH_COLUMNS
        ))
        .bind(queue_id)
        .bind(player_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn pending_matches(&self, player_id: PlayerId, queue_id: QueueId) -> Result<Vec<Match>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM matches
             WHERE queue_id = ?1 AND (player1_id = ?2 OR player2_id = ?2) AND result = 'PENDING'
             ORDER BY created_at ASC, id ASC",
            MATCH_COLUMNS
        ))
        .bind(queue_id)
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn count_pending_matches(&self, player_id: PlayerId, queue_id: QueueId) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM matches
             WHERE queue_id = ?1 AND (player1_id = ?2 OR player2_id = ?2) AND result = 'PENDING'",
        )
        .bind(queue_id)
        .bind(player_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn finalize_match(&self, new_match: &NewMatch) -> Result<Match> {
        let mut tx = self.pool.begin().await?;

        for player_id in [new_match.player1, new_match.player2] {
            let done =
                sqlx::query("DELETE FROM waiting_entries WHERE player_id = ?1 AND queue_id = ?2")
                    .bind(player_id)
                    .bind(new_match.queue_id)
                    .execute(&mut *tx)
                    .await?;
            if done.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(LadderError::StaleWaitingEntry { player_id });
            }
        }

        let done = sqlx::query(
            "INSERT INTO matches (queue_id, player1_id, player2_id, result, tier1, tier2, created_at)
             VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5, ?6)",
        )
        .bind(new_match.queue_id)
        .bind(new_match.player1)
        .bind(new_match.player2)
        .bind(new_match.tier1.label())
        .bind(new_match.tier2.label())
        .bind(millis(new_match.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Match {
            id: done.last_insert_rowid(),
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
        })
    }

    async fn match_by_id(&self, match_id: MatchId) -> Result<Option<Match>> {
        let row = sqlx::query(&format!("SELECT {} FROM matches WHERE id = ?1", MATCH_COLUMNS))
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn record_result(&self, resolution: &MatchResolution) -> Result<Match> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {} FROM matches WHERE id = ?1", MATCH_COLUMNS))
            .bind(resolution.match_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(LadderError::MatchNotFound {
                match_id: resolution.match_id,
            });
        };
        let mut decided = match_from_row(&row)?;
        if !decided.result.is_pending() {
            return Err(LadderError::MatchAlreadyDecided {
                match_id: decided.id,
            });
        }

        sqlx::query(
            "UPDATE matches SET result = ?1, rating_change1 = ?2, rating_change2 = ?3, decided_at = ?4
             WHERE id = ?5",
        )
        .bind(resolution.result.to_string())
        .bind(resolution.rating_change1)
        .bind(resolution.rating_change2)
        .bind(millis(resolution.decided_at))
        .bind(decided.id)
        .execute(&mut *tx)
        .await?;

        for (player_id, change) in [
            (decided.player1, resolution.rating_change1),
            (decided.player2, resolution.rating_change2),
        ] {
            sqlx::query(
                "INSERT INTO player_ratings (player_id, queue_id, rating, peak_rating)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (player_id, queue_id) DO NOTHING",
            )
            .bind(player_id)
            .bind(decided.queue_id)
            .bind(DEFAULT_RATING)
            .execute(&mut *tx)
            .await?;

            let t = tally(resolution, player_id);
            sqlx::query(
                "UPDATE player_ratings SET rating = rating + ?1, wins = wins + ?2,
                    draws = draws + ?3, losses = losses + ?4, aborts = aborts + ?5,
                    peak_rating = MAX(peak_rating, rating + ?1)
                 WHERE player_id = ?6 AND queue_id = ?7",
            )
            .bind(change)
            .bind(t.wins)
            .bind(t.draws)
            .bind(t.losses)
            .bind(t.aborts)
            .bind(player_id)
            .bind(decided.queue_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        decided.result = resolution.result.clone();
        decided.rating_change1 = resolution.rating_change1;
        decided.rating_change2 = resolution.rating_change2;
        decided.decided_at = Some(resolution.decided_at);
        Ok(decided)
    }

    async fn toggle_autoqueue(&self, player_id: PlayerId, queue_id: QueueId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM autoqueues WHERE player_id = ?1 AND queue_id = ?2")
            .bind(player_id)
            .bind(queue_id)
            .execute(&self.pool)
            .await?;
        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query("INSERT INTO autoqueues (player_id, queue_id) VALUES (?1, ?2)")
            .bind(player_id)
            .bind(queue_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn autoqueue_players(&self, queue_id: QueueId) -> Result<Vec<PlayerId>> {
        let rows = sqlx::query(
            "SELECT a.player_id FROM autoqueues a JOIN players p ON p.id = a.player_id
             WHERE a.queue_id = ?1 AND p.banned = 0 ORDER BY a.player_id ASC",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("player_id")).collect())
    }
}
