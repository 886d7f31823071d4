use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ladder_core::{MatchUp, PlayerId, Requirement, Tier};

pub type QueueId = i64;
pub type MatchId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub banned: bool,
}

/// Extra text attached to match announcements of a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialInstructions {
    /// Append a random entry of the configured tag pool.
    RollTag,
}

impl SpecialInstructions {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecialInstructions::RollTag => "roll_tag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown special instructions: {0}")]
pub struct UnknownInstructions(pub String);

impl FromStr for SpecialInstructions {
    type Err = UnknownInstructions;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roll_tag" => Ok(SpecialInstructions::RollTag),
            other => Err(UnknownInstructions(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub name: String,
    pub expired: bool,
    /// Overrides the global matchmaking requirements when set.
    pub requirements: Option<Vec<Requirement>>,
    pub special_instructions: Option<SpecialInstructions>,
}

/// Parameters for creating a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewQueue {
    pub name: String,
    #[serde(default)]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(default)]
    pub special_instructions: Option<SpecialInstructions>,
}

/// How a waiting entry came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnqueueSource {
    Manual,
    Auto,
}

/// A player looking for a match in one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub id: i64,
    pub player: Player,
    pub queue_id: QueueId,
    pub enqueued_at: DateTime<Utc>,
    pub source: EnqueueSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub player_id: PlayerId,
    pub player_name: String,
    pub queue_id: QueueId,
    pub rating: i32,
    pub wins: i32,
    pub draws: i32,
    pub losses: i32,
    pub aborts: i32,
    pub peak_rating: i32,
}

impl PlayerRating {
    pub fn games(&self) -> i32 {
        self.wins + self.draws + self.losses
    }
}

/// Result column of a match: `PENDING`, `DRAW`, `ABORT` or the winner's
/// lowercase name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchResult {
    Pending,
    Draw,
    Abort,
    Winner(String),
}

impl MatchResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, MatchResult::Pending)
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Pending => f.write_str("PENDING"),
            MatchResult::Draw => f.write_str("DRAW"),
            MatchResult::Abort => f.write_str("ABORT"),
            MatchResult::Winner(name) => f.write_str(&name.to_lowercase()),
        }
    }
}

impl From<&str> for MatchResult {
    fn from(s: &str) -> Self {
        match s {
            "PENDING" => MatchResult::Pending,
            "DRAW" => MatchResult::Draw,
            "ABORT" => MatchResult::Abort,
            name => MatchResult::Winner(name.to_lowercase()),
        }
    }
}

impl Serialize for MatchResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MatchResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(MatchResult::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub queue_id: QueueId,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub result: MatchResult,
    pub tier1: Tier,
    pub tier2: Tier,
    pub rating_change1: i32,
    pub rating_change2: i32,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn match_up(&self) -> MatchUp {
        MatchUp::new(self.player1, self.player2)
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        self.player1 == player || self.player2 == player
    }
}

/// A freshly paired match, written by the finalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub queue_id: QueueId,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub tier1: Tier,
    pub tier2: Tier,
    pub created_at: DateTime<Utc>,
}

/// A reported result, with the rating changes already computed.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResolution {
    pub match_id: MatchId,
    pub result: MatchResult,
    pub winner: Option<PlayerId>,
    pub rating_change1: i32,
    pub rating_change2: i32,
    pub decided_at: DateTime<Utc>,
}

/// Outcome of a match as reported by a player or an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedOutcome {
    Winner(PlayerId),
    Draw,
    Abort,
}

/// One row of a queue leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub rating: i32,
    pub games: i32,
    pub percentile: f64,
    pub tier: Tier,
}

/// Millisecond timestamps as stored in the database.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_result_column_values() {
        assert_eq!(MatchResult::Pending.to_string(), "PENDING");
        assert_eq!(MatchResult::Winner("Mika".into()).to_string(), "mika");
        assert_eq!(MatchResult::from("DRAW"), MatchResult::Draw);
        assert_eq!(MatchResult::from("ABORT"), MatchResult::Abort);
        assert_eq!(MatchResult::from("mika"), MatchResult::Winner("mika".into()));
    }

    #[test]
    fn match_result_serializes_as_column_text() {
        let json = serde_json::to_string(&MatchResult::Winner("Ren".into())).unwrap();
        assert_eq!(json, "\"ren\"");
        let back: MatchResult = serde_json::from_str("\"PENDING\"").unwrap();
        assert!(back.is_pending());
    }

    #[test]
    fn special_instructions_column_values() {
        let parsed: SpecialInstructions = SpecialInstructions::RollTag.as_str().parse().unwrap();
        assert_eq!(parsed, SpecialInstructions::RollTag);
        assert_eq!(
            "reroll".parse::<SpecialInstructions>(),
            Err(UnknownInstructions("reroll".into()))
        );
        assert_eq!(
            UnknownInstructions("reroll".into()).to_string(),
            "unknown special instructions: reroll"
        );
    }

    #[test]
    fn reported_outcome_wire_format() {
        let o: ReportedOutcome = serde_json::from_str(r#"{"winner": 3}"#).unwrap();
        assert_eq!(o, ReportedOutcome::Winner(3));
        let o: ReportedOutcome = serde_json::from_str(r#""draw""#).unwrap();
        assert_eq!(o, ReportedOutcome::Draw);
    }
}
