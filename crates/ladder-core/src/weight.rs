//! Pairing graph construction.
//!
//! Every ordered pair of waiting players gets an [`Incompatibility`]: the gap
//! between their skill percentiles, bucketed into bands, and a positional
//! record of where the opponent shows up in the first player's pending and
//! recent matches. Bands always outrank history; within history, an earlier
//! slot outranks every later slot combined.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::PlayerId;
use crate::blossom::max_weight_matching;

/// Decided matches considered per player, shared with pending matches.
pub const HISTORY_WINDOW: usize = 5;

/// Highest skill band; a percentile gap of 0.5 or more.
pub const MAX_BAND: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeightError {
    #[error("weight base must be at least 2, got {0}")]
    InvalidBase(u32),

    #[error("pairing weight overflowed for a pool of {pool} players")]
    Overflow { pool: usize },

    #[error("weight base {base} cannot encode {slots} history slots")]
    Capacity { base: u32, slots: usize },
}

/// The two participants of a match, as seen by the weight builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchUp {
    pub player1: PlayerId,
    pub player2: PlayerId,
}

impl MatchUp {
    pub fn new(player1: PlayerId, player2: PlayerId) -> Self {
        Self { player1, player2 }
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        self.player1 == player || self.player2 == player
    }
}

/// A waiting player together with the history the weight builder reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingCandidate {
    pub player_id: PlayerId,
    pub percentile: f64,
    /// Pending matches in this queue, oldest first.
    pub pending: Vec<MatchUp>,
    /// Decided matches in this queue, most recent first.
    pub recent: Vec<MatchUp>,
}

/// Reasons to avoid pairing one player with another, compared by skill band
/// first and history second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incompatibility {
    pub band: u8,
    pub history: u128,
}

impl Ord for Incompatibility {
    fn cmp(&self, other: &Self) -> Ordering {
        self.band
            .cmp(&other.band)
            .then(self.history.cmp(&other.history))
    }
}

impl PartialOrd for Incompatibility {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Skill band for a percentile gap: 0 under 0.1, then one band per 0.1 up to
/// [`MAX_BAND`] at 0.5 and beyond.
pub fn skill_band(distance: f64) -> u8 {
    if distance >= 0.5 {
        5
    } else if distance >= 0.4 {
        4
    } else if distance >= 0.3 {
        3
    } else if distance >= 0.2 {
        2
    } else if distance >= 0.1 {
        1
    } else {
        0
    }
}

/// Number of history slots a candidate occupies: every pending match, padded
/// with decided matches up to [`HISTORY_WINDOW`].
pub fn history_slots(candidate: &PairingCandidate) -> usize {
    candidate.pending.len().max(HISTORY_WINDOW)
}

/// Positional history weight of `opponent` in `candidate`'s match record.
///
/// Each slot shifts the running weight by `base`, adds one if the opponent
/// played in that slot, and shifts by `base` again.
pub fn history_weight(
    candidate: &PairingCandidate,
    opponent: PlayerId,
    base: u128,
) -> Option<u128> {
    let pending = candidate.pending.len();
    let mut weight: u128 = 0;
    for slot in 0..history_slots(candidate) {
        let hit = if slot < pending {
            candidate.pending[slot].involves(opponent)
        } else {
            candidate
                .recent
                .get(slot - pending)
                .is_some_and(|m| m.involves(opponent))
        };
        weight = weight
            .checked_mul(base)?
            .checked_add(u128::from(hit))?
            .checked_mul(base)?;
    }
    Some(weight)
}

/// One undirected edge of the pairing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub a: usize,
    pub b: usize,
    pub weight: i128,
}

/// Complete graph over a waiting pool, ready for a maximum weight matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingGraph {
    /// `incompatibility[i][j]` from `i`'s point of view; the diagonal is unused.
    pub incompatibility: Vec<Vec<Incompatibility>>,
    /// History values stay strictly below this; one band step is worth at least this.
    pub span: u128,
    pub edges: Vec<GraphEdge>,
}

impl PairingGraph {
    pub fn len(&self) -> usize {
        self.incompatibility.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incompatibility.is_empty()
    }

    /// Maximum weight, maximum cardinality matching over this graph.
    pub fn solve(&self) -> Vec<Option<usize>> {
        let edges: Vec<(usize, usize, i128)> =
            self.edges.iter().map(|e| (e.a, e.b, e.weight)).collect();
        max_weight_matching(self.len(), &edges, true)
    }

    pub fn edge(&self, a: usize, b: usize) -> Option<&GraphEdge> {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        self.edges.iter().find(|e| e.a == a && e.b == b)
    }
}

fn band_term(band: u8, base: u128) -> Option<u128> {
    match band {
        0 => Some(0),
        b => base.checked_pow(2 * (u32::from(b) - 1)),
    }
}

/// `span` and the edge ceiling `(band_term(MAX_BAND) + 1) * span` for
/// `max_slots` history slots, or `None` when the ceiling leaves `i128`.
fn encoding_bounds(radix: u128, max_slots: usize) -> Option<(u128, u128)> {
    let span = radix.checked_pow(u32::try_from(2 * max_slots).ok()?)?;
    let ceiling = band_term(MAX_BAND, radix)?
        .checked_add(1)?
        .checked_mul(span)?;
    i128::try_from(ceiling).ok()?;
    Some((span, ceiling))
}

/// Check that `base` can encode graphs whose players carry up to
/// `max_pending` pending matches.
pub fn check_capacity(base: u32, max_pending: usize) -> Result<(), WeightError> {
    if base < 2 {
        return Err(WeightError::InvalidBase(base));
    }
    let slots = max_pending.max(HISTORY_WINDOW);
    encoding_bounds(u128::from(base), slots)
        .map(|_| ())
        .ok_or(WeightError::Capacity { base, slots })
}

fn scalar(inc: Incompatibility, base: u128, span: u128) -> Option<u128> {
    band_term(inc.band, base)?
        .checked_mul(span)?
        .checked_add(inc.history)
}

/// Build the pairing graph for `candidates`, using `base` as the positional
/// radix ("max matches").
///
/// Edge `(i, j)` carries `ceiling - max(w(i, j), w(j, i))`, so the least
/// objectionable pairings carry the heaviest edges.
pub fn build_graph(candidates: &[PairingCandidate], base: u32) -> Result<PairingGraph, WeightError> {
    if base < 2 {
        return Err(WeightError::InvalidBase(base));
    }
    let n = candidates.len();
    let overflow = WeightError::Overflow { pool: n };
    let radix = u128::from(base);

    let max_slots = candidates
        .iter()
        .map(history_slots)
        .max()
        .unwrap_or(HISTORY_WINDOW);
    let (span, ceiling) = encoding_bounds(radix, max_slots).ok_or_else(|| overflow.clone())?;

    let mut incompatibility = vec![vec![Incompatibility { band: 0, history: 0 }; n]; n];
    for (i, ci) in candidates.iter().enumerate() {
        for (j, cj) in candidates.iter().enumerate() {
            if i == j {
                continue;
            }
            let history = history_weight(ci, cj.player_id, radix).ok_or_else(|| overflow.clone())?;
            incompatibility[i][j] = Incompatibility {
                band: skill_band((ci.percentile - cj.percentile).abs()),
                history,
            };
        }
    }

    let mut edges = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let worst = incompatibility[i][j].max(incompatibility[j][i]);
            let cost = scalar(worst, radix, span).ok_or_else(|| overflow.clone())?;
            let weight = ceiling
                .checked_sub(cost)
                .and_then(|w| i128::try_from(w).ok())
                .ok_or_else(|| overflow.clone())?;
            edges.push(GraphEdge { a: i, b: j, weight });
        }
    }

    Ok(PairingGraph {
        incompatibility,
        span,
        edges,
    })
}
