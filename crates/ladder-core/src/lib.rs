pub mod blossom;
pub mod elo;
pub mod gate;
pub mod percentile;
pub mod tier;
pub mod weight;

pub use blossom::{matched_pairs, max_weight_matching};
pub use elo::{DEFAULT_RATING, EloGains, calculate_elo_gains};
pub use gate::{Requirement, gate_open};
pub use percentile::{Standing, rank_percentiles};
pub use tier::Tier;
pub use weight::{
    GraphEdge, Incompatibility, MatchUp, PairingCandidate, PairingGraph, WeightError, build_graph,
    check_capacity,
};

/// Player identifier as stored by the persistence layer.
pub type PlayerId = i64;
