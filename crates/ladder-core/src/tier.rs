use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Five skill buckets by rank percentile, best first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Diamond,
    Platinum,
    Gold,
    Silver,
    Bronze,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Diamond,
        Tier::Platinum,
        Tier::Gold,
        Tier::Silver,
        Tier::Bronze,
    ];

    pub fn from_percentile(percentile: f64) -> Tier {
        if percentile < 0.10 {
            Tier::Diamond
        } else if percentile < 0.25 {
            Tier::Platinum
        } else if percentile < 0.50 {
            Tier::Gold
        } else if percentile < 0.75 {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Diamond => "Diamond",
            Tier::Platinum => "Platinum",
            Tier::Gold => "Gold",
            Tier::Silver => "Silver",
            Tier::Bronze => "Bronze",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}
