use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ladder_core::{Requirement, check_capacity};
use ladder_core::elo::DEFAULT_K;

use crate::error::{LadderError, Result};

/// Runtime settings, loaded from a JSON file and overridden by environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    pub database_url: String,
    pub listen_addr: String,
    /// Matchmaking runs when any one of these is satisfied.
    pub matchmaking_requirements: Vec<Requirement>,
    /// Positional radix of the pairing weights.
    pub max_matches: u32,
    /// A player with this many pending matches in a queue cannot enqueue there.
    pub pending_match_cap: usize,
    pub requeue_cooldown_ms: u64,
    pub enqueue_trigger_delay_ms: u64,
    pub matchmaking_interval_ms: u64,
    pub sweep_spacing_ms: u64,
    pub k_factor: f64,
    /// Pool for queues with the `roll_tag` special instruction.
    pub tags: Vec<String>,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:ladder.db?mode=rwc".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            matchmaking_requirements: vec![
                Requirement::new(12, 0),
                Requirement::new(6, 300_000),
                Requirement::new(2, 900_000),
            ],
            max_matches: 5,
            pending_match_cap: 5,
            requeue_cooldown_ms: 30_000,
            enqueue_trigger_delay_ms: 10_000,
            matchmaking_interval_ms: 60_000,
            sweep_spacing_ms: 2_000,
            k_factor: DEFAULT_K,
            tags: Vec::new(),
        }
    }
}

impl LadderConfig {
    /// Read `path` if it exists (defaults otherwise), then apply `DATABASE_URL`
    /// and `PORT` from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            LadderConfig::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.listen_addr = format!("0.0.0.0:{}", port);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pending_match_cap == 0 {
            return Err(LadderError::config("pending_match_cap must be positive"));
        }
        // A player can hold up to the cap in pending matches, so that many
        // history slots must encode with this radix.
        check_capacity(self.max_matches, self.pending_match_cap).map_err(|e| {
            LadderError::config(format!(
                "max_matches {} with pending_match_cap {}: {}",
                self.max_matches, self.pending_match_cap, e
            ))
        })?;
        if self.matchmaking_interval_ms == 0 {
            return Err(LadderError::config("matchmaking_interval_ms must be positive"));
        }
        if !(self.k_factor.is_finite() && self.k_factor > 0.0) {
            return Err(LadderError::config("k_factor must be a positive number"));
        }
        Ok(())
    }

    pub fn requeue_cooldown(&self) -> Duration {
        Duration::from_millis(self.requeue_cooldown_ms)
    }

    pub fn enqueue_trigger_delay(&self) -> Duration {
        Duration::from_millis(self.enqueue_trigger_delay_ms)
    }

    pub fn matchmaking_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking_interval_ms)
    }

    pub fn sweep_spacing(&self) -> Duration {
        Duration::from_millis(self.sweep_spacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: LadderConfig = serde_json::from_str(
            r#"{"max_matches": 7, "matchmaking_requirements": [{"min_players": 4, "min_wait_ms": 0}]}"#,
        )
        .unwrap();
        assert_eq!(config.max_matches, 7);
        assert_eq!(config.matchmaking_requirements, vec![Requirement::new(4, 0)]);
        assert_eq!(config.pending_match_cap, 5);
        assert_eq!(config.requeue_cooldown(), Duration::from_secs(30));
    }

    #[test]
    fn validate_rejects_degenerate_base() {
        let config = LadderConfig {
            max_matches: 1,
            ..LadderConfig::default()
        };
        assert!(matches!(config.validate(), Err(LadderError::Config { .. })));
        assert!(LadderConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_weights_that_cannot_be_encoded() {
        let wide = LadderConfig {
            max_matches: 200,
            ..LadderConfig::default()
        };
        assert!(matches!(wide.validate(), Err(LadderError::Config { .. })));

        let deep = LadderConfig {
            pending_match_cap: 40,
            ..LadderConfig::default()
        };
        assert!(matches!(deep.validate(), Err(LadderError::Config { .. })));

        let roomy = LadderConfig {
            max_matches: 10,
            pending_match_cap: 10,
            ..LadderConfig::default()
        };
        assert!(roomy.validate().is_ok());
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("ladder-config-{}.json", std::process::id()));
        let config = LadderConfig {
            tags: vec!["anime".into(), "90s".into()],
            ..LadderConfig::default()
        };
        config.save(&path).unwrap();
        let loaded: LadderConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
