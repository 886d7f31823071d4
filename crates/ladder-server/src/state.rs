use std::path::PathBuf;
use std::sync::Arc;

use crate::matchmaker::Matchmaker;

/// Shared application state.
pub struct AppState {
    pub matchmaker: Arc<Matchmaker>,
    /// Where admin changes to the configuration are written back, if anywhere.
    pub config_path: Option<PathBuf>,
}
