pub mod config;
pub mod error;
pub mod finalizer;
pub mod lock;
pub mod matchmaker;
pub mod model;
pub mod notify;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;

use crate::config::LadderConfig;
use crate::error::Result;
use crate::matchmaker::Matchmaker;
use crate::notify::{LogNotifier, Notifier};
use crate::scheduler::TokioScheduler;
use crate::state::AppState;
use crate::store::{LadderStore, SqliteStore, init_db};

/// Build a fully configured Router + shared state backed by SQLite.
pub async fn build_app(
    config: LadderConfig,
    config_path: Option<PathBuf>,
) -> Result<(Router, Arc<AppState>)> {
    let mut options = SqlitePoolOptions::new().max_connections(5);
    if config.database_url.contains(":memory:") {
        // Every connection to an in-memory database gets its own database.
        options = options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = options.connect(&config.database_url).await?;
    init_db(&pool).await?;

    Ok(build_app_with(
        Arc::new(SqliteStore::new(pool)),
        Arc::new(LogNotifier),
        config,
        config_path,
    ))
}

/// Build the Router over the given collaborators. Spawns the scheduled task
/// dispatcher and the periodic sweep, so it must run inside a tokio runtime.
pub fn build_app_with(
    store: Arc<dyn LadderStore>,
    notifier: Arc<dyn Notifier>,
    config: LadderConfig,
    config_path: Option<PathBuf>,
) -> (Router, Arc<AppState>) {
    let interval = config.matchmaking_interval();
    let (scheduler, mut tasks) = TokioScheduler::new();
    let matchmaker = Arc::new(Matchmaker::new(
        store,
        notifier,
        Arc::new(scheduler),
        config,
    ));

    {
        let matchmaker = matchmaker.clone();
        tokio::spawn(async move {
            while let Some(task) = tasks.recv().await {
                tracing::debug!(%task, "running scheduled task");
                let matchmaker = matchmaker.clone();
                tokio::spawn(async move { matchmaker.dispatch(task).await });
            }
        });
    }

    {
        let matchmaker = matchmaker.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                matchmaker.sweep().await;
            }
        });
    }

    let state = Arc::new(AppState {
        matchmaker,
        config_path,
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/players", post(routes::create_player))
        .route("/queues", post(routes::create_queue))
        .route("/queues/{name}/enqueue", post(routes::enqueue))
        .route("/queues/{name}/autoqueue", post(routes::toggle_autoqueue))
        .route("/queues/{name}/matchmake", post(routes::matchmake))
        .route("/queues/{name}/leaderboard", get(routes::leaderboard))
        .route("/matches/{id}/result", post(routes::report_result))
        .route("/admin/clearlocks", post(routes::clear_locks))
        .route("/admin/lastmatchmake", get(routes::last_matchmake))
        .route("/admin/requirements", put(routes::set_requirements))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}
