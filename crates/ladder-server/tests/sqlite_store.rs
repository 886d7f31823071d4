use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use ladder_core::{Requirement, Tier};
use ladder_server::error::LadderError;
use ladder_server::model::{
    EnqueueSource, MatchResolution, MatchResult, NewMatch, NewQueue, SpecialInstructions,
};
use ladder_server::store::{LadderStore, SqliteStore, init_db};

async fn store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_db(&pool).await.unwrap();
    SqliteStore::new(pool)
}

#[tokio::test]
async fn init_is_idempotent() {
    let store = store().await;
    init_db(store.pool()).await.unwrap();
}

#[tokio::test]
async fn players_and_queues() {
    let store = store().await;
    let ada = store.create_player("Ada").await.unwrap();
    assert!(matches!(
        store.create_player("ADA").await,
        Err(LadderError::NameTaken { .. })
    ));
    assert_eq!(store.player(ada.id).await.unwrap(), Some(ada.clone()));

    let queue = store
        .create_queue(&NewQueue {
            name: "Themed".into(),
            requirements: Some(vec![Requirement::new(4, 1_000)]),
            special_instructions: Some(SpecialInstructions::RollTag),
        })
        .await
        .unwrap();
    let loaded = store.queue("themed").await.unwrap().unwrap();
    assert_eq!(loaded, queue);
    assert_eq!(loaded.requirements, Some(vec![Requirement::new(4, 1_000)]));

    store.set_queue_expired(queue.id, true).await.unwrap();
    assert!(store.active_queues().await.unwrap().is_empty());
}

#[tokio::test]
async fn waiting_entries_are_unique_and_ordered() {
    let store = store().await;
    let queue = store
        .create_queue(&NewQueue {
            name: "Blitz".into(),
            ..NewQueue::default()
        })
        .await
        .unwrap();
    let ada = store.create_player("ada").await.unwrap();
    let bo = store.create_player("bo").await.unwrap();
    let now = Utc::now();

    store
        .create_waiting_entry(bo.id, queue.id, now, EnqueueSource::Auto)
        .await
        .unwrap()
        .unwrap();
    let first = store
        .create_waiting_entry(ada.id, queue.id, now - Duration::seconds(30), EnqueueSource::Manual)
        .await
        .unwrap()
        .unwrap();
    assert!(
        store
            .create_waiting_entry(ada.id, queue.id, now, EnqueueSource::Manual)
            .await
            .unwrap()
            .is_none()
    );

    let entries = store.waiting_entries(queue.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].player.id, ada.id);
    assert_eq!(entries[1].source, EnqueueSource::Auto);
    assert_eq!(
        entries[0].enqueued_at.timestamp_millis(),
        first.enqueued_at.timestamp_millis()
    );

    store
        .touch_waiting_entry(first.id, now + Duration::seconds(5))
        .await
        .unwrap();
    let entries = store.waiting_entries(queue.id).await.unwrap();
    assert_eq!(entries[1].player.id, ada.id);

    assert!(store.delete_waiting_entry(bo.id, queue.id).await.unwrap());
    assert!(!store.delete_waiting_entry(bo.id, queue.id).await.unwrap());
}

#[tokio::test]
async fn match_lifecycle() {
    let store = store().await;
    let queue = store
        .create_queue(&NewQueue {
            name: "Blitz".into(),
            ..NewQueue::default()
        })
        .await
        .unwrap();
    let ada = store.create_player("Ada").await.unwrap();
    let bo = store.create_player("Bo").await.unwrap();
    for p in [&ada, &bo] {
        store
            .create_waiting_entry(p.id, queue.id, Utc::now(), EnqueueSource::Manual)
            .await
            .unwrap();
        assert!(store.ensure_rating(p.id, queue.id, 1500).await.unwrap());
        assert!(!store.ensure_rating(p.id, queue.id, 1500).await.unwrap());
    }

    let new_match = NewMatch {
        queue_id: queue.id,
        player1: ada.id,
        player2: bo.id,
        tier1: Tier::Platinum,
        tier2: Tier::Bronze,
        created_at: Utc::now(),
    };
    let created = store.finalize_match(&new_match).await.unwrap();
    assert!(store.waiting_entries(queue.id).await.unwrap().is_empty());
    assert_eq!(store.count_pending_matches(ada.id, queue.id).await.unwrap(), 1);
    assert_eq!(store.pending_matches(bo.id, queue.id).await.unwrap()[0].id, created.id);

    // Both entries are gone now, so a second finalization writes nothing.
    assert!(matches!(
        store.finalize_match(&new_match).await,
        Err(LadderError::StaleWaitingEntry { .. })
    ));
    assert_eq!(store.count_pending_matches(ada.id, queue.id).await.unwrap(), 1);

    let decided = store
        .record_result(&MatchResolution {
            match_id: created.id,
            result: MatchResult::Winner("bo".into()),
            winner: Some(bo.id),
            rating_change1: -20,
            rating_change2: 20,
            decided_at: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(decided.result, MatchResult::Winner("bo".into()));

    let loaded = store.match_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.tier1, Tier::Platinum);
    assert_eq!(loaded.rating_change2, 20);
    assert!(loaded.decided_at.is_some());

    let ratings = store.ratings(queue.id).await.unwrap();
    assert_eq!(ratings[0].player_id, bo.id);
    assert_eq!(ratings[0].rating, 1520);
    assert_eq!(ratings[0].peak_rating, 1520);
    assert_eq!(ratings[0].wins, 1);
    assert_eq!(ratings[1].rating, 1480);
    assert_eq!(ratings[1].peak_rating, 1500);
    assert_eq!(ratings[1].losses, 1);

    let recent = store
        .recent_decided_matches(ada.id, queue.id, 5)
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert!(store.pending_matches(ada.id, queue.id).await.unwrap().is_empty());

    assert!(matches!(
        store
            .record_result(&MatchResolution {
                match_id: created.id,
                result: MatchResult::Draw,
                winner: None,
                rating_change1: 0,
                rating_change2: 0,
                decided_at: Utc::now(),
            })
            .await,
        Err(LadderError::MatchAlreadyDecided { .. })
    ));
}

#[tokio::test]
async fn banned_players_leave_the_table() {
    let store = store().await;
    let queue = store
        .create_queue(&NewQueue {
            name: "Blitz".into(),
            ..NewQueue::default()
        })
        .await
        .unwrap();
    let ada = store.create_player("ada").await.unwrap();
    let bo = store.create_player("bo").await.unwrap();
    store.ensure_rating(ada.id, queue.id, 1500).await.unwrap();
    store.ensure_rating(bo.id, queue.id, 1500).await.unwrap();

    store.set_banned(bo.id, true).await.unwrap();
    let ratings = store.ratings(queue.id).await.unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].player_id, ada.id);
    assert!(store.rating(bo.id, queue.id).await.unwrap().is_some());
}

#[tokio::test]
async fn autoqueue_toggle() {
    let store = store().await;
    let queue = store
        .create_queue(&NewQueue {
            name: "Blitz".into(),
            ..NewQueue::default()
        })
        .await
        .unwrap();
    let ada = store.create_player("ada").await.unwrap();

    assert!(store.toggle_autoqueue(ada.id, queue.id).await.unwrap());
    assert_eq!(store.autoqueue_players(queue.id).await.unwrap(), vec![ada.id]);
    assert!(!store.toggle_autoqueue(ada.id, queue.id).await.unwrap());
    assert!(store.autoqueue_players(queue.id).await.unwrap().is_empty());
}
