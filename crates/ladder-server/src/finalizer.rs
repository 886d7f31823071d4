use chrono::Utc;

use ladder_core::Tier;

use crate::error::Result;
use crate::model::{Match, NewMatch, Queue, SpecialInstructions, WaitingEntry};
use crate::notify::{MatchAnnouncement, Notifier, Seat};
use crate::store::LadderStore;

/// A paired player with the percentile they were ranked at this cycle.
#[derive(Debug, Clone, Copy)]
pub struct Seated<'a> {
    pub entry: &'a WaitingEntry,
    pub percentile: f64,
}

impl Seated<'_> {
    fn tier(&self) -> Tier {
        Tier::from_percentile(self.percentile)
    }

    fn seat(&self) -> Seat {
        Seat {
            player_id: self.entry.player.id,
            name: self.entry.player.name.clone(),
            tier: self.tier(),
        }
    }
}

/// Pick a random tag from the pool.
pub fn roll_tag(tags: &[String]) -> Option<String> {
    use rand::RngExt;
    if tags.is_empty() {
        return None;
    }
    let mut rng = rand::rng();
    let idx = rng.random_range(0..tags.len());
    Some(tags[idx].clone())
}

/// Turns solved pairs into persisted matches and announces them.
pub struct Finalizer<'a> {
    pub store: &'a dyn LadderStore,
    pub notifier: &'a dyn Notifier,
    pub tags: &'a [String],
}

impl Finalizer<'_> {
    /// Persist one pair. The store call is all-or-nothing: on error both
    /// players are still waiting. Announcement failures are only logged.
    pub async fn finalize(
        &self,
        queue: &Queue,
        first: Seated<'_>,
        second: Seated<'_>,
    ) -> Result<Match> {
        let created = self
            .store
            .finalize_match(&NewMatch {
                queue_id: queue.id,
                player1: first.entry.player.id,
                player2: second.entry.player.id,
                tier1: first.tier(),
                tier2: second.tier(),
                created_at: Utc::now(),
            })
            .await?;

        let tag = match queue.special_instructions {
            Some(SpecialInstructions::RollTag) => roll_tag(self.tags),
            None => None,
        };
        let announcement = MatchAnnouncement {
            match_id: created.id,
            queue_name: queue.name.clone(),
            player1: first.seat(),
            player2: second.seat(),
            tag,
        };

        if let Err(e) = self.notifier.announce_match(&announcement).await {
            tracing::warn!(
                queue = %queue.name,
                match_id = created.id,
                error = %e,
                "match announcement failed"
            );
        }

        tracing::info!(
            queue = %queue.name,
            match_id = created.id,
            player1 = first.entry.player.id,
            player2 = second.entry.player.id,
            tier1 = %created.tier1,
            tier2 = %created.tier2,
            "match created"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnqueueSource, NewQueue};
    use crate::notify::{ChannelNotifier, Notification};
    use crate::store::{Fault, MemoryStore};

    async fn two_waiting(
        store: &MemoryStore,
        instructions: Option<SpecialInstructions>,
    ) -> (Queue, Vec<WaitingEntry>) {
        let queue = store
            .create_queue(&NewQueue {
                name: "Chill".into(),
                requirements: None,
                special_instructions: instructions,
            })
            .await
            .unwrap();
        let mut entries = Vec::new();
        for name in ["Ada", "Bo"] {
            let p = store.create_player(name).await.unwrap();
            let e = store
                .create_waiting_entry(p.id, queue.id, Utc::now(), EnqueueSource::Manual)
                .await
                .unwrap()
                .unwrap();
            entries.push(e);
        }
        (queue, entries)
    }

    #[test]
    fn roll_tag_from_pool() {
        assert_eq!(roll_tag(&[]), None);
        let tags = vec!["anime".to_string(), "90s".to_string()];
        for _ in 0..20 {
            let tag = roll_tag(&tags).unwrap();
            assert!(tags.contains(&tag));
        }
    }

    #[tokio::test]
    async fn finalize_creates_match_and_announces() {
        let store = MemoryStore::new();
        let (notifier, mut rx) = ChannelNotifier::new();
        let tags = vec!["anime".to_string()];
        let (queue, entries) = two_waiting(&store, Some(SpecialInstructions::RollTag)).await;

        let finalizer = Finalizer {
            store: &store,
            notifier: &notifier,
            tags: &tags,
        };
        let created = finalizer
            .finalize(
                &queue,
                Seated {
                    entry: &entries[0],
                    percentile: 0.0,
                },
                Seated {
                    entry: &entries[1],
                    percentile: 0.5,
                },
            )
            .await
            .unwrap();

        assert_eq!(created.tier1, Tier::Diamond);
        assert_eq!(created.tier2, Tier::Silver);
        assert!(store.waiting_entries(queue.id).await.unwrap().is_empty());

        match rx.recv().await {
            Some(Notification::Match(a)) => {
                assert_eq!(a.match_id, created.id);
                assert_eq!(a.tag.as_deref(), Some("anime"));
            }
            other => panic!("expected announcement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_finalize_leaves_both_waiting() {
        let store = MemoryStore::new();
        let (notifier, mut rx) = ChannelNotifier::new();
        let (queue, entries) = two_waiting(&store, None).await;
        store.fail_on(Fault::FinalizeMatch);

        let finalizer = Finalizer {
            store: &store,
            notifier: &notifier,
            tags: &[],
        };
        let result = finalizer
            .finalize(
                &queue,
                Seated {
                    entry: &entries[0],
                    percentile: 0.0,
                },
                Seated {
                    entry: &entries[1],
                    percentile: 0.5,
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.waiting_entries(queue.id).await.unwrap().len(), 2);
        assert!(rx.try_recv().is_err());
    }
}
