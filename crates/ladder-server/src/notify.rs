//! Outbound messages: match announcements, direct player notes and admin alerts.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ladder_core::{PlayerId, Tier};

use crate::error::{LadderError, Result};
use crate::model::{MatchId, Player};

/// One side of an announced match.
#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    pub player_id: PlayerId,
    pub name: String,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchAnnouncement {
    pub match_id: MatchId,
    pub queue_name: String,
    pub player1: Seat,
    pub player2: Seat,
    /// Rolled tag for queues with the `roll_tag` instruction.
    pub tag: Option<String>,
}

impl fmt::Display for MatchAnnouncement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Match ID# `{:>6}` - Queue `{:<16}`: {} ({}) vs. {} ({})",
            self.match_id,
            self.queue_name,
            self.player1.name,
            self.player1.tier,
            self.player2.name,
            self.player2.tier,
        )?;
        if let Some(tag) = &self.tag {
            write!(f, " Tag: {}", tag)?;
        }
        Ok(())
    }
}

/// Delivery of messages to whatever chat surface fronts the ladder.
///
/// Callers treat every method as fire-and-forget: errors are logged and
/// never abort a matchmaking cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce_match(&self, announcement: &MatchAnnouncement) -> Result<()>;

    async fn notify_player(&self, player: &Player, text: &str) -> Result<()>;

    async fn alert_admin(&self, text: &str) -> Result<()>;
}

/// Writes every message to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn announce_match(&self, announcement: &MatchAnnouncement) -> Result<()> {
        tracing::info!(
            match_id = announcement.match_id,
            queue = %announcement.queue_name,
            "{}",
            announcement
        );
        Ok(())
    }

    async fn notify_player(&self, player: &Player, text: &str) -> Result<()> {
        tracing::info!(player_id = player.id, player = %player.name, "{}", text);
        Ok(())
    }

    async fn alert_admin(&self, text: &str) -> Result<()> {
        tracing::warn!(target: "ladder_server::admin", "{}", text);
        Ok(())
    }
}

/// A message captured by [`ChannelNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Match(MatchAnnouncement),
    Player { player_id: PlayerId, text: String },
    Admin(String),
}

/// Forwards every message into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification).map_err(|_| LadderError::Notify {
            reason: "receiver dropped".into(),
        })
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn announce_match(&self, announcement: &MatchAnnouncement) -> Result<()> {
        self.send(Notification::Match(announcement.clone()))
    }

    async fn notify_player(&self, player: &Player, text: &str) -> Result<()> {
        self.send(Notification::Player {
            player_id: player.id,
            text: text.to_string(),
        })
    }

    async fn alert_admin(&self, text: &str) -> Result<()> {
        self.send(Notification::Admin(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(tag: Option<&str>) -> MatchAnnouncement {
        MatchAnnouncement {
            match_id: 42,
            queue_name: "blitz".into(),
            player1: Seat {
                player_id: 1,
                name: "Ada".into(),
                tier: Tier::Diamond,
            },
            player2: Seat {
                player_id: 2,
                name: "Bo".into(),
                tier: Tier::Gold,
            },
            tag: tag.map(String::from),
        }
    }

    #[test]
    fn announcement_text() {
        assert_eq!(
            announcement(None).to_string(),
            "Match ID# `    42` - Queue `blitz           `: Ada (Diamond) vs. Bo (Gold)"
        );
        assert!(announcement(Some("90s")).to_string().ends_with(" Tag: 90s"));
    }

    #[tokio::test]
    async fn channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.alert_admin("cycle failed").await.unwrap();
        assert_eq!(rx.recv().await, Some(Notification::Admin("cycle failed".into())));

        drop(rx);
        assert!(matches!(
            notifier.alert_admin("again").await,
            Err(LadderError::Notify { .. })
        ));
    }
}
