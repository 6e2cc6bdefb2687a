//! Per-match change fan-out.
//!
//! Every match gets its own broadcast channel, created on first subscription
//! and dropped as soon as the last [`MatchSubscription`] goes away. Delivery is
//! best effort: a subscriber that falls behind is told to resync instead of
//! being handed a partial history.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::MatchStatus,
    state::{game_record::GameRecord, projector::MatchProjection},
};

/// Change published for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    /// A game record was written.
    GameChanged {
        /// Record as stored after the write.
        record: GameRecord,
    },
    /// The match row counters or status moved.
    MatchChanged {
        /// Status after the change.
        status: MatchStatus,
        /// Projection the row was refreshed from.
        projection: MatchProjection,
    },
    /// A lineup was stored or locked.
    LineupChanged {
        /// Team whose lineup changed.
        team_id: Uuid,
        /// Lock flag after the change.
        locked: bool,
    },
    /// Storage entered or left degraded mode.
    StorageStatus {
        /// Degraded flag after the change.
        degraded: bool,
    },
}

/// What a subscriber receives when pulling from its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Next change, in publish order for this subscriber.
    Event(MatchEvent),
    /// Events were dropped; the subscriber must refetch the whole match.
    Resync {
        /// Number of events skipped.
        missed: u64,
    },
}

/// Registry of live per-match channels.
pub struct SyncHub {
    channels: DashMap<Uuid, broadcast::Sender<MatchEvent>>,
    capacity: usize,
}

impl SyncHub {
    /// Create a hub whose per-match channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a subscription on `match_id`. The caller owns the handle and must
    /// drop or [`close`](MatchSubscription::close) it when leaving the match.
    pub fn subscribe(self: &Arc<Self>, match_id: Uuid) -> MatchSubscription {
        let receiver = self
            .channels
            .entry(match_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        debug!(match_id = %match_id, "match subscription opened");
        MatchSubscription {
            match_id,
            hub: Arc::clone(self),
            receiver: Some(receiver),
        }
    }

    /// Publish `event` to every subscriber of `match_id`, returning how many
    /// handles received it. Matches nobody watches are skipped.
    pub fn publish(&self, match_id: Uuid, event: MatchEvent) -> usize {
        match self.channels.get(&match_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Publish `event` on every open match channel.
    pub fn publish_all(&self, event: MatchEvent) {
        for sender in self.channels.iter() {
            let _ = sender.send(event.clone());
        }
    }

    /// Open handles on `match_id`.
    pub fn subscriber_count(&self, match_id: Uuid) -> usize {
        self.channels
            .get(&match_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Matches with at least one open channel.
    pub fn active_matches(&self) -> usize {
        self.channels.len()
    }

    fn release(&self, match_id: Uuid) {
        let removed = self
            .channels
            .remove_if(&match_id, |_, sender| sender.receiver_count() == 0)
            .is_some();
        if removed {
            debug!(match_id = %match_id, "last subscription closed; channel released");
        }
    }
}

/// Caller-owned subscription to one match.
pub struct MatchSubscription {
    match_id: Uuid,
    hub: Arc<SyncHub>,
    receiver: Option<broadcast::Receiver<MatchEvent>>,
}

impl MatchSubscription {
    /// Match this handle listens to.
    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// Wait for the next message. `None` once the handle is closed.
    pub async fn next(&mut self) -> Option<SyncMessage> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv().await {
            Ok(event) => Some(SyncMessage::Event(event)),
            Err(RecvError::Lagged(missed)) => Some(SyncMessage::Resync { missed }),
            Err(RecvError::Closed) => None,
        }
    }

    /// Unsubscribe now rather than at drop.
    pub fn close(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.receiver.take().is_some() {
            self.hub.release(self.match_id);
        }
    }
}

impl Drop for MatchSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
