//! Per-session status broadcast channel.
//!
//! Relays [`StatusEvent`]s from one running session to zero or more live
//! subscribers. Intermediate events are best-effort (a lagged receiver
//! simply drops them); the terminal event is guaranteed to reach every
//! subscriber at least once, because the most recent event is cached and
//! replayed to late subscribers before their live stream begins.

use std::sync::PoisonError;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::models::event::StatusEvent;

/// Broadcast channel for one session's status events.
///
/// The channel never mutates session state — it only relays snapshots the
/// state machine hands it. After the terminal event is published the
/// channel latches closed and rejects further events.
#[derive(Debug)]
pub struct StatusChannel {
    tx: broadcast::Sender<StatusEvent>,
    last: RwLock<Option<StatusEvent>>,
}

/// Handle returned to a subscriber: a replay of the most recent event (if
/// any) followed by the live receiver.
#[derive(Debug)]
pub struct Subscription {
    /// Most recent event at subscribe time; always the terminal event when
    /// the session has already ended.
    pub replay: Option<StatusEvent>,
    /// Live event stream.
    pub receiver: broadcast::Receiver<StatusEvent>,
}

impl StatusChannel {
    /// Create a channel buffering up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            last: RwLock::new(None),
        }
    }

    /// Publish `event` to all current subscribers and cache it for replay.
    ///
    /// Returns `false` without delivering when a terminal event has already
    /// been published — at most one terminal event ever leaves a channel,
    /// and nothing follows it.
    pub fn publish(&self, event: StatusEvent) -> bool {
        {
            let mut last = self.last.write().unwrap_or_else(PoisonError::into_inner);
            if last.as_ref().is_some_and(StatusEvent::is_terminal) {
                return false;
            }
            *last = Some(event.clone());
        }
        // No receivers is fine — generation is decoupled from observation.
        let _ = self.tx.send(event);
        true
    }

    /// Register a subscriber.
    ///
    /// The replay cache is read before attaching the live receiver, so an
    /// event published concurrently may appear in both — duplicate delivery
    /// of the terminal event is acceptable, missing it is not.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let receiver = self.tx.subscribe();
        let replay = self
            .last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Subscription { replay, receiver }
    }

    /// Most recent event published to this channel, if any.
    #[must_use]
    pub fn last_event(&self) -> Option<StatusEvent> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the terminal event has been published.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(StatusEvent::is_terminal)
    }
}
