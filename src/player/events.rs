//! Events published by the remote player handle

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::PlayerError;
use crate::model::{PlaybackState, Track};

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    StateChanged(PlaybackState),
    TrackChanged(Track),
    Error(PlayerError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    NotReady,
    StateChanged,
    TrackChanged,
    Error,
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::Ready { .. } => EventKind::Ready,
            PlayerEvent::NotReady { .. } => EventKind::NotReady,
            PlayerEvent::StateChanged(_) => EventKind::StateChanged,
            PlayerEvent::TrackChanged(_) => EventKind::TrackChanged,
            PlayerEvent::Error(_) => EventKind::Error,
        }
    }
}

pub type PlayerEventChannel = mpsc::UnboundedReceiver<PlayerEvent>;

/// Fan-out to any number of subscribers. Each subscriber receives every
/// event in publish order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PlayerEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> PlayerEventChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: PlayerEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::trace!(kind = ?event.kind(), subscribers = subscribers.len(), "Player event published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<PlayerEvent>>> {
        // A panicking subscriber never holds this lock, recover the list as-is
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event_in_order() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(PlayerEvent::Ready {
            device_id: "d1".into(),
        });
        bus.publish(PlayerEvent::StateChanged(PlaybackState::default()));

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap().kind(), EventKind::Ready);
            assert_eq!(rx.recv().await.unwrap().kind(), EventKind::StateChanged);
        }
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let bus = EventBus::default();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(PlayerEvent::Error(PlayerError::NoActiveDevice));
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }
}
