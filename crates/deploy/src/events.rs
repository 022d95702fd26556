//! Broadcast of deploy events to any number of subscribers.
//!
//! Each subscriber owns an unbounded queue, so a slow reader only grows its
//! own backlog: publishing never blocks and never drops or reorders events
//! for the others. Subscribers that hung up are pruned on the next publish.
//!
//! Running operations publish through a [`WeakEventBus`], so the stream
//! closes as soon as the owning bus is dropped, even while a detached
//! transport worker is still winding down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::types::DeployEvent;

type Subscribers = Mutex<Vec<mpsc::UnboundedSender<DeployEvent>>>;

/// Registry of event subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
}

/// Publishing handle that does not keep subscribers alive.
#[derive(Clone, Default)]
pub struct WeakEventBus {
    subscribers: Weak<Subscribers>,
}

impl WeakEventBus {
    /// Delivers `event` if the owning bus still exists.
    pub fn publish(&self, event: DeployEvent) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock(&subscribers).retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Events published from now on are delivered
    /// in emission order; earlier ones are not replayed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeployEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber.
    pub fn publish(&self, event: DeployEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<DeployEvent>>> {
        lock(&self.subscribers)
    }
}

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<DeployEvent>>> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Milestone, StatusEvent};
    use uuid::Uuid;

    fn status(message: &str) -> DeployEvent {
        DeployEvent::Status(StatusEvent {
            operation: Uuid::nil(),
            milestone: Milestone::Started,
            message: message.into(),
        })
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(status("nobody listens"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn each_subscriber_gets_every_event_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        for i in 0..50 {
            bus.publish(status(&i.to_string()));
        }
        drop(bus);

        for rx in [&mut a, &mut b] {
            let mut seen = Vec::new();
            while let Some(DeployEvent::Status(s)) = rx.recv().await {
                seen.push(s.message.parse::<u32>().unwrap());
            }
            assert_eq!(seen, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn slow_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let _slow = bus.subscribe(); // never drained
        let mut fast = bus.subscribe();

        for i in 0..1000 {
            bus.publish(status(&i.to_string()));
        }

        let mut count = 0;
        while fast.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);

        bus.publish(status("prune"));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn weak_handle_publishes_until_bus_dropped() {
        let bus = EventBus::new();
        let weak = bus.downgrade();
        let mut rx = bus.subscribe();

        weak.publish(status("live"));
        drop(bus);
        weak.publish(status("after drop"));

        match rx.recv().await {
            Some(DeployEvent::Status(s)) => assert_eq!(s.message, "live"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish(status("early"));
        let mut rx = bus.subscribe();
        bus.publish(status("late"));

        match rx.try_recv().unwrap() {
            DeployEvent::Status(s) => assert_eq!(s.message, "late"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
