// File: blockbot-core/src/eventbus.rs
//!
//! In-process event bus with guaranteed delivery to multiple subscribers
//! via bounded MPSC queues. The dashboard push channel hangs off this:
//! each WebSocket client is one subscriber.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};

use blockbot_common::models::{BotStats, ChatLogEntry};

/// Events the bot publishes process-wide.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// Fresh stats snapshot from the status broadcaster.
    Stats(BotStats),
    /// Full chat ring snapshot, newest first.
    ChatLog(Vec<ChatLogEntry>),
    /// Free-form system notice.
    SystemMessage(String),
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>`.
///
/// - If a subscriber's buffer fills, `publish` awaits until there is
///   space (backpressure).
/// - Subscribers that dropped their receiver are pruned on the next
///   publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

const DEFAULT_BUFFER_SIZE: usize = 256;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers, dropping dead ones.
    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut any_closed = false;
        for s in senders {
            if s.send(event.clone()).await.is_err() {
                any_closed = true;
            }
        }
        if any_closed {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, sleep, timeout};

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish(BotEvent::SystemMessage("hello".into())).await;

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.expect("subscriber should get event") {
                BotEvent::SystemMessage(text) => assert_eq!(text, "hello"),
                other => panic!("wrong event type: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn backpressure_blocks_until_read() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await;

        // Fill the queue.
        bus.publish(BotEvent::SystemMessage("msg1".into())).await;

        // Reader drains after a short delay.
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.expect("expected first message");
            let second = rx.recv().await.expect("expected second message");
            (first, second)
        });

        // This publish must wait for space, then succeed.
        let second_publish = bus.publish(BotEvent::SystemMessage("msg2".into()));
        let result = timeout(Duration::from_millis(500), second_publish).await;
        assert!(result.is_ok(), "publish should eventually unblock");

        let (evt1, evt2) = handle.await.unwrap();
        match (evt1, evt2) {
            (BotEvent::SystemMessage(a), BotEvent::SystemMessage(b)) => {
                assert_eq!(a, "msg1");
                assert_eq!(b, "msg2");
            }
            other => panic!("wrong events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dead_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(1)).await;
        let _rx2 = bus.subscribe(Some(1)).await;
        assert_eq!(bus.subscriber_count().await, 2);

        drop(rx);
        bus.publish(BotEvent::SystemMessage("ping".into())).await;
        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn shutdown_flag_is_observable() {
        let bus = EventBus::new();
        assert!(!bus.is_shutdown());
        bus.shutdown();
        assert!(bus.is_shutdown());
    }
}
