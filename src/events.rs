//! Event bus fanning lifecycle and log events out to many consumers.
//!
//! ```text
//! Publishers (many):                      Subscribers (many):
//!   InstanceHandle ──┐                   ┌──► Subscription (cap 256)
//!   Manager        ──┼─► command queue ──┼──► Subscription (cap 256)
//!   ...            ──┘   (one worker)    └──► ...
//! ```
//!
//! One worker task owns the subscriber table. `subscribe`, `unsubscribe`
//! and `publish` only enqueue a command for it, so they never block and the
//! table is never iterated while another caller mutates it.
//!
//! - **Drop on full**: a publish does a `try_send` per subscriber; a full
//!   buffer loses that event for that subscriber only.
//! - **Per-subscriber FIFO**: delivered events keep publish order.
//! - **No history**: a subscription sees only events published after it.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::config::stream::Event;

pub const SUBSCRIPTION_CAPACITY: usize = 256;

enum Command {
    Subscribe { id: u64, tx: mpsc::Sender<Event> },
    Unsubscribe(u64),
    Publish(Event),
}

/// Cloneable handle to the bus worker.
#[derive(Clone, Debug)]
pub struct Bus {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates the bus and spawns its worker.
    ///
    /// Must be called from inside a tokio runtime. The worker lives until every
    /// `Bus` clone and `Subscription` is dropped.
    pub fn new() -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.commands.send(Command::Publish(event));
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(SUBSCRIPTION_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let _ = self.commands.send(Command::Subscribe { id, tx });
        Subscription {
            id,
            rx,
            commands: self.commands.clone(),
            released: false,
        }
    }

    /// Same as [`Subscription::unsubscribe`].
    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.unsubscribe();
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut subscribers: HashMap<u64, mpsc::Sender<Event>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe { id, tx } => {
                subscribers.insert(id, tx);
            }
            Command::Unsubscribe(id) => {
                subscribers.remove(&id);
            }
            Command::Publish(event) => {
                subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        trace!(subscriber = id, kind = %event.kind, "subscriber full, dropping event");
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

/// A consumer's bounded view of the bus.
///
/// Release it with [`unsubscribe`](Self::unsubscribe); dropping it releases
/// it too, so every exit path of a consumer gives the buffer back.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    commands: mpsc::UnboundedSender<Command>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the subscription is released.
    pub async fn recv(&mut self) -> Option<Event> {
        if self.released {
            return None;
        }
        self.rx.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.released {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Deregisters the subscription and closes its channel. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.rx.close();
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::config::stream::{EventKind, EventPayload, StreamLine};

    fn numbered(n: usize) -> Event {
        Event::log("srv", StreamLine::stdout(n.to_string()))
    }

    fn number_of(event: &Event) -> usize {
        match &event.data {
            Some(EventPayload::Log(line)) => line.line.parse().unwrap(),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    async fn next(sub: &mut Subscription) -> Event {
        timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn every_subscriber_gets_one_copy() {
        let bus = Bus::new();
        let mut subs: Vec<_> = (0..8).map(|_| bus.subscribe()).collect();

        bus.publish(Event::new(EventKind::Started, "a"));
        bus.publish(numbered(1));

        for sub in &mut subs {
            assert!(next(sub).await.is(EventKind::Started, "a"));
            assert_eq!(number_of(&next(sub).await), 1);
            assert!(sub.try_recv().is_none());
        }
    }

    #[tokio::test]
    async fn subscriber_sees_only_later_events() {
        let bus = Bus::new();
        bus.publish(numbered(0));
        let mut sub = bus.subscribe();
        bus.publish(numbered(1));
        assert_eq!(number_of(&next(&mut sub).await), 1);
    }

    #[tokio::test]
    async fn full_subscriber_drops_without_blocking_others() {
        let bus = Bus::new();
        let mut stalled = bus.subscribe_with_capacity(1);
        let mut reader = bus.subscribe_with_capacity(16);

        for n in 1..=3 {
            bus.publish(numbered(n));
        }
        for n in 1..=3 {
            assert_eq!(number_of(&next(&mut reader).await), n);
        }
        // The worker has finished every earlier publish once this arrives.
        bus.publish(numbered(4));
        assert_eq!(number_of(&next(&mut reader).await), 4);

        let mut seen = Vec::new();
        while let Some(event) = stalled.try_recv() {
            seen.push(number_of(&event));
        }
        assert_eq!(seen.first(), Some(&1));
        assert!(!seen.contains(&2));
        assert!(!seen.contains(&3));
    }

    #[tokio::test]
    async fn publish_returns_with_stalled_subscribers() {
        let bus = Bus::new();
        let _stalled: Vec<_> = (0..32).map(|_| bus.subscribe_with_capacity(1)).collect();

        let burst = async {
            for n in 0..10_000 {
                bus.publish(numbered(n));
            }
        };
        timeout(Duration::from_secs(2), burst)
            .await
            .expect("publish blocked");
    }

    #[tokio::test]
    async fn unsubscribed_channel_ends_instead_of_blocking() {
        let bus = Bus::new();
        let mut sub = bus.subscribe();
        bus.unsubscribe(&mut sub);
        bus.publish(numbered(1));

        let read = timeout(Duration::from_secs(1), sub.recv()).await;
        assert_eq!(read.expect("recv blocked after unsubscribe"), None);

        sub.unsubscribe();
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn subscription_ids_are_unique() {
        let bus = Bus::new();
        let a = bus.subscribe();
        let b = bus.clone().subscribe();
        assert_ne!(a.id(), b.id());
    }
}
