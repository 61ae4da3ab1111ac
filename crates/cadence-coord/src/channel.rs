//! Broadcast signal channel with no backlog.
//!
//! [`BroadcastChannel::publish`] delivers a clone of the message to every
//! listener subscribed at that moment. A listener that subscribes later
//! never sees earlier messages. Use it for liveness signals and phase
//! commands only; anything that must arrive exactly once goes through a
//! [`VersionedQueue`](crate::VersionedQueue) or the durable store.

use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Callback invoked synchronously on every publish, before delivery.
pub type PublishObserver<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A named fan-out channel.
pub struct BroadcastChannel<T> {
    name: String,
    subscribers: Mutex<Vec<Sender<T>>>,
    observer: Option<PublishObserver<T>>,
}

impl<T: Clone + Send> BroadcastChannel<T> {
    /// Create a channel with no subscribers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Mutex::new(Vec::new()),
            observer: None,
        }
    }

    /// Create a channel that reports every published message to `observer`
    /// before delivering it. Used to audit publish order against other
    /// side effects.
    pub fn with_observer(name: impl Into<String>, observer: PublishObserver<T>) -> Self {
        Self {
            observer: Some(observer),
            ..Self::new(name)
        }
    }

    /// The channel's name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start listening. Only messages published from now on are received.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .expect("broadcast subscriber list poisoned")
            .push(tx);
        Subscription { rx }
    }

    /// Deliver `msg` to every current subscriber.
    ///
    /// Subscribers whose [`Subscription`] was dropped are pruned. Returns
    /// the number of listeners the message reached.
    pub fn publish(&self, msg: T) -> usize {
        if let Some(observer) = &self.observer {
            observer(&msg);
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("broadcast subscriber list poisoned");
        subscribers.retain(|tx| tx.send(msg.clone()).is_ok());
        subscribers.len()
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("broadcast subscriber list poisoned")
            .len()
    }
}

/// One listener's view of a [`BroadcastChannel`].
///
/// Iterating blocks until the next message arrives. Dropping the
/// subscription unsubscribes it on the channel's next publish.
pub struct Subscription<T> {
    rx: Receiver<T>,
}

impl<T> Subscription<T> {
    /// Block until a message arrives. Returns `None` only if the channel
    /// itself was dropped.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Block for at most `timeout`. Returns `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, ChannelClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelClosed),
        }
    }

    /// Take a message if one is already waiting.
    pub fn try_recv(&self) -> Result<Option<T>, ChannelClosed> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelClosed),
        }
    }
}

impl<T> Iterator for Subscription<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.recv()
    }
}

/// The channel a [`Subscription`] listened to no longer exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelClosed;

impl std::fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "broadcast channel closed")
    }
}

impl std::error::Error for ChannelClosed {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn every_subscriber_receives_each_message() {
        let ch = BroadcastChannel::new("runner");
        let a = ch.subscribe();
        let b = ch.subscribe();
        assert_eq!(ch.publish(1u32), 2);
        assert_eq!(a.try_recv(), Ok(Some(1)));
        assert_eq!(b.try_recv(), Ok(Some(1)));
    }

    #[test]
    fn late_subscriber_sees_no_backlog() {
        let ch = BroadcastChannel::new("runner");
        ch.publish("run");
        let late = ch.subscribe();
        assert_eq!(late.try_recv(), Ok(None));
        ch.publish("again");
        assert_eq!(late.try_recv(), Ok(Some("again")));
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let ch = BroadcastChannel::new("runner");
        let keep = ch.subscribe();
        drop(ch.subscribe());
        assert_eq!(ch.subscriber_count(), 2);
        assert_eq!(ch.publish(()), 1);
        assert_eq!(ch.subscriber_count(), 1);
        drop(keep);
    }

    #[test]
    fn recv_timeout_returns_none_when_idle() {
        let ch: BroadcastChannel<u8> = BroadcastChannel::new("idle");
        let sub = ch.subscribe();
        assert_eq!(sub.recv_timeout(Duration::from_millis(5)), Ok(None));
    }

    #[test]
    fn observer_sees_publish_before_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let ch = BroadcastChannel::with_observer(
            "processor",
            Box::new(move |m: &u32| log.lock().unwrap().push(*m)),
        );
        ch.publish(3);
        ch.publish(4);
        assert_eq!(*seen.lock().unwrap(), vec![3, 4]);
    }

    #[test]
    fn messages_arrive_in_publish_order() {
        let ch = BroadcastChannel::new("order");
        let sub = ch.subscribe();
        for i in 0..100 {
            ch.publish(i);
        }
        let got: Vec<i32> = (0..100).filter_map(|_| sub.try_recv().unwrap()).collect();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
    }
}
