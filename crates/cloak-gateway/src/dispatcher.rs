use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use cloak_types::events::{ChangeKind, GatewayEvent, Topic};

/// The notification bus. Writers publish "something changed under this
/// topic" signals; readers either hold a raw receiver (gateway connections)
/// or register a callback with [`Dispatcher::subscribe`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every event goes through one broadcast channel; receivers filter by topic
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Live callback subscriptions
    active: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// A raw receiver over every event. Used by gateway connections, which
    /// do their own per-connection topic filtering.
    pub fn receiver(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to every receiver. Having no receivers is fine.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Announce a change under `topic`.
    pub fn publish(&self, topic: Topic, kind: ChangeKind) {
        trace!(%topic, ?kind, "publish");
        self.broadcast(GatewayEvent::Changed { topic, kind });
    }

    /// Run `on_change` for every change published under `topic` until the
    /// returned [`Subscription`] is dropped or passed to [`unsubscribe`].
    ///
    /// Delivery is a bare signal: the callback re-fetches whatever it shows.
    /// If the subscriber falls behind the bus it is called once for the
    /// missed batch. Must be called from within a Tokio runtime.
    ///
    /// [`unsubscribe`]: Dispatcher::unsubscribe
    pub fn subscribe<F>(&self, topic: Topic, on_change: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        // Receiver is created before returning so nothing published after
        // this call can be missed.
        let mut rx = self.inner.broadcast_tx.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = rx.recv() => match result {
                        Ok(event) => {
                            if event.topic() == Some(topic) && !token.is_cancelled() {
                                on_change();
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(%topic, "Subscriber lagged by {} events, forcing refresh", n);
                            if !token.is_cancelled() {
                                on_change();
                            }
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        self.inner.active.fetch_add(1, Ordering::AcqRel);
        Subscription {
            cancel,
            dispatcher: self.inner.clone(),
        }
    }

    /// Cancel a subscription. Equivalent to dropping it.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Number of callback subscriptions that have not been cancelled.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }
}

/// Handle for a live callback subscription. Dropping it cancels the
/// subscription and releases the callback.
pub struct Subscription {
    cancel: CancellationToken,
    dispatcher: Arc<DispatcherInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.dispatcher.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn recorder() -> (impl Fn() + Send + Sync + 'static, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move || { let _ = tx.send(()); }, rx)
    }

    async fn fired(rx: &mut mpsc::UnboundedReceiver<()>) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv()).await,
            Ok(Some(()))
        )
    }

    #[tokio::test]
    async fn callback_fires_only_for_its_topic() {
        let dispatcher = Dispatcher::new();
        let group = Topic::Group(Uuid::new_v4());
        let (on_change, mut rx) = recorder();
        let _sub = dispatcher.subscribe(group, on_change);

        dispatcher.publish(Topic::Statuses, ChangeKind::Insert);
        dispatcher.publish(Topic::Group(Uuid::new_v4()), ChangeKind::Insert);
        assert!(!fired(&mut rx).await);

        dispatcher.publish(group, ChangeKind::Insert);
        assert!(fired(&mut rx).await);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let (on_change, mut rx) = recorder();
        let sub = dispatcher.subscribe(Topic::Statuses, on_change);
        assert_eq!(dispatcher.active_subscriptions(), 1);

        dispatcher.unsubscribe(sub);
        assert_eq!(dispatcher.active_subscriptions(), 0);

        dispatcher.publish(Topic::Statuses, ChangeKind::Delete);
        assert!(!fired(&mut rx).await);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let dispatcher = Dispatcher::new();
        {
            let (on_change, _rx) = recorder();
            let _sub = dispatcher.subscribe(Topic::Statuses, on_change);
            assert_eq!(dispatcher.active_subscriptions(), 1);
        }
        assert_eq!(dispatcher.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn raw_receivers_see_global_events() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.receiver();
        let user_id = Uuid::new_v4();
        dispatcher.broadcast(GatewayEvent::SessionRevoked { user_id });
        match rx.recv().await.unwrap() {
            GatewayEvent::SessionRevoked { user_id: got } => assert_eq!(got, user_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
