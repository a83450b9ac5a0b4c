//! Cancellable live query subscriptions.
//!
//! A subscription yields the initial result set of a query and then one full
//! result set per remote change. Cancelling is explicit, idempotent and also
//! happens on drop; after cancellation no further snapshot is yielded, even
//! one that was already queued.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Document, StoreError};

/// One delivery from a live query.
pub type Snapshot = Result<Vec<Document>, StoreError>;

/// Consumer side of a live query.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    token: CancellationToken,
}

/// Producer side held by the store.
#[derive(Clone)]
pub struct SubscriptionSink {
    tx: mpsc::UnboundedSender<Snapshot>,
    token: CancellationToken,
}

impl Subscription {
    pub fn channel() -> (SubscriptionSink, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        (
            SubscriptionSink {
                tx,
                token: token.clone(),
            },
            Subscription { rx, token },
        )
    }

    /// Wait for the next snapshot. `None` once cancelled or the store hung up.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            snapshot = self.rx.recv() => snapshot,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Handle that cancels this subscription from elsewhere.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl SubscriptionSink {
    /// Deliver a snapshot. Returns false when the consumer is gone.
    pub fn send(&self, snapshot: Snapshot) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(snapshot).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the consumer cancels.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
