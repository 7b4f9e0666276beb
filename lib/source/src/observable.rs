//! Adapter from push-style observables to the [`Source`] contract.
//!
//! Notifications are queued in an unbounded channel and replayed into the
//! reducer from the reducing task, so the observable may notify from any thread.

use crate::channel::{ChannelWriter, channel};
use crate::{Reduced, Reducer, Source};
use tokio_util::sync::CancellationToken;

/// Push-based producer.
pub trait Observable: Send + Sync {
    type Item: Send + 'static;

    /// Starts delivering notifications to `observer`.
    /// Delivery must stop once the returned [`Subscription`] is dropped.
    fn subscribe(&self, observer: Observer<Self::Item>) -> Subscription;
}

/// Receiving end handed to an [`Observable`].
///
/// The stream completes once every clone has been dropped (or consumed by
/// [`complete`](Self::complete)), or as soon as one clone reports an error.
#[derive(Debug)]
pub struct Observer<A> {
    writer: ChannelWriter<A>,
}

impl<A> Clone for Observer<A> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
        }
    }
}

impl<A> Observer<A> {
    /// Returns `false` once the subscriber has gone away.
    pub fn next(&self, item: A) -> bool {
        self.writer.send(item)
    }

    pub fn error(self, err: anyhow::Error) {
        self.writer.fail(err);
    }

    pub fn complete(self) {}

    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }
}

/// Handle returned by [`Observable::subscribe`]; dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Subscription with nothing to release.
    pub fn empty() -> Self {
        Self { on_drop: None }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.on_drop.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

/// Source backed by an [`Observable`]; each reduction subscribes anew.
#[derive(Debug, Clone)]
pub struct ObservableSource<O> {
    observable: O,
}

pub fn from_observable<O: Observable>(observable: O) -> ObservableSource<O> {
    ObservableSource { observable }
}

impl<O: Observable> Source for ObservableSource<O> {
    type Item = O::Item;

    async fn reduce<S, R>(
        &self,
        mut state: S,
        reducer: &R,
        token: &CancellationToken,
    ) -> anyhow::Result<Reduced<S>>
    where
        S: Send + 'static,
        R: Reducer<Self::Item, S> + ?Sized,
    {
        if token.is_cancelled() {
            return Ok(Reduced::Done(state));
        }
        let (writer, mut notifications) = channel();
        let _subscription = self.observable.subscribe(Observer { writer });
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Reduced::Done(state)),
                next = notifications.recv() => next?,
            };
            let Some(item) = next else {
                return Ok(Reduced::Continue(state));
            };
            match reducer.step(state, item).await? {
                Reduced::Continue(next) => state = next,
                done @ Reduced::Done(_) => return Ok(done),
            }
        }
    }
}
