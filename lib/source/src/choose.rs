use crate::channel::channel;
use crate::metrics::SOURCE_METRICS;
use crate::runtime::TaskScope;
use crate::{Reduced, Reducer, Source};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Non-deterministic merge: items of all sources are delivered in arrival order.
///
/// Every source is reduced by its own forked producer writing into one shared
/// channel. Each producer holds a clone of the writer, so the channel only
/// completes once the last producer has finished. Use [`BoxSource`](crate::BoxSource)
/// to merge sources of different types.
#[derive(Debug)]
pub struct Choose<T> {
    sources: Vec<Arc<T>>,
}

pub fn choose<T: Source>(sources: impl IntoIterator<Item = T>) -> Choose<T> {
    Choose {
        sources: sources.into_iter().map(Arc::new).collect(),
    }
}

impl<T> Clone for Choose<T> {
    fn clone(&self) -> Self {
        Self {
            sources: self.sources.clone(),
        }
    }
}

impl<T: Source + 'static> Source for Choose<T> {
    type Item = T::Item;

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
        let mut scope = TaskScope::new("choose", token);
        let (writer, mut merged) = channel();
        for source in &self.sources {
            scope.fork_producer(source.clone(), writer.clone());
        }
        // only the producers may keep the channel open
        drop(writer);
        tracing::trace!(combinator = "choose", producers = scope.len(), "merge started");

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(Reduced::Done(state)),
                next = merged.recv() => next,
            };
            let item = match next {
                Ok(Some(item)) => item,
                Ok(None) => break Ok(Reduced::Continue(state)),
                Err(err) => break Err(err),
            };
            SOURCE_METRICS.items[&"choose"].inc();
            match reducer.step(state, item).await {
                Ok(Reduced::Continue(next)) => state = next,
                other => break other,
            }
        };
        scope.close_with(result).await
    }
}
