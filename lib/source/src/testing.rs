//! Instrumented sources for the unit tests.

use crate::{Reduced, Reducer, Source};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Counts reductions of tracked sources that are still running.
#[derive(Debug, Clone, Default)]
pub(crate) struct Liveness {
    live: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl Liveness {
    pub fn track<T>(&self, source: T) -> Tracked<T> {
        Tracked {
            source,
            liveness: self.clone(),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Tracked<T> {
    source: T,
    liveness: Liveness,
}

impl<T: Source> Source for Tracked<T> {
    type Item = T::Item;

    async fn reduce<S, R>(
        &self,
        state: S,
        reducer: &R,
        token: &CancellationToken,
    ) -> anyhow::Result<Reduced<S>>
    where
        S: Send + 'static,
        R: Reducer<Self::Item, S> + ?Sized,
    {
        self.liveness.started.fetch_add(1, Ordering::SeqCst);
        self.liveness.live.fetch_add(1, Ordering::SeqCst);
        let _guard = LiveGuard(self.liveness.live.clone());
        self.source.reduce(state, reducer, token).await
    }
}
