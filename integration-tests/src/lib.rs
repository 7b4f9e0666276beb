//! Helpers shared by the end-to-end tests.

use rill_source::{CancellationToken, Reduced, Reducer, Source};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Counts how many reductions of tracked sources started and how many are still running.
///
/// A combinator that leaks a producer task leaves `running() > 0` after its own
/// reduction has returned.
#[derive(Debug, Clone, Default)]
pub struct TaskCounter {
    running: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl TaskCounter {
    pub fn track<T>(&self, source: T) -> Tracked<T> {
        Tracked {
            source,
            counter: self.clone(),
        }
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Source wrapper reporting to a [`TaskCounter`].
pub struct Tracked<T> {
    source: T,
    counter: TaskCounter,
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
        self.counter.started.fetch_add(1, Ordering::SeqCst);
        self.counter.running.fetch_add(1, Ordering::SeqCst);
        let _guard = RunningGuard(self.counter.running.clone());
        self.source.reduce(state, reducer, token).await
    }
}

/// Polls `condition` until it holds, failing after five seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting until {what}"))
}
