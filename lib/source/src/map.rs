use crate::{Reduced, Reducer, Source};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Applies `f` to every item before it reaches the reducer.
#[derive(Debug, Clone)]
pub struct Map<T, F> {
    source: T,
    f: F,
}

impl<T, F> Map<T, F> {
    pub fn new(source: T, f: F) -> Self {
        Self { source, f }
    }
}

struct MapReducer<'r, F, R: ?Sized> {
    f: &'r F,
    inner: &'r R,
}

impl<A, B, S, F, R> Reducer<A, S> for MapReducer<'_, F, R>
where
    F: Fn(A) -> B + Send + Sync,
    R: Reducer<B, S> + ?Sized,
{
    fn step(&self, state: S, item: A) -> BoxFuture<'_, anyhow::Result<Reduced<S>>> {
        self.inner.step(state, (self.f)(item))
    }
}

impl<T, F, B> Source for Map<T, F>
where
    T: Source,
    F: Fn(T::Item) -> B + Send + Sync,
    B: Send + 'static,
{
    type Item = B;

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
        let mapped = MapReducer {
            f: &self.f,
            inner: reducer,
        };
        self.source.reduce(state, &mapped, token).await
    }
}

/// Like [`Map`], with a fallible function; the first failure aborts the reduction.
#[derive(Debug, Clone)]
pub struct TryMap<T, F> {
    source: T,
    f: F,
}

impl<T, F> TryMap<T, F> {
    pub fn new(source: T, f: F) -> Self {
        Self { source, f }
    }
}

struct TryMapReducer<'r, F, R: ?Sized> {
    f: &'r F,
    inner: &'r R,
}

impl<A, B, S, F, R> Reducer<A, S> for TryMapReducer<'_, F, R>
where
    S: Send + 'static,
    F: Fn(A) -> anyhow::Result<B> + Send + Sync,
    R: Reducer<B, S> + ?Sized,
{
    fn step(&self, state: S, item: A) -> BoxFuture<'_, anyhow::Result<Reduced<S>>> {
        match (self.f)(item) {
            Ok(mapped) => self.inner.step(state, mapped),
            Err(err) => Box::pin(futures::future::ready(Err(err))),
        }
    }
}

impl<T, F, B> Source for TryMap<T, F>
where
    T: Source,
    F: Fn(T::Item) -> anyhow::Result<B> + Send + Sync,
    B: Send + 'static,
{
    type Item = B;

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
        let mapped = TryMapReducer {
            f: &self.f,
            inner: reducer,
        };
        self.source.reduce(state, &mapped, token).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{Reduced, Source, SourceExt, iter, reducer};
    use anyhow::Context as _;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn map_transforms_every_item() {
        let items = iter(1..=3)
            .map(|x| x * 10)
            .map(|x| format!("#{x}"))
            .collect(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items, ["#10", "#20", "#30"]);
    }

    #[tokio::test]
    async fn try_map_failure_propagates_with_context() {
        let err = iter(["1", "2", "x", "4"])
            .try_map(|s| s.parse::<u32>().with_context(|| format!("bad item `{s}`")))
            .collect(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad item `x`");
    }

    #[tokio::test]
    async fn try_map_failure_discards_the_partial_state() {
        let joining = reducer(|mut acc: Vec<String>, x: u32| async move {
            acc.push(x.to_string());
            Ok(Reduced::Continue(acc))
        });
        let source = iter([3u32, 2, 1, 0]).try_map(|x| {
            anyhow::ensure!(x > 0, "zero is not allowed");
            Ok(12 / x)
        });
        let err = source
            .reduce(Vec::new(), &joining, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "zero is not allowed");

        let reduced = source
            .take(3)
            .reduce(Vec::new(), &joining, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reduced.into_state(), ["4", "6", "12"]);
    }
}
