use crate::{Reduced, Reducer, Source};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Source over a synchronous iterator.
///
/// Every reduction iterates a fresh clone of `items`.
#[derive(Debug, Clone)]
pub struct Iter<I> {
    items: I,
}

pub fn iter<I>(items: I) -> Iter<I>
where
    I: IntoIterator + Clone,
{
    Iter { items }
}

impl<I> Source for Iter<I>
where
    I: IntoIterator + Clone + Send + Sync,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

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
        let mut items = self.items.clone().into_iter();
        loop {
            if token.is_cancelled() {
                return Ok(Reduced::Done(state));
            }
            let Some(item) = items.next() else {
                return Ok(Reduced::Continue(state));
            };
            match reducer.step(state, item).await? {
                Reduced::Continue(next) => state = next,
                done @ Reduced::Done(_) => return Ok(done),
            }
            tokio::task::yield_now().await;
        }
    }
}

/// Source over an async stream.
///
/// `make` is called once per reduction so that every reduction observes the
/// whole stream.
pub struct FromStream<F> {
    make: F,
}

impl<F> std::fmt::Debug for FromStream<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FromStream").finish_non_exhaustive()
    }
}

pub fn from_stream<F, St>(make: F) -> FromStream<F>
where
    F: Fn() -> St + Send + Sync,
    St: Stream + Send,
    St::Item: Send + 'static,
{
    FromStream { make }
}

impl<F, St> Source for FromStream<F>
where
    F: Fn() -> St + Send + Sync,
    St: Stream + Send,
    St::Item: Send + 'static,
{
    type Item = St::Item;

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
        let mut stream = std::pin::pin!((self.make)());
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Reduced::Done(state)),
                next = stream.next() => next,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SourceExt, reducer};

    #[tokio::test]
    async fn iter_restarts_on_every_reduction() {
        let source = iter(vec![1, 2, 3]);
        let token = CancellationToken::new();
        assert_eq!(source.collect(&token).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(source.collect(&token).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn iter_end_is_continue_and_cancellation_is_done() {
        let push = reducer(|mut acc: Vec<u32>, x: u32| async move {
            acc.push(x);
            Ok(Reduced::Continue(acc))
        });
        let token = CancellationToken::new();
        let reduced = iter(0..2u32).reduce(vec![], &push, &token).await.unwrap();
        assert_eq!(reduced, Reduced::Continue(vec![0, 1]));

        token.cancel();
        let reduced = iter(0..2u32).reduce(vec![], &push, &token).await.unwrap();
        assert_eq!(reduced, Reduced::Done(vec![]));
    }

    #[tokio::test]
    async fn reducer_fault_aborts_iteration() {
        let failing = reducer(|seen: u32, x: u32| async move {
            anyhow::ensure!(x < 2, "item {x} rejected");
            Ok(Reduced::Continue(seen + 1))
        });
        let err = iter(0..10u32)
            .reduce(0, &failing, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "item 2 rejected");
    }

    #[tokio::test]
    async fn stream_source_reads_a_fresh_stream() {
        let source = from_stream(|| futures::stream::iter(["a", "b"]));
        let token = CancellationToken::new();
        assert_eq!(source.collect(&token).await.unwrap(), vec!["a", "b"]);
        assert_eq!(source.count(&token).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pending_stream_observes_cancellation() {
        let source = from_stream(futures::stream::pending::<u8>);
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let count = reducer(|n: u8, _: u8| async move { Ok(Reduced::Continue(n + 1)) });
        let reduced = source.reduce(0, &count, &token).await.unwrap();
        assert_eq!(reduced, Reduced::Done(0));
    }
}
