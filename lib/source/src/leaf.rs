use crate::{Reduced, Reducer, Source};
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// Source that produces nothing.
pub struct Empty<A> {
    _marker: PhantomData<fn() -> A>,
}

pub fn empty<A>() -> Empty<A> {
    Empty {
        _marker: PhantomData,
    }
}

impl<A> Clone for Empty<A> {
    fn clone(&self) -> Self {
        empty()
    }
}

impl<A> std::fmt::Debug for Empty<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Empty")
    }
}

impl<A: Send + 'static> Source for Empty<A> {
    type Item = A;

    async fn reduce<S, R>(
        &self,
        state: S,
        _reducer: &R,
        _token: &CancellationToken,
    ) -> anyhow::Result<Reduced<S>>
    where
        S: Send + 'static,
        R: Reducer<Self::Item, S> + ?Sized,
    {
        Ok(Reduced::Continue(state))
    }
}

/// Source that produces a single item.
#[derive(Debug, Clone)]
pub struct Pure<A> {
    value: A,
}

pub fn pure<A>(value: A) -> Pure<A> {
    Pure { value }
}

impl<A> Source for Pure<A>
where
    A: Clone + Send + Sync + 'static,
{
    type Item = A;

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
        if token.is_cancelled() {
            return Ok(Reduced::Done(state));
        }
        reducer.step(state, self.value.clone()).await
    }
}

/// Source that produces the same item until the reducer is done or the token is cancelled.
#[derive(Debug, Clone)]
pub struct Forever<A> {
    value: A,
}

pub fn forever<A>(value: A) -> Forever<A> {
    Forever { value }
}

impl<A> Source for Forever<A>
where
    A: Clone + Send + Sync + 'static,
{
    type Item = A;

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
        loop {
            if token.is_cancelled() {
                return Ok(Reduced::Done(state));
            }
            match reducer.step(state, self.value.clone()).await? {
                Reduced::Continue(next) => state = next,
                done @ Reduced::Done(_) => return Ok(done),
            }
            // the reducer may complete synchronously; give concurrent readers a chance to run
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SourceExt, reducer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_never_calls_the_reducer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = {
            let calls = calls.clone();
            reducer(move |s: (), _: u8| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Reduced::Continue(s)) }
            })
        };
        let reduced = empty::<u8>()
            .reduce((), &counting, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Continue(()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pure_delivers_exactly_once() {
        let items = pure(5).collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(items, vec![5]);
    }

    #[tokio::test]
    async fn cancelled_pure_is_done_without_items() {
        let token = CancellationToken::new();
        token.cancel();
        let push = reducer(|mut acc: Vec<u8>, x: u8| async move {
            acc.push(x);
            Ok(Reduced::Continue(acc))
        });
        let reduced = pure(1u8).reduce(Vec::new(), &push, &token).await.unwrap();
        assert_eq!(reduced, Reduced::Done(vec![]));
    }

    #[tokio::test]
    async fn forever_runs_until_done() {
        let until_three = reducer(|count: usize, x: char| async move {
            assert_eq!(x, 'x');
            let count = count + 1;
            Ok(if count == 3 {
                Reduced::Done(count)
            } else {
                Reduced::Continue(count)
            })
        });
        let reduced = forever('x')
            .reduce(0, &until_three, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done(3));
    }

    #[tokio::test]
    async fn forever_stops_on_cancellation() {
        let token = CancellationToken::new();
        let cancelling = {
            let token = token.clone();
            reducer(move |count: usize, _: ()| {
                if count == 9 {
                    token.cancel();
                }
                async move { Ok(Reduced::Continue(count + 1)) }
            })
        };
        let reduced = forever(()).reduce(0, &cancelling, &token).await.unwrap();
        assert_eq!(reduced, Reduced::Done(10));
    }
}
