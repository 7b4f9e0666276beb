use crate::{Reduced, Reducer, Source};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Delivers at most `n` items.
///
/// Once the budget is spent the upstream is stopped with `Done`, while the
/// reduction itself ends with `Continue`: a taken source is simply shorter,
/// so it can be followed by another one in a [`Combine`](crate::Combine).
/// `Done` is only returned when the downstream reducer or cancellation asked for it.
/// `n <= 0` delivers nothing and is `Done` right away.
#[derive(Debug, Clone)]
pub struct Take<T> {
    source: T,
    n: i64,
}

impl<T> Take<T> {
    pub fn new(source: T, n: i64) -> Self {
        Self { source, n }
    }
}

/// Budget threaded next to the caller's state.
#[derive(Debug, Clone, Copy)]
struct Budget {
    remaining: i64,
    /// The downstream reducer returned `Done`.
    downstream_done: bool,
}

struct TakeReducer<'r, R: ?Sized> {
    inner: &'r R,
}

impl<A, S, R> Reducer<A, (S, Budget)> for TakeReducer<'_, R>
where
    A: Send + 'static,
    S: Send + 'static,
    R: Reducer<A, S> + ?Sized,
{
    fn step(
        &self,
        (state, budget): (S, Budget),
        item: A,
    ) -> BoxFuture<'_, anyhow::Result<Reduced<(S, Budget)>>> {
        Box::pin(async move {
            let remaining = budget.remaining - 1;
            Ok(match self.inner.step(state, item).await? {
                Reduced::Done(state) => Reduced::Done((
                    state,
                    Budget {
                        remaining,
                        downstream_done: true,
                    },
                )),
                Reduced::Continue(state) => {
                    let budget = Budget {
                        remaining,
                        downstream_done: false,
                    };
                    if remaining <= 0 {
                        Reduced::Done((state, budget))
                    } else {
                        Reduced::Continue((state, budget))
                    }
                }
            })
        })
    }
}

impl<T: Source> Source for Take<T> {
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
        if self.n <= 0 {
            return Ok(Reduced::Done(state));
        }
        let taking = TakeReducer { inner: reducer };
        let budget = Budget {
            remaining: self.n,
            downstream_done: false,
        };
        Ok(match self.source.reduce((state, budget), &taking, token).await? {
            Reduced::Continue((state, _)) => Reduced::Continue(state),
            // the upstream was stopped because the budget ran out
            Reduced::Done((state, budget)) if budget.remaining <= 0 && !budget.downstream_done => {
                Reduced::Continue(state)
            }
            Reduced::Done((state, _)) => Reduced::Done(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Reduced, Source, SourceExt, forever, iter, reducer};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn take_over_forever_is_exact() {
        let token = CancellationToken::new();
        for n in [-3i64, -1, 0, 1, 2, 17] {
            let calls = Arc::new(AtomicU64::new(0));
            let counting = {
                let calls = calls.clone();
                reducer(move |count: u64, _: u8| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(Reduced::Continue(count + 1)) }
                })
            };
            let reduced = forever(0u8)
                .take(n)
                .reduce(0, &counting, &token)
                .await
                .unwrap();
            let expected = n.max(0) as u64;
            if n <= 0 {
                assert_eq!(reduced, Reduced::Done(0), "n = {n}");
            } else {
                assert_eq!(reduced, Reduced::Continue(expected), "n = {n}");
            }
            assert_eq!(calls.load(Ordering::SeqCst), expected, "n = {n}");
        }
    }

    #[tokio::test]
    async fn shorter_source_ends_with_continue() {
        let reduced = iter(0..3)
            .take(10)
            .reduce(
                0,
                &reducer(|s: i32, x: i32| async move { Ok(Reduced::Continue(s + x)) }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Continue(3));
    }

    #[tokio::test]
    async fn spent_budget_stops_the_upstream_but_ends_with_continue() {
        let items = iter(0..100).take(4).collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(items, vec![0, 1, 2, 3]);

        let token = CancellationToken::new();
        let items = forever('x').take(2).concat(iter(vec!['y'])).collect(&token).await.unwrap();
        assert_eq!(items, vec!['x', 'x', 'y']);
    }

    #[tokio::test]
    async fn downstream_done_on_the_last_budgeted_item_is_kept() {
        let stop_at_three = reducer(|n: u32, _: u8| async move {
            Ok(if n + 1 == 3 {
                Reduced::Done(n + 1)
            } else {
                Reduced::Continue(n + 1)
            })
        });
        let reduced = forever(0u8)
            .take(3)
            .reduce(0, &stop_at_three, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done(3));
    }

    #[tokio::test]
    async fn cancellation_inside_the_budget_is_done() {
        let token = CancellationToken::new();
        let cancelling = {
            let token = token.clone();
            reducer(move |n: u32, _: u8| {
                if n == 1 {
                    token.cancel();
                }
                async move { Ok(Reduced::Continue(n + 1)) }
            })
        };
        let reduced = forever(0u8).take(10).reduce(0, &cancelling, &token).await.unwrap();
        assert_eq!(reduced, Reduced::Done(2));
    }

    #[tokio::test]
    async fn inner_done_stops_before_the_budget() {
        let two = reducer(|n: u32, _: char| async move {
            Ok(if n + 1 == 2 {
                Reduced::Done(n + 1)
            } else {
                Reduced::Continue(n + 1)
            })
        });
        let reduced = forever('a')
            .take(5)
            .reduce(0, &two, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done(2));
    }
}
