use crate::{Reduced, Reducer, Source};
use tokio_util::sync::CancellationToken;

/// Ordered concatenation of same-typed sources.
///
/// Each source starts from the final state of the previous one; a `Done`
/// from any of them ends the whole reduction.
#[derive(Debug, Clone)]
pub struct Combine<T> {
    sources: Vec<T>,
}

pub fn combine<T: Source>(sources: impl IntoIterator<Item = T>) -> Combine<T> {
    Combine {
        sources: sources.into_iter().collect(),
    }
}

impl<T: Source> Source for Combine<T> {
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
        for source in &self.sources {
            if token.is_cancelled() {
                return Ok(Reduced::Done(state));
            }
            match source.reduce(state, reducer, token).await? {
                Reduced::Continue(next) => state = next,
                done @ Reduced::Done(_) => return Ok(done),
            }
        }
        Ok(Reduced::Continue(state))
    }
}

/// Two-source [`Combine`] for sources of different types.
#[derive(Debug, Clone)]
pub struct Concat<A, B> {
    first: A,
    second: B,
}

impl<A, B> Concat<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> Source for Concat<A, B>
where
    A: Source,
    B: Source<Item = A::Item>,
{
    type Item = A::Item;

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
        let state = match self.first.reduce(state, reducer, token).await? {
            Reduced::Continue(state) => state,
            done @ Reduced::Done(_) => return Ok(done),
        };
        if token.is_cancelled() {
            return Ok(Reduced::Done(state));
        }
        self.second.reduce(state, reducer, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SourceExt, empty, forever, iter, pure, reducer};

    #[tokio::test]
    async fn runs_sources_in_order() {
        let token = CancellationToken::new();
        let items = combine([iter(vec![1, 2]), iter(vec![]), iter(vec![3, 4, 5])])
            .collect(&token)
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);

        let items = iter(0..2).concat(pure(9)).concat(empty()).collect(&token).await.unwrap();
        assert_eq!(items, vec![0, 1, 9]);
    }

    #[tokio::test]
    async fn state_is_threaded_across_sources() {
        let summing = reducer(|sum: i64, x: i64| async move { Ok(Reduced::Continue(sum + x)) });
        let reduced = combine([iter(1..=3), iter(10..=11)])
            .reduce(100, &summing, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Continue(127));
    }

    #[tokio::test]
    async fn done_short_circuits_later_sources() {
        let token = CancellationToken::new();
        // a taken source is only shorter, the next one still runs
        let items = forever('x')
            .take(2)
            .concat(pure('y'))
            .collect(&token)
            .await
            .unwrap();
        assert_eq!(items, vec!['x', 'x', 'y']);

        let first_odd = reducer(|_: Option<u8>, x: u8| async move {
            Ok(if x % 2 == 1 {
                Reduced::Done(Some(x))
            } else {
                Reduced::Continue(None)
            })
        });
        let reduced = combine([iter(vec![2, 4]), iter(vec![6, 7, 8]), iter(vec![9])])
            .reduce(None, &first_odd, &token)
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done(Some(7)));
    }

    #[tokio::test]
    async fn cancelled_token_skips_every_source() {
        let token = CancellationToken::new();
        token.cancel();
        let reduced = combine([empty::<u8>(), empty()])
            .reduce(
                "untouched",
                &reducer(|_: &str, _: u8| async move { Ok(Reduced::Continue("touched")) }),
                &token,
            )
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done("untouched"));
    }
}
