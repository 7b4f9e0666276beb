use crate::{Reduced, Reducer, Source};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Monadic bind: every upstream item is turned into a nested source that is
/// reduced to completion before the next upstream item is requested.
///
/// A nested `Done` stops the whole reduction.
#[derive(Debug, Clone)]
pub struct Bind<T, F> {
    source: T,
    f: F,
}

impl<T, F> Bind<T, F> {
    pub fn new(source: T, f: F) -> Self {
        Self { source, f }
    }
}

struct BindReducer<'r, F, R: ?Sized> {
    f: &'r F,
    inner: &'r R,
    token: &'r CancellationToken,
}

impl<A, S, F, U, R> Reducer<A, S> for BindReducer<'_, F, R>
where
    A: Send + 'static,
    S: Send + 'static,
    F: Fn(A) -> U + Send + Sync,
    U: Source + 'static,
    R: Reducer<U::Item, S> + ?Sized,
{
    fn step(&self, state: S, item: A) -> BoxFuture<'_, anyhow::Result<Reduced<S>>> {
        Box::pin(async move {
            let nested = (self.f)(item);
            nested.reduce(state, self.inner, self.token).await
        })
    }
}

impl<T, F, U> Source for Bind<T, F>
where
    T: Source,
    F: Fn(T::Item) -> U + Send + Sync,
    U: Source + 'static,
{
    type Item = U::Item;

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
        let bound = BindReducer {
            f: &self.f,
            inner: reducer,
            token,
        };
        self.source.reduce(state, &bound, token).await
    }
}
