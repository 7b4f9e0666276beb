use crate::error::SourceError;
use crate::{Reduced, Reducer, Source};
use futures::future::BoxFuture;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type AnyState = Box<dyn Any + Send>;

/// Object-safe shadow of [`Source`]: the reduction state travels type-erased.
trait DynSource<A>: Send + Sync {
    fn reduce_dyn<'a>(
        &'a self,
        state: AnyState,
        reducer: &'a dyn Reducer<A, AnyState>,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<Reduced<AnyState>>>;
}

impl<T: Source> DynSource<T::Item> for T {
    fn reduce_dyn<'a>(
        &'a self,
        state: AnyState,
        reducer: &'a dyn Reducer<T::Item, AnyState>,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<Reduced<AnyState>>> {
        Box::pin(self.reduce(state, reducer, token))
    }
}

/// Restores the concrete state around the caller's reducer.
struct Unerased<'r, S, R: ?Sized> {
    inner: &'r R,
    _state: PhantomData<fn(S) -> S>,
}

fn downcast<S: 'static>(state: AnyState) -> Result<S, SourceError> {
    state
        .downcast::<S>()
        .map(|state| *state)
        .map_err(|_| SourceError::StateTypeMismatch)
}

impl<A, S, R> Reducer<A, AnyState> for Unerased<'_, S, R>
where
    A: Send + 'static,
    S: Send + 'static,
    R: Reducer<A, S> + ?Sized,
{
    fn step(&self, state: AnyState, item: A) -> BoxFuture<'_, anyhow::Result<Reduced<AnyState>>> {
        Box::pin(async move {
            let state = downcast::<S>(state)?;
            let reduced = self.inner.step(state, item).await?;
            Ok(reduced.map(|state| Box::new(state) as AnyState))
        })
    }
}

/// Type-erased, cheaply cloneable source.
///
/// Lets sources of different concrete types share a collection, e.g. to
/// [`choose`](crate::choose) or [`combine`](crate::combine) them.
pub struct BoxSource<A> {
    inner: Arc<dyn DynSource<A>>,
}

impl<A: Send + 'static> BoxSource<A> {
    pub fn new<T>(source: T) -> Self
    where
        T: Source<Item = A> + 'static,
    {
        Self {
            inner: Arc::new(source),
        }
    }
}

impl<A> Clone for BoxSource<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A> std::fmt::Debug for BoxSource<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxSource").finish_non_exhaustive()
    }
}

impl<A: Send + 'static> Source for BoxSource<A> {
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
        let unerased = Unerased {
            inner: reducer,
            _state: PhantomData::<fn(S) -> S>,
        };
        let reduced = self
            .inner
            .reduce_dyn(Box::new(state), &unerased, token)
            .await?;
        Ok(match reduced {
            Reduced::Continue(state) => Reduced::Continue(downcast(state)?),
            Reduced::Done(state) => Reduced::Done(downcast(state)?),
        })
    }
}
