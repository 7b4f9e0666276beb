use crate::Reduced;
use futures::future::BoxFuture;
use std::future::Future;

/// Fold step driven by every [`Source`](crate::Source).
///
/// The state is threaded through the calls: a reducer is never invoked
/// concurrently for the same reduction, even when the items are produced by
/// several tasks.
pub trait Reducer<A, S>: Send + Sync {
    fn step(&self, state: S, item: A) -> BoxFuture<'_, anyhow::Result<Reduced<S>>>;
}

/// Reducer backed by an async closure. See [`reducer`].
#[derive(Clone, Copy)]
pub struct FnReducer<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnReducer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnReducer").finish_non_exhaustive()
    }
}

/// Lifts an async closure `(state, item) -> Result<Reduced<state>>` into a [`Reducer`].
///
/// ```ignore
/// let sum = reducer(|acc: u64, x: u64| async move { Ok(Reduced::Continue(acc + x)) });
/// ```
pub fn reducer<A, S, F, Fut>(f: F) -> FnReducer<F>
where
    F: Fn(S, A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Reduced<S>>> + Send + 'static,
{
    FnReducer { f }
}

impl<A, S, F, Fut> Reducer<A, S> for FnReducer<F>
where
    F: Fn(S, A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Reduced<S>>> + Send + 'static,
{
    fn step(&self, state: S, item: A) -> BoxFuture<'_, anyhow::Result<Reduced<S>>> {
        Box::pin((self.f)(state, item))
    }
}
