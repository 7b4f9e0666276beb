use crate::bind::Bind;
use crate::boxed::BoxSource;
use crate::combine::Concat;
use crate::map::{Map, TryMap};
use crate::take::Take;
use crate::transform::{self, Transducer, Transform};
use crate::zip::Zip2;
use crate::{Reduced, Reducer, reducer};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Description of an asynchronous, possibly infinite, producing process.
///
/// Constructing a source performs no work. Every call to [`reduce`](Self::reduce)
/// is an independent execution that pushes items into `reducer` until:
/// - the source is exhausted: `Continue(state)` is returned;
/// - the reducer returns `Done`, or `token` is cancelled: `Done(state)` is returned;
/// - a producer or the reducer fails: the error is returned and no state survives.
///
/// Sources that fork tasks cancel and await all of them before `reduce` returns.
pub trait Source: Send + Sync {
    /// The type of items this source produces
    type Item: Send + 'static;

    fn reduce<S, R>(
        &self,
        state: S,
        reducer: &R,
        token: &CancellationToken,
    ) -> impl Future<Output = anyhow::Result<Reduced<S>>> + Send
    where
        S: Send + 'static,
        R: Reducer<Self::Item, S> + ?Sized;
}

impl<T: Source> Source for Arc<T> {
    type Item = T::Item;

    fn reduce<S, R>(
        &self,
        state: S,
        reducer: &R,
        token: &CancellationToken,
    ) -> impl Future<Output = anyhow::Result<Reduced<S>>> + Send
    where
        S: Send + 'static,
        R: Reducer<Self::Item, S> + ?Sized,
    {
        (**self).reduce(state, reducer, token)
    }
}

/// Combinator vocabulary and ready-made reductions for every [`Source`].
pub trait SourceExt: Source + Sized {
    fn map<B, F>(self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Item) -> B + Send + Sync,
        B: Send + 'static,
    {
        Map::new(self, f)
    }

    fn try_map<B, F>(self, f: F) -> TryMap<Self, F>
    where
        F: Fn(Self::Item) -> anyhow::Result<B> + Send + Sync,
        B: Send + 'static,
    {
        TryMap::new(self, f)
    }

    fn bind<T, F>(self, f: F) -> Bind<Self, F>
    where
        F: Fn(Self::Item) -> T + Send + Sync,
        T: Source,
    {
        Bind::new(self, f)
    }

    fn take(self, n: i64) -> Take<Self> {
        Take::new(self, n)
    }

    fn transform<X>(self, transducer: X) -> Transform<Self, X>
    where
        X: Transducer<Self::Item>,
    {
        Transform::new(self, transducer)
    }

    fn filter<P>(self, predicate: P) -> Transform<Self, transform::Filter<P>>
    where
        P: Fn(&Self::Item) -> bool + Send + Sync,
    {
        self.transform(transform::filter(predicate))
    }

    fn skip(self, n: usize) -> Transform<Self, transform::Skip> {
        self.transform(transform::skip(n))
    }

    fn chunks(self, size: usize) -> Transform<Self, transform::Chunks> {
        self.transform(transform::chunks(size))
    }

    fn zip<U: Source>(self, other: U) -> Zip2<Self, U> {
        Zip2::new(self, other)
    }

    fn concat<U>(self, other: U) -> Concat<Self, U>
    where
        U: Source<Item = Self::Item>,
    {
        Concat::new(self, other)
    }

    fn boxed(self) -> BoxSource<Self::Item>
    where
        Self: 'static,
    {
        BoxSource::new(self)
    }

    /// Folds every item with an async step; the fold never stops early.
    fn fold<S, F, Fut>(
        &self,
        init: S,
        f: F,
        token: &CancellationToken,
    ) -> impl Future<Output = anyhow::Result<S>> + Send
    where
        S: Send + 'static,
        F: Fn(S, Self::Item) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        async move {
            let step = reducer(move |state: S, item: Self::Item| {
                let next = f(state, item);
                async move { next.await.map(Reduced::Continue) }
            });
            Ok(self.reduce(init, &step, token).await?.into_state())
        }
    }

    fn for_each<F, Fut>(
        &self,
        f: F,
        token: &CancellationToken,
    ) -> impl Future<Output = anyhow::Result<()>> + Send
    where
        F: Fn(Self::Item) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.fold((), move |(), item| f(item), token)
    }

    fn collect(
        &self,
        token: &CancellationToken,
    ) -> impl Future<Output = anyhow::Result<Vec<Self::Item>>> + Send {
        self.fold(
            Vec::new(),
            |mut items, item| async move {
                items.push(item);
                anyhow::Ok(items)
            },
            token,
        )
    }

    fn count(&self, token: &CancellationToken) -> impl Future<Output = anyhow::Result<u64>> + Send {
        self.fold(0u64, |count, _| async move { anyhow::Ok(count + 1) }, token)
    }

    fn last(
        &self,
        token: &CancellationToken,
    ) -> impl Future<Output = anyhow::Result<Option<Self::Item>>> + Send {
        self.fold(None, |_, item| async move { anyhow::Ok(Some(item)) }, token)
    }
}

impl<T: Source> SourceExt for T {}
