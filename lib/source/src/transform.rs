//! Value-level transducers composed ahead of a reducer.
//!
//! A [`Transducer`] owns a per-reduction state and may emit any number of
//! outputs for a single input, which covers filtering, expansion and
//! regrouping, not only 1:1 mapping.

use crate::{Reduced, Reducer, Source};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

pub trait Transducer<A>: Send + Sync {
    type Output: Send + 'static;
    type State: Send + 'static;

    /// Fresh state for one reduction.
    fn init(&self) -> Self::State;

    /// Pushes the outputs produced by `item` into `out`.
    fn step(&self, state: &mut Self::State, item: A, out: &mut Vec<Self::Output>);

    /// Flushes trailing outputs once the upstream source is exhausted.
    fn complete(&self, _state: Self::State, _out: &mut Vec<Self::Output>) {}

    /// `true` once the transducer will not emit anything anymore; stops the upstream.
    fn is_done(&self, _state: &Self::State) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct Transform<T, X> {
    source: T,
    transducer: X,
}

impl<T, X> Transform<T, X> {
    pub fn new(source: T, transducer: X) -> Self {
        Self { source, transducer }
    }
}

struct TransformReducer<'r, X, R: ?Sized> {
    transducer: &'r X,
    inner: &'r R,
}

/// Transducer state threaded next to the caller's state.
struct Local<St> {
    state: St,
    /// The downstream reducer returned `Done`.
    downstream_done: bool,
}

impl<A, S, X, R> Reducer<A, (S, Local<X::State>)> for TransformReducer<'_, X, R>
where
    A: Send + 'static,
    S: Send + 'static,
    X: Transducer<A>,
    R: Reducer<X::Output, S> + ?Sized,
{
    fn step(
        &self,
        (mut state, mut local): (S, Local<X::State>),
        item: A,
    ) -> BoxFuture<'_, anyhow::Result<Reduced<(S, Local<X::State>)>>> {
        Box::pin(async move {
            let mut outputs = Vec::new();
            self.transducer.step(&mut local.state, item, &mut outputs);
            for output in outputs {
                match self.inner.step(state, output).await? {
                    Reduced::Continue(next) => state = next,
                    Reduced::Done(next) => {
                        local.downstream_done = true;
                        return Ok(Reduced::Done((next, local)));
                    }
                }
            }
            Ok(if self.transducer.is_done(&local.state) {
                Reduced::Done((state, local))
            } else {
                Reduced::Continue((state, local))
            })
        })
    }
}

impl<T, X> Source for Transform<T, X>
where
    T: Source,
    X: Transducer<T::Item>,
{
    type Item = X::Output;

    /// Ends with `Continue` when the upstream is exhausted or the transducer
    /// finished on its own; trailing outputs are flushed in both cases.
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
        let transforming = TransformReducer {
            transducer: &self.transducer,
            inner: reducer,
        };
        let local = Local {
            state: self.transducer.init(),
            downstream_done: false,
        };
        let reduced = self
            .source
            .reduce((state, local), &transforming, token)
            .await?;
        let (mut state, local) = match reduced {
            Reduced::Continue(exhausted) => exhausted,
            Reduced::Done((state, local))
                if !local.downstream_done && self.transducer.is_done(&local.state) =>
            {
                (state, local)
            }
            Reduced::Done((state, _)) => return Ok(Reduced::Done(state)),
        };
        let mut trailing = Vec::new();
        self.transducer.complete(local.state, &mut trailing);
        for output in trailing {
            match reducer.step(state, output).await? {
                Reduced::Continue(next) => state = next,
                done @ Reduced::Done(_) => return Ok(done),
            }
        }
        Ok(Reduced::Continue(state))
    }
}

#[derive(Debug, Clone)]
pub struct Filter<P> {
    predicate: P,
}

pub fn filter<P>(predicate: P) -> Filter<P> {
    Filter { predicate }
}

impl<A, P> Transducer<A> for Filter<P>
where
    A: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync,
{
    type Output = A;
    type State = ();

    fn init(&self) {}

    fn step(&self, _: &mut (), item: A, out: &mut Vec<A>) {
        if (self.predicate)(&item) {
            out.push(item);
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterMap<F> {
    f: F,
}

pub fn filter_map<F>(f: F) -> FilterMap<F> {
    FilterMap { f }
}

impl<A, B, F> Transducer<A> for FilterMap<F>
where
    B: Send + 'static,
    F: Fn(A) -> Option<B> + Send + Sync,
{
    type Output = B;
    type State = ();

    fn init(&self) {}

    fn step(&self, _: &mut (), item: A, out: &mut Vec<B>) {
        out.extend((self.f)(item));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Skip {
    n: usize,
}

pub fn skip(n: usize) -> Skip {
    Skip { n }
}

impl<A: Send + 'static> Transducer<A> for Skip {
    type Output = A;
    type State = usize;

    fn init(&self) -> usize {
        self.n
    }

    fn step(&self, remaining: &mut usize, item: A, out: &mut Vec<A>) {
        if *remaining == 0 {
            out.push(item);
        } else {
            *remaining -= 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct TakeWhile<P> {
    predicate: P,
}

pub fn take_while<P>(predicate: P) -> TakeWhile<P> {
    TakeWhile { predicate }
}

impl<A, P> Transducer<A> for TakeWhile<P>
where
    A: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync,
{
    type Output = A;
    type State = bool;

    fn init(&self) -> bool {
        false
    }

    fn step(&self, done: &mut bool, item: A, out: &mut Vec<A>) {
        if !*done && (self.predicate)(&item) {
            out.push(item);
        } else {
            *done = true;
        }
    }

    fn is_done(&self, done: &bool) -> bool {
        *done
    }
}

#[derive(Debug, Clone)]
pub struct Scan<T, F> {
    init: T,
    f: F,
}

/// Emits every intermediate accumulator.
pub fn scan<T, F>(init: T, f: F) -> Scan<T, F> {
    Scan { init, f }
}

impl<A, T, F> Transducer<A> for Scan<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T, A) -> T + Send + Sync,
{
    type Output = T;
    type State = T;

    fn init(&self) -> T {
        self.init.clone()
    }

    fn step(&self, acc: &mut T, item: A, out: &mut Vec<T>) {
        *acc = (self.f)(acc, item);
        out.push(acc.clone());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunks {
    size: usize,
}

/// Groups items into vectors of `size` (at least 1); the last chunk may be shorter.
pub fn chunks(size: usize) -> Chunks {
    Chunks { size: size.max(1) }
}

impl<A: Send + 'static> Transducer<A> for Chunks {
    type Output = Vec<A>;
    type State = Vec<A>;

    fn init(&self) -> Vec<A> {
        Vec::with_capacity(self.size)
    }

    fn step(&self, pending: &mut Vec<A>, item: A, out: &mut Vec<Vec<A>>) {
        pending.push(item);
        if pending.len() == self.size {
            out.push(std::mem::replace(pending, Vec::with_capacity(self.size)));
        }
    }

    fn complete(&self, pending: Vec<A>, out: &mut Vec<Vec<A>>) {
        if !pending.is_empty() {
            out.push(pending);
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlatMapIter<F> {
    f: F,
}

pub fn flat_map_iter<F>(f: F) -> FlatMapIter<F> {
    FlatMapIter { f }
}

impl<A, I, F> Transducer<A> for FlatMapIter<F>
where
    F: Fn(A) -> I + Send + Sync,
    I: IntoIterator,
    I::Item: Send + 'static,
{
    type Output = I::Item;
    type State = ();

    fn init(&self) {}

    fn step(&self, _: &mut (), item: A, out: &mut Vec<I::Item>) {
        out.extend((self.f)(item));
    }
}
