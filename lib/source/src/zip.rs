//! Positional joins: round `i` pairs the `i`-th item of every input.
//!
//! Each input is reduced by its own forked producer into a dedicated channel.
//! The reading side waits for one item from every channel, combines them and
//! feeds the result downstream. A round is settled only once every input has
//! reported its outcome for that position, so the result does not depend on
//! which producer happens to run first: a fault in the round fails the join,
//! otherwise an input that ended ends it with `Done`. Producers are cancelled
//! and awaited before `reduce` returns.

use crate::channel::{ChannelReader, channel};
use crate::metrics::SOURCE_METRICS;
use crate::runtime::TaskScope;
use crate::{Reduced, Reducer, Source};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds the output of one round from the items of all inputs.
pub trait Zipper<In>: Send + Sync {
    type Output: Send + 'static;

    fn zip(&self, input: In) -> Self::Output;
}

/// Emits the round as a tuple.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tupled;

impl<T: Send + 'static> Zipper<T> for Tupled {
    type Output = T;

    fn zip(&self, input: T) -> T {
        input
    }
}

/// Emits `f(a, b, ..)` for every round.
#[derive(Debug, Clone, Copy)]
pub struct With<F>(F);

impl<A, B, O, F> Zipper<(A, B)> for With<F>
where
    F: Fn(A, B) -> O + Send + Sync,
    O: Send + 'static,
{
    type Output = O;

    fn zip(&self, (a, b): (A, B)) -> O {
        (self.0)(a, b)
    }
}

impl<A, B, C, O, F> Zipper<(A, B, C)> for With<F>
where
    F: Fn(A, B, C) -> O + Send + Sync,
    O: Send + 'static,
{
    type Output = O;

    fn zip(&self, (a, b, c): (A, B, C)) -> O {
        (self.0)(a, b, c)
    }
}

impl<A, B, C, D, O, F> Zipper<(A, B, C, D)> for With<F>
where
    F: Fn(A, B, C, D) -> O + Send + Sync,
    O: Send + 'static,
{
    type Output = O;

    fn zip(&self, (a, b, c, d): (A, B, C, D)) -> O {
        (self.0)(a, b, c, d)
    }
}

/// Applies the function of the first input to the value of the second.
#[derive(Debug, Clone, Copy, Default)]
pub struct Applied;

impl<F, X, O> Zipper<(F, X)> for Applied
where
    F: FnOnce(X) -> O,
    O: Send + 'static,
{
    type Output = O;

    fn zip(&self, (f, x): (F, X)) -> O {
        f(x)
    }
}

/// Why a round could not be completed.
enum Halt {
    Closed,
    Fault(anyhow::Error),
}

impl Halt {
    /// A fault anywhere in the round outranks a closed input.
    fn prevailing(self, other: Halt) -> Halt {
        match self {
            Halt::Fault(_) => self,
            Halt::Closed => other,
        }
    }
}

async fn ready<T>(channel: &mut ChannelReader<T>) -> Result<T, Halt> {
    match channel.recv().await {
        Ok(Some(item)) => Ok(item),
        Ok(None) => Err(Halt::Closed),
        Err(err) => Err(Halt::Fault(err)),
    }
}

macro_rules! zip_source {
    ($(#[$attr:meta])* $zip:ident, $label:literal, $($input:ident: $ty:ident),+) => {
        $(#[$attr])*
        #[derive(Debug)]
        pub struct $zip<$($ty,)+ Z = Tupled> {
            $($input: Arc<$ty>,)+
            zipper: Z,
        }

        impl<$($ty),+> $zip<$($ty),+> {
            pub fn new($($input: $ty),+) -> Self {
                Self {
                    $($input: Arc::new($input),)+
                    zipper: Tupled,
                }
            }
        }

        impl<$($ty: Source),+> $zip<$($ty),+> {
            /// Combines every round with `f` instead of building a tuple.
            pub fn with<F, O>($($input: $ty,)+ f: F) -> $zip<$($ty,)+ With<F>>
            where
                F: Fn($($ty::Item),+) -> O + Send + Sync,
                O: Send + 'static,
            {
                $zip {
                    $($input: Arc::new($input),)+
                    zipper: With(f),
                }
            }
        }

        impl<$($ty,)+ Z: Clone> Clone for $zip<$($ty,)+ Z> {
            fn clone(&self) -> Self {
                Self {
                    $($input: self.$input.clone(),)+
                    zipper: self.zipper.clone(),
                }
            }
        }

        impl<$($ty,)+ Z> Source for $zip<$($ty,)+ Z>
        where
            $($ty: Source + 'static,)+
            Z: Zipper<($($ty::Item,)+)>,
        {
            type Item = Z::Output;

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
                if token.is_cancelled() {
                    return Ok(Reduced::Done(state));
                }
                let mut scope = TaskScope::new($label, token);
                $(
                    let (writer, mut $input) = channel();
                    scope.fork_producer(self.$input.clone(), writer);
                )+
                tracing::trace!(combinator = $label, producers = scope.len(), "zip started");

                let result = loop {
                    let round = tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        round = async { tokio::join!($(ready(&mut $input)),+) } => Some(round),
                    };
                    let Some(round) = round else {
                        break Ok(Reduced::Done(state));
                    };
                    let items = match round {
                        ($(Ok($input),)+) => ($($input,)+),
                        ($($input,)+) => {
                            let halt = [$($input.err()),+]
                                .into_iter()
                                .flatten()
                                .reduce(Halt::prevailing);
                            match halt {
                                Some(Halt::Fault(err)) => break Err(err),
                                _ => break Ok(Reduced::Done(state)),
                            }
                        }
                    };
                    SOURCE_METRICS.items[&$label].inc();
                    match reducer.step(state, self.zipper.zip(items)).await {
                        Ok(Reduced::Continue(next)) => state = next,
                        other => break other,
                    }
                };
                scope.close_with(result).await
            }
        }
    };
}

zip_source!(
    /// Pairs two sources positionally; see [`Zip2::with`] for a combining function.
    Zip2, "zip2", a: A, b: B
);
zip_source!(
    /// Three-way [`Zip2`].
    Zip3, "zip3", a: A, b: B, c: C
);
zip_source!(
    /// Four-way [`Zip2`].
    Zip4, "zip4", a: A, b: B, c: C, d: D
);

pub fn zip3<A, B, C>(a: A, b: B, c: C) -> Zip3<A, B, C> {
    Zip3::new(a, b, c)
}

pub fn zip4<A, B, C, D>(a: A, b: B, c: C, d: D) -> Zip4<A, B, C, D> {
    Zip4::new(a, b, c, d)
}

/// Applicative application: the `i`-th function is applied to the `i`-th value.
pub type Apply<Fs, Xs> = Zip2<Fs, Xs, Applied>;

pub fn apply<Fs, Xs>(functions: Fs, values: Xs) -> Apply<Fs, Xs> {
    Zip2 {
        a: Arc::new(functions),
        b: Arc::new(values),
        zipper: Applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Liveness;
    use crate::{SourceError, SourceExt, forever, iter, pure, reducer};
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[tokio::test]
    async fn zip_truncates_to_the_shortest_input() {
        let token = CancellationToken::new();
        let pairs = iter(vec![1, 2, 3])
            .zip(iter(vec![10, 20]))
            .collect(&token)
            .await
            .unwrap();
        assert_eq!(pairs, vec![(1, 10), (2, 20)]);

        let counting = reducer(|n: usize, _: (i32, i32)| async move { Ok(Reduced::Continue(n + 1)) });
        let reduced = iter(vec![1, 2, 3])
            .zip(iter(Vec::<i32>::new()))
            .reduce(0, &counting, &token)
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wider_zips_and_combining_functions() {
        let token = CancellationToken::new();
        let sums = Zip2::with(iter(0..5), forever(100), |a, b| a + b)
            .collect(&token)
            .await
            .unwrap();
        assert_eq!(sums, vec![100, 101, 102, 103, 104]);

        let triples = zip3(iter("abc".chars()), iter(1..), pure(true))
            .collect(&token)
            .await
            .unwrap();
        assert_eq!(triples, vec![('a', 1, true)]);

        let words = Zip4::with(
            iter(["a", "b"]),
            iter(["c", "d"]),
            iter(["e", "f", "g"]),
            forever("!"),
            |a, b, c, d| format!("{a}{b}{c}{d}"),
        )
        .collect(&token)
        .await
        .unwrap();
        assert_eq!(words, vec!["ace!", "bdf!"]);
    }

    #[tokio::test]
    async fn apply_is_positional() {
        let functions: Vec<fn(i32) -> i32> = vec![|x| x + 1, |x| x * 2, |x| -x];
        let applied = apply(iter(functions), iter(vec![10, 20, 30, 40]))
            .collect(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(applied, vec![11, 40, -30]);
    }

    #[tokio::test]
    async fn producer_fault_fails_the_join() {
        let liveness = Liveness::default();
        let failing = iter(0..).try_map(|x: u32| {
            anyhow::ensure!(x < 3, "input {x} rejected");
            Ok(x)
        });
        let err = liveness
            .track(failing)
            .zip(liveness.track(forever('z')))
            .collect(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "input 3 rejected");
        assert_eq!(liveness.started(), 2);
        assert_eq!(liveness.live(), 0);
    }

    #[tokio::test]
    async fn early_done_cancels_infinite_producers() {
        let liveness = Liveness::default();
        let zipped = liveness.track(forever(1)).zip(liveness.track(forever(2)));
        let pairs = zipped
            .clone()
            .take(25)
            .collect(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(pairs, vec![(1, 2); 25]);
        assert_eq!(liveness.live(), 0);

        // every reduction starts fresh producers
        let again = zipped.take(1).collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(again, vec![(1, 2)]);
        assert_eq!(liveness.started(), 4);
        assert_eq!(liveness.live(), 0);
    }

    #[tokio::test]
    async fn reducer_fault_cancels_producers() {
        let liveness = Liveness::default();
        let failing = reducer(|_: (), (a, _): (u32, u32)| async move {
            anyhow::ensure!(a == 0, "reducer stopped");
            Ok(Reduced::Continue(()))
        });
        let result = liveness
            .track(iter(0u32..))
            .zip(liveness.track(forever(0u32)))
            .reduce((), &failing, &CancellationToken::new())
            .await;
        assert_matches!(result, Err(err) if err.to_string() == "reducer stopped");
        assert_eq!(liveness.live(), 0);
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_the_reducer() {
        let liveness = Liveness::default();
        let token = CancellationToken::new();
        token.cancel();
        let reduced = liveness
            .track(forever(1))
            .zip(liveness.track(forever(2)))
            .reduce(
                "initial",
                &reducer(|_: &str, _: (i32, i32)| async move { Ok(Reduced::Continue("called")) }),
                &token,
            )
            .await
            .unwrap();
        assert_eq!(reduced, Reduced::Done("initial"));
        assert_eq!(liveness.started(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fault_wins_over_a_closed_sibling_in_the_same_round() {
        // round 1 sees `b` fail while `a` has ended; the fault must surface every time
        for _ in 0..64 {
            let failing = iter(0u32..).try_map(|x| {
                anyhow::ensure!(x < 1, "input {x} rejected");
                Ok(x)
            });
            let result = iter(vec![7u32])
                .zip(failing)
                .collect(&CancellationToken::new())
                .await;
            assert_matches!(result, Err(err) if err.to_string() == "input 1 rejected");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_panicking_producer_fails_the_join() {
        let liveness = Liveness::default();
        let exploding = iter(0u32..).map(|x| {
            assert!(x != 3, "producer exploded at {x}");
            x
        });
        let zipped = liveness.track(exploding).zip(liveness.track(forever('z')));
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), zipped.count(&CancellationToken::new())).await;
        let err = outcome.expect("zip kept running after a producer panic").unwrap_err();
        assert_matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::TaskPanicked { task: "zip2", message }) if message == "producer exploded at 3"
        );
        assert_eq!(liveness.live(), 0);
    }
}
