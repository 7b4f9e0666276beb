//! Task runtime used by the concurrent combinators.
//!
//! Two primitives:
//! - [`fork`] starts a single background unit of work and returns a [`ForkHandle`]
//!   that can be cancelled and awaited;
//! - [`TaskScope`] is a nursery: every task forked into it is cancelled and awaited
//!   by [`TaskScope::close`], and aborted if the scope is dropped instead.
//!
//! Both derive a child [`CancellationToken`] from the caller's token, so cancelling
//! the ambient token reaches every forked task.

use crate::channel::ChannelWriter;
use crate::error::SourceError;
use crate::metrics::SOURCE_METRICS;
use crate::Source;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Keeps `active_tasks` accurate whether the task completes or is aborted.
struct ActiveTaskGuard {
    combinator: &'static str,
}

impl ActiveTaskGuard {
    fn enter(combinator: &'static str) -> Self {
        SOURCE_METRICS.forked_tasks[&combinator].inc();
        SOURCE_METRICS.active_tasks[&combinator].inc_by(1);
        Self { combinator }
    }
}

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        SOURCE_METRICS.active_tasks[&self.combinator].dec_by(1);
    }
}

fn instrumented<F: Future>(combinator: &'static str, f: F) -> impl Future<Output = F::Output> {
    let guard = ActiveTaskGuard::enter(combinator);
    async move {
        let _guard = guard;
        f.await
    }
}

/// Handle to work started with [`fork`].
///
/// Dropping the handle cancels the task's token; the task itself is expected to
/// observe it and wind down.
#[derive(Debug)]
pub struct ForkHandle<T> {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<T>,
    _cancel_on_drop: DropGuard,
}

/// Starts `f` on the runtime with a child of `parent`.
pub fn fork<F, Fut>(name: &'static str, parent: &CancellationToken, f: F) -> ForkHandle<Fut::Output>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let token = parent.child_token();
    let handle = tokio::spawn(instrumented(name, f(token.clone())));
    tracing::trace!(task = name, "forked task");
    ForkHandle {
        name,
        _cancel_on_drop: token.clone().drop_guard(),
        token,
        handle,
    }
}

impl<T> ForkHandle<T> {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Awaits the task. A panic inside it is reported as [`SourceError::TaskPanicked`].
    pub async fn join(self) -> Result<T, SourceError> {
        let Self {
            name,
            handle,
            _cancel_on_drop,
            ..
        } = self;
        handle
            .await
            .map_err(|err| SourceError::from_join_error(name, err))
    }

    pub async fn cancel_and_join(self) -> Result<T, SourceError> {
        self.cancel();
        self.join().await
    }
}

/// Nursery of tasks that must not outlive the reduction that forked them.
#[derive(Debug)]
pub struct TaskScope {
    name: &'static str,
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl TaskScope {
    pub fn new(name: &'static str, parent: &CancellationToken) -> Self {
        Self {
            name,
            token: parent.child_token(),
            tasks: JoinSet::new(),
        }
    }

    /// Token shared by every task of the scope.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn fork<F>(&mut self, f: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(instrumented(self.name, f));
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancels every task and waits for all of them to terminate.
    /// Returns the first panic observed, if any.
    pub async fn close(mut self) -> Result<(), SourceError> {
        self.token.cancel();
        let mut first_panic = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined
                && first_panic.is_none()
            {
                first_panic = Some(SourceError::from_join_error(self.name, err));
            }
        }
        tracing::trace!(scope = self.name, "task scope closed");
        first_panic.map_or(Ok(()), Err)
    }

    /// Closes the scope and merges its outcome with the reader's `result`.
    /// The reader's own fault wins over a task panic.
    pub async fn close_with<T>(self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        let closed = self.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Forks a producer that reduces `source` into `writer`.
    ///
    /// The channel completes when the source ends (normally or through
    /// cancellation) and is completed with the fault if the source fails.
    /// A panic is a fault too, reported as [`SourceError::TaskPanicked`], so the
    /// reader learns about it without waiting for the scope to be joined.
    pub fn fork_producer<T>(&mut self, source: Arc<T>, writer: ChannelWriter<T::Item>)
    where
        T: Source + 'static,
    {
        let token = self.token.clone();
        let combinator = self.name;
        self.fork(async move {
            let reduced = AssertUnwindSafe(source.reduce((), &writer, &token))
                .catch_unwind()
                .await;
            let err = match reduced {
                Ok(Ok(_)) => return,
                Ok(Err(err)) => err,
                Err(payload) => SourceError::from_panic(combinator, payload).into(),
            };
            tracing::debug!(combinator, "producer failed: {err:#}");
            SOURCE_METRICS.faults[&combinator].inc();
            writer.fail(err);
        });
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        // JoinSet aborts remaining tasks on drop; cancelling first lets
        // producers that are mid-step observe the token.
        self.token.cancel();
    }
}
