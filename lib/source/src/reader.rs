use crate::channel::ChannelReader;
use crate::{Reduced, Reducer, Source};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Source draining an externally supplied channel.
///
/// The channel is shared by every clone of the reader and by every reduction:
/// an item is delivered to exactly one of them. Concurrent reductions take
/// turns, a reduction holds the channel until it returns.
#[derive(Debug)]
pub struct Reader<A> {
    channel: Arc<Mutex<ChannelReader<A>>>,
}

pub fn reader<A>(channel: ChannelReader<A>) -> Reader<A> {
    Reader {
        channel: Arc::new(Mutex::new(channel)),
    }
}

impl<A> Clone for Reader<A> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<A: Send + 'static> Source for Reader<A> {
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
        let mut channel = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Reduced::Done(state)),
            channel = self.channel.lock() => channel,
        };
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Reduced::Done(state)),
                next = channel.recv() => next?,
            };
            let Some(item) = next else {
                return Ok(Reduced::Continue(state));
            };
            match reducer.step(state, item).await? {
                Reduced::Continue(next) => state = next,
                done @ Reduced::Done(_) => return Ok(done),
            }
        }
    }
}
