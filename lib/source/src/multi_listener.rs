//! Hot broadcast hub.
//!
//! A [`MultiListener`] owns one upstream channel and forwards every item to
//! all currently attached subscribers. Every `reduce` call on the hub is a
//! subscription. The pump reading the upstream only runs while at least one
//! subscriber is attached; items are never replayed to late subscribers.
//! Items the last subscriber left unread, or that the pump read after it
//! left, are put back and go to whoever subscribes next.
//!
//! Start and stop transitions of the pump happen under one lock, so two
//! subscribers attaching at once can never start two pumps. Each start opens a
//! new generation; a pump that outlived its generation delivers nothing.

use crate::channel::{ChannelReader, ChannelWriter, channel};
use crate::error::SourceError;
use crate::metrics::SOURCE_METRICS;
use crate::runtime::{ForkHandle, fork};
use crate::{Reduced, Reducer, Source};
use dashmap::DashMap;
use futures::FutureExt;
use rill_observability::{ComponentStateTracker, GenericComponentState, StateLabel};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpState {
    WaitingUpstream,
    Broadcasting,
}

impl StateLabel for PumpState {
    fn generic(&self) -> GenericComponentState {
        match self {
            Self::WaitingUpstream => GenericComponentState::WaitingRecv,
            Self::Broadcasting => GenericComponentState::WaitingSend,
        }
    }

    fn specific(&self) -> &'static str {
        match self {
            Self::WaitingUpstream => "waiting_upstream",
            Self::Broadcasting => "broadcasting",
        }
    }
}

/// How the upstream ended. Kept so that later subscribers end the same way.
#[derive(Debug, Clone)]
enum Terminal {
    Completed,
    Faulted(SourceError),
}

impl Terminal {
    fn deliver<A>(&self, listener: ChannelWriter<A>) {
        match self {
            Self::Completed => drop(listener),
            Self::Faulted(err) => listener.fail(err.clone().into()),
        }
    }
}

#[derive(Debug)]
struct PumpControl<A> {
    /// Parent of every pump token, independent from the subscribers' tokens.
    root: CancellationToken,
    running: Option<ForkHandle<()>>,
    /// Bumped on every pump start.
    generation: u64,
    /// Already read from the upstream but not consumed by anyone.
    unclaimed: Vec<A>,
    terminal: Option<Terminal>,
}

#[derive(Debug)]
struct Hub<A> {
    upstream: tokio::sync::Mutex<ChannelReader<A>>,
    listeners: DashMap<u64, ChannelWriter<A>>,
    next_id: AtomicU64,
    subscribers: AtomicUsize,
    control: parking_lot::Mutex<PumpControl<A>>,
}

impl<A: Clone + Send + Sync + 'static> Hub<A> {
    fn attach(self: &Arc<Self>) -> Listener<A> {
        let (writer, channel) = channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut control = self.control.lock();
        if let Some(terminal) = &control.terminal {
            terminal.deliver(writer);
            return Listener {
                id,
                channel,
                hub: None,
            };
        }

        self.listeners.insert(id, writer);
        SOURCE_METRICS.broadcast_subscribers.inc_by(1);
        let previous = self.subscribers.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(subscriber = id, subscribers = previous + 1, "subscriber attached");
        if previous == 0 {
            control.generation += 1;
            let generation = control.generation;
            let hub = self.clone();
            control.running = Some(fork("broadcast", &control.root, move |token| {
                pump(hub, generation, token)
            }));
            SOURCE_METRICS.pump_starts.inc();
            tracing::debug!(generation, "broadcast pump started");
        }
        Listener {
            id,
            channel,
            hub: Some(self.clone()),
        }
    }

    fn detach(&self, id: u64, channel: &mut ChannelReader<A>) {
        let mut control = self.control.lock();
        self.listeners.remove(&id);
        SOURCE_METRICS.broadcast_subscribers.dec_by(1);
        let previous = self.subscribers.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(subscriber = id, subscribers = previous - 1, "subscriber detached");
        if previous == 1 {
            while let Ok(Some(item)) = channel.try_recv() {
                control.unclaimed.push(item);
            }
            if let Some(pump) = control.running.take() {
                pump.cancel();
                tracing::debug!(
                    unclaimed = control.unclaimed.len(),
                    "last subscriber detached, broadcast pump stopped"
                );
            }
        }
    }

    /// Hands `item` to every subscriber. Gives it back if the pump is stale or
    /// nobody is listening.
    fn broadcast(&self, item: A, generation: u64) -> Option<A> {
        let control = self.control.lock();
        if control.generation != generation || control.running.is_none() || self.listeners.is_empty() {
            return Some(item);
        }
        for listener in self.listeners.iter() {
            listener.value().send(item.clone());
        }
        SOURCE_METRICS.items[&"broadcast"].inc();
        None
    }

    fn is_current(&self, generation: u64) -> bool {
        let control = self.control.lock();
        control.generation == generation && control.running.is_some()
    }

    fn finish(&self, terminal: Terminal, generation: u64) {
        let mut control = self.control.lock();
        let terminal = control.terminal.get_or_insert(terminal).clone();
        for listener in self.listeners.iter() {
            terminal.deliver(listener.value().clone());
        }
        // dropping the registered writers completes the listener channels
        self.listeners.clear();
        if control.generation == generation {
            control.running = None;
        }
    }
}

async fn pump<A: Clone + Send + Sync + 'static>(
    hub: Arc<Hub<A>>,
    generation: u64,
    token: CancellationToken,
) {
    let outcome = AssertUnwindSafe(drive(&hub, generation, &token))
        .catch_unwind()
        .await;
    let terminal = match outcome {
        Ok(Some(terminal)) => terminal,
        Ok(None) => return,
        Err(payload) => {
            let err = SourceError::from_panic("broadcast", payload);
            tracing::warn!(generation, "broadcast pump failed: {err}");
            SOURCE_METRICS.faults[&"broadcast"].inc();
            Terminal::Faulted(err)
        }
    };
    hub.finish(terminal, generation);
}

/// Forwards upstream items until cancelled or the upstream ends.
/// Returns `None` when the pump stopped without the upstream ending.
async fn drive<A: Clone + Send + Sync + 'static>(
    hub: &Hub<A>,
    generation: u64,
    token: &CancellationToken,
) -> Option<Terminal> {
    let mut tracker = ComponentStateTracker::new("broadcast_pump", PumpState::WaitingUpstream);
    let mut upstream = tokio::select! {
        biased;
        _ = token.cancelled() => return None,
        upstream = hub.upstream.lock() => upstream,
    };
    let unclaimed = std::mem::take(&mut hub.control.lock().unclaimed);
    upstream.prepend(unclaimed);
    loop {
        tracker.enter_state(PumpState::WaitingUpstream);
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            next = upstream.recv() => next,
        };
        match next {
            Ok(Some(item)) => {
                tracker.enter_state(PumpState::Broadcasting);
                if let Some(item) = hub.broadcast(item, generation) {
                    upstream.prepend(vec![item]);
                    return None;
                }
            }
            Ok(None) if !hub.is_current(generation) => return None,
            Ok(None) => {
                tracing::debug!("broadcast upstream completed");
                return Some(Terminal::Completed);
            }
            Err(err) => {
                tracing::warn!("broadcast upstream failed: {err:#}");
                SOURCE_METRICS.faults[&"broadcast"].inc();
                return Some(Terminal::Faulted(SourceError::ProducerFault(Arc::new(err))));
            }
        }
    }
}

/// One subscription; dropping it detaches from the hub.
struct Listener<A: Clone + Send + Sync + 'static> {
    id: u64,
    channel: ChannelReader<A>,
    /// `None` when attached after the upstream ended.
    hub: Option<Arc<Hub<A>>>,
}

impl<A: Clone + Send + Sync + 'static> Drop for Listener<A> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.take() {
            hub.detach(self.id, &mut self.channel);
        }
    }
}

/// Reference-counted hot broadcast of an upstream channel.
///
/// Clones share the same hub. If the upstream fails, every attached
/// subscriber fails with [`SourceError::ProducerFault`]; a panic while
/// forwarding fails them with [`SourceError::TaskPanicked`]. Subscribers
/// attached after the upstream ended finish right away with the same outcome.
#[derive(Debug)]
pub struct MultiListener<A> {
    hub: Arc<Hub<A>>,
}

impl<A> Clone for MultiListener<A> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
        }
    }
}

impl<A: Clone + Send + Sync + 'static> MultiListener<A> {
    pub fn new(upstream: ChannelReader<A>) -> Self {
        Self {
            hub: Arc::new(Hub {
                upstream: tokio::sync::Mutex::new(upstream),
                listeners: DashMap::new(),
                next_id: AtomicU64::new(0),
                subscribers: AtomicUsize::new(0),
                control: parking_lot::Mutex::new(PumpControl {
                    root: CancellationToken::new(),
                    running: None,
                    generation: 0,
                    unclaimed: Vec::new(),
                    terminal: None,
                }),
            }),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscribers.load(Ordering::SeqCst)
    }

    /// Returns `true` while a pump is attached to the upstream.
    pub fn is_pumping(&self) -> bool {
        self.hub.control.lock().running.is_some()
    }
}

impl<A: Clone + Send + Sync + 'static> Source for MultiListener<A> {
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
        if token.is_cancelled() {
            return Ok(Reduced::Done(state));
        }
        let mut listener = self.hub.attach();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Reduced::Done(state)),
                next = listener.channel.recv() => next?,
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
