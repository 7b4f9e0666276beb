use crate::{Reduced, Reducer};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

enum Message<T> {
    Item(T),
    Fault(anyhow::Error),
}

/// Creates an unbounded channel.
///
/// The channel completes once every [`ChannelWriter`] clone has been dropped;
/// a writer may also complete it with a fault via [`ChannelWriter::fail`].
pub fn channel<T>() -> (ChannelWriter<T>, ChannelReader<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelWriter { tx }, ChannelReader::new(rx))
}

/// Writing half of a [`channel`].
#[derive(Debug)]
pub struct ChannelWriter<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
}

impl<T> Clone for ChannelWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> ChannelWriter<T> {
    /// Enqueues an item. Returns `false` if the reader is gone.
    pub fn send(&self, item: T) -> bool {
        self.tx.send(Message::Item(item)).is_ok()
    }

    /// Completes the channel with a fault.
    /// Items enqueued before the fault are still delivered first.
    pub fn fail(self, err: anyhow::Error) {
        if self.tx.send(Message::Fault(err)).is_err() {
            tracing::trace!("fault dropped, channel reader is gone");
        }
    }

    /// Returns `true` once the reader has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Writing into a channel is the reducer every forked producer runs with:
/// it never consumes the state and only stops once nobody reads anymore.
impl<T: Send + 'static> Reducer<T, ()> for ChannelWriter<T> {
    fn step(&self, state: (), item: T) -> BoxFuture<'_, anyhow::Result<Reduced<()>>> {
        let reduced = if self.send(item) {
            Reduced::Continue(state)
        } else {
            Reduced::Done(state)
        };
        Box::pin(futures::future::ready(Ok(reduced)))
    }
}

/// Reading half of a [`channel`].
///
/// Semantics:
/// - `recv().await` yields `Ok(Some(item))` in FIFO order, `Ok(None)` once the
///   channel completed and is drained, `Err(fault)` when a writer failed it.
/// - Items put back with [`prepend`](Self::prepend) are returned before anything
///   still queued in the channel.
#[derive(Debug)]
pub struct ChannelReader<T> {
    rx: mpsc::UnboundedReceiver<Message<T>>,
    buf: VecDeque<T>,
    faulted: bool,
}

impl<T> std::fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item(_) => f.write_str("Item"),
            Self::Fault(err) => write!(f, "Fault({err:#})"),
        }
    }
}

impl<T> ChannelReader<T> {
    fn new(rx: mpsc::UnboundedReceiver<Message<T>>) -> Self {
        Self {
            rx,
            buf: VecDeque::new(),
            faulted: false,
        }
    }

    /// Puts items back at the head; they are consumed first, in the given order.
    pub fn prepend(&mut self, items: Vec<T>) {
        for item in items.into_iter().rev() {
            self.buf.push_front(item);
        }
    }

    /// Receives the next item, awaiting if necessary. Cancel-safe.
    pub async fn recv(&mut self) -> anyhow::Result<Option<T>> {
        if let Some(item) = self.buf.pop_front() {
            return Ok(Some(item));
        }
        if self.faulted {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(message) => self.unpack(message),
            None => Ok(None),
        }
    }

    /// Tries to receive the next item without waiting.
    /// `Ok(None)` means "nothing right now", not "completed"; see [`is_completed`](Self::is_completed).
    pub fn try_recv(&mut self) -> anyhow::Result<Option<T>> {
        if let Some(item) = self.buf.pop_front() {
            return Ok(Some(item));
        }
        if self.faulted {
            return Ok(None);
        }
        match self.rx.try_recv() {
            Ok(message) => self.unpack(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn unpack(&mut self, message: Message<T>) -> anyhow::Result<Option<T>> {
        match message {
            Message::Item(item) => Ok(Some(item)),
            Message::Fault(err) => {
                // a fault completes the channel: nothing written afterwards is delivered
                self.faulted = true;
                self.rx.close();
                Err(err)
            }
        }
    }

    /// Returns `true` if no more items will ever be returned.
    pub fn is_completed(&self) -> bool {
        self.buf.is_empty() && (self.faulted || (self.rx.is_closed() && self.rx.is_empty()))
    }

    /// Stops accepting new items; already queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Number of queued items, including the prepended ones.
    pub fn len(&self) -> usize {
        self.buf.len() + self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.rx.is_empty()
    }
}
