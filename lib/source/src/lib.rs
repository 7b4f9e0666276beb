//! Rill: push-based Source reduction engine
//!
//! A [`Source`] describes an asynchronous, possibly infinite, producing process.
//! Nothing runs until it is reduced: [`Source::reduce`] pushes every item into a
//! [`Reducer`] that threads a state and decides after each item whether to
//! continue, see [`Reduced`].
//!
//! # Core Concepts
//!
//! - **Leaves**: [`empty`], [`pure`], [`forever`], [`iter`], [`from_stream`],
//!   [`from_observable`], [`reader`]
//! - **Unary combinators**: [`Map`], [`TryMap`], [`Bind`], [`Take`], [`Transform`]
//! - **Concurrent combinators**: [`Zip2`]/[`Zip3`]/[`Zip4`]/[`Apply`] join inputs
//!   positionally, [`Choose`] merges them in arrival order. Both fork one producer
//!   per input and never let a producer outlive the reduction.
//! - **Sequential combinators**: [`Combine`], [`Concat`]
//! - **Broadcast**: [`MultiListener`] shares one upstream among subscribers while
//!   anyone listens.
//!
//! Cancellation is cooperative through a [`CancellationToken`] and ends a
//! reduction with `Done`, never with an error.

mod bind;
mod boxed;
pub mod channel;
mod choose;
mod combine;
mod error;
mod iter;
mod leaf;
mod map;
mod metrics;
mod multi_listener;
pub mod observable;
mod reader;
mod reduced;
mod reducer;
pub mod runtime;
mod take;
#[cfg(test)]
mod testing;
mod traits;
pub mod transform;
pub mod zip;

pub use bind::Bind;
pub use boxed::BoxSource;
pub use channel::{ChannelReader, ChannelWriter, channel};
pub use choose::{Choose, choose};
pub use combine::{Combine, Concat, combine};
pub use error::SourceError;
pub use iter::{FromStream, Iter, from_stream, iter};
pub use leaf::{Empty, Forever, Pure, empty, forever, pure};
pub use map::{Map, TryMap};
pub use metrics::{SOURCE_METRICS, SourceMetrics};
pub use multi_listener::MultiListener;
pub use observable::{Observable, ObservableSource, Observer, Subscription, from_observable};
pub use reader::{Reader, reader};
pub use reduced::Reduced;
pub use reducer::{FnReducer, Reducer, reducer};
pub use runtime::{ForkHandle, TaskScope, fork};
pub use traits::{Source, SourceExt};
pub use transform::{Transducer, Transform};
pub use zip::{Apply, Zip2, Zip3, Zip4, apply, zip3, zip4};

pub use tokio_util::sync::CancellationToken;
