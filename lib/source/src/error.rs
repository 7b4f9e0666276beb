use std::any::Any;
use std::sync::Arc;

/// Failures raised by the engine itself.
///
/// Faults coming from user producers and reducers are plain `anyhow::Error`s and
/// travel unchanged; this type only wraps them where they have to be shared or
/// moved across a task boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// A producer on the other side of a channel failed.
    /// Shared because a broadcast hub hands the same fault to every subscriber.
    #[error("producer failed: {0:#}")]
    ProducerFault(Arc<anyhow::Error>),
    #[error("forked task `{task}` panicked: {message}")]
    TaskPanicked { task: &'static str, message: String },
    #[error("erased reduction state does not have the expected type")]
    StateTypeMismatch,
}

impl SourceError {
    pub(crate) fn from_panic(task: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_owned());
        Self::TaskPanicked { task, message }
    }

    pub(crate) fn from_join_error(task: &'static str, err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::from_panic(task, err.into_panic())
        } else {
            Self::TaskPanicked {
                task,
                message: "task was aborted".to_owned(),
            }
        }
    }
}
