use vise::EncodeLabelValue;

/// Coarse state shared by every tracked component, so that components can be
/// compared on a single dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(label = "state", rename_all = "snake_case")]
pub enum GenericComponentState {
    /// Nothing to do, e.g. a broadcast hub without subscribers.
    Idle,
    WaitingRecv,
    Processing,
    WaitingSend,
}

/// Component-specific state, reported together with its generic counterpart.
pub trait StateLabel: Copy + Send + Sync + 'static {
    fn generic(&self) -> GenericComponentState;
    fn specific(&self) -> &'static str;
}

impl StateLabel for GenericComponentState {
    fn generic(&self) -> GenericComponentState {
        *self
    }

    fn specific(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingRecv => "waiting_recv",
            Self::Processing => "processing",
            Self::WaitingSend => "waiting_send",
        }
    }
}
