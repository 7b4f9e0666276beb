/// Result of a single reduction step, and of a whole reduction.
///
/// `Continue` asks the producer for more items, `Done` stops it.
/// Once a reducer has returned `Done` it must not be called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduced<S> {
    Continue(S),
    Done(S),
}

impl<S> Reduced<S> {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    pub fn state(&self) -> &S {
        match self {
            Self::Continue(state) | Self::Done(state) => state,
        }
    }

    pub fn into_state(self) -> S {
        match self {
            Self::Continue(state) | Self::Done(state) => state,
        }
    }

    /// Maps the state while keeping the termination flag.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Reduced<T> {
        match self {
            Self::Continue(state) => Reduced::Continue(f(state)),
            Self::Done(state) => Reduced::Done(f(state)),
        }
    }

    /// Forces termination, keeping the state.
    pub fn into_done(self) -> Self {
        Self::Done(self.into_state())
    }
}
