use crate::generic_component_state::{GenericComponentState, StateLabel};
use crate::metrics::GENERAL_METRICS;
use std::fmt;
use std::time::Instant;

/// Accounts the time a component spends in each of its states.
///
/// The time spent in the current state is reported on every transition and
/// when the tracker is dropped, so a component that stops mid-state is still
/// accounted for.
pub struct ComponentStateTracker<S: StateLabel = GenericComponentState> {
    component: &'static str,
    current_state: S,
    entered_at: Instant,
}

impl<S: StateLabel> ComponentStateTracker<S> {
    pub fn new(component: &'static str, initial_state: S) -> Self {
        Self {
            component,
            current_state: initial_state,
            entered_at: Instant::now(),
        }
    }

    pub fn current_state(&self) -> S {
        self.current_state
    }

    pub fn enter_state(&mut self, new_state: S) {
        self.flush();
        self.current_state = new_state;
    }

    fn flush(&mut self) {
        let now = Instant::now();
        let spent = now.duration_since(self.entered_at);
        let state = self.current_state;
        GENERAL_METRICS.component_time_spent_in_state
            [&(self.component, state.generic(), state.specific())]
            .inc_by(spent.as_secs_f64());
        self.entered_at = now;
    }
}

impl<S: StateLabel> Drop for ComponentStateTracker<S> {
    fn drop(&mut self) {
        self.flush();
    }
}

impl<S: StateLabel + fmt::Debug> fmt::Debug for ComponentStateTracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStateTracker")
            .field("component", &self.component)
            .field("current_state", &self.current_state)
            .field("in_state_for", &self.entered_at.elapsed())
            .finish()
    }
}
