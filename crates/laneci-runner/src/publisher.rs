//! Ordered fan-out of output rows.

use laneci_core::BuildRunnerOutputRow;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Handler = Box<dyn FnMut(&BuildRunnerOutputRow) + Send>;

#[derive(Default)]
struct State {
    handlers: Vec<Handler>,
    closed: bool,
}

/// Delivers each row to every subscriber in registration order.
///
/// A publish holds the lock for the whole fan-out, so two publishes never
/// interleave. Rows published after [`close`](Self::close) are dropped.
#[derive(Default)]
pub struct OutputPublisher {
    state: Mutex<State>,
}

impl OutputPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: FnMut(&BuildRunnerOutputRow) + Send + 'static,
    {
        self.lock().handlers.push(Box::new(handler));
    }

    /// Returns `false` if the publisher was already closed.
    pub fn publish(&self, row: &BuildRunnerOutputRow) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        for handler in state.handlers.iter_mut() {
            handler(row);
        }
        true
    }

    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
