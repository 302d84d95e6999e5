use std::sync::{Arc, Condvar, Mutex};

/// Completion signal carried by an `Event` task.
///
/// The event task itself is pixel-free: it blocks on its declared
/// dependencies and then fires this signal with the overall success of that
/// dependency set. The signal settles exactly once.
pub struct EventSignal {
    state: Mutex<Option<bool>>,
    cond: Condvar,
}

impl EventSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            cond: Condvar::new(),
        })
    }

    /// Settle the signal. Later calls keep the first value.
    pub fn fire(&self, success: bool) {
        if let Ok(mut state) = self.state.lock() {
            if state.is_none() {
                *state = Some(success);
            }
            self.cond.notify_all();
        }
    }

    /// Non-blocking observation. `None` until the event settles.
    pub fn try_get(&self) -> Option<bool> {
        self.state.lock().ok().and_then(|s| *s)
    }

    /// Block until the event settles. A poisoned signal reads as failure.
    pub fn wait(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        while state.is_none() {
            state = match self.cond.wait(state) {
                Ok(s) => s,
                Err(_) => return false,
            };
        }
        state.unwrap_or(false)
    }
}

impl std::fmt::Debug for EventSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSignal")
            .field("settled", &self.try_get())
            .finish()
    }
}
