//! Run state machine shared by every dispatch-based driver.
//!
//! ```text
//! Idle -> Planned -> Dispatched -> Completed -> Reduced -> Idle
//!           |            |
//!           +-> Aborted <+
//! ```

use crate::error::{OffloadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// Geometry fixed.
    Planned,
    /// Device executing.
    Dispatched,
    /// Output transferred to the host.
    Completed,
    /// Final scalar or array available.
    Reduced,
    /// Terminal.
    Aborted,
}

impl RunState {
    fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Planned)
                | (Planned, Dispatched)
                | (Dispatched, Completed)
                | (Completed, Reduced)
                | (Reduced, Idle)
                | (Planned, Aborted)
                | (Dispatched, Aborted)
        )
    }
}

/// Tracks one run through the state machine.
#[derive(Debug)]
pub struct Lifecycle {
    label: &'static str,
    state: RunState,
}

impl Lifecycle {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(OffloadError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(run = self.label, from = ?self.state, to = ?next, "run transition");
        self.state = next;
        Ok(())
    }

    /// Run `step` and advance to `next` on success. A failure while
    /// `Planned` or `Dispatched` moves the run to `Aborted`.
    pub fn step<T>(&mut self, next: RunState, step: impl FnOnce() -> Result<T>) -> Result<T> {
        match step() {
            Ok(v) => {
                self.advance(next)?;
                Ok(v)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Enter `Aborted` if the current state allows it.
    pub fn abort(&mut self) {
        if self.state.can_advance_to(RunState::Aborted) {
            tracing::debug!(run = self.label, from = ?self.state, "run aborted");
            self.state = RunState::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut run = Lifecycle::new("sum");
        for next in [
            RunState::Planned,
            RunState::Dispatched,
            RunState::Completed,
            RunState::Reduced,
            RunState::Idle,
        ] {
            run.advance(next).unwrap();
        }
        assert_eq!(run.state(), RunState::Idle);
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut run = Lifecycle::new("sum");
        let err = run.advance(RunState::Dispatched).unwrap_err();
        assert!(matches!(
            err,
            OffloadError::InvalidTransition {
                from: RunState::Idle,
                to: RunState::Dispatched
            }
        ));
    }

    #[test]
    fn test_failed_step_aborts() {
        let mut run = Lifecycle::new("sum");
        run.advance(RunState::Planned).unwrap();
        let res: Result<()> = run.step(RunState::Dispatched, || {
            Err(OffloadError::dispatch("enqueueing", "queue lost"))
        });
        assert!(res.is_err());
        assert_eq!(run.state(), RunState::Aborted);
        assert!(run.advance(RunState::Idle).is_err());
    }

    #[test]
    fn test_abort_only_from_planned_or_dispatched() {
        let mut run = Lifecycle::new("sum");
        run.abort();
        assert_eq!(run.state(), RunState::Idle);
    }
}
