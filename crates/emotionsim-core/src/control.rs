//! Run control state shared between the tick loop and the control API.
//!
//! The status field is the single source of truth for the run lifecycle
//! state machine; every command is validated against it. Stop is a request flag
//! the loop observes at its suspension points: the in-flight agent turn
//! completes and its step persists before the loop exits. `step` enqueues
//! a single-tick request consumed while paused.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

use emotionsim_types::{ControlAction, RunStatus};

use crate::error::EngineError;

/// Shared control state for one run.
///
/// Wrapped in an `Arc` and shared between the engine task and control
/// handlers.
#[derive(Debug)]
pub struct RunControl {
    /// Current lifecycle status.
    status: Mutex<RunStatus>,
    /// Wakes the loop on any command.
    notify: Notify,
    /// Set when a stop was requested; observed at suspension points.
    stop_requested: AtomicBool,
    /// Pending single-tick requests (consumed while paused).
    step_requests: AtomicU64,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    /// Create control state for a pending run.
    pub fn new() -> Self {
        Self {
            status: Mutex::new(RunStatus::Pending),
            notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            step_requests: AtomicU64::new(0),
        }
    }

    /// The current status.
    pub fn status(&self) -> RunStatus {
        self.status
            .lock()
            .map_or(RunStatus::Error, |status| *status)
    }

    /// Apply a control command, validating the transition.
    ///
    /// Returns the status after the command.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] when the command is not
    /// legal in the current status.
    pub fn apply(&self, action: ControlAction) -> Result<RunStatus, EngineError> {
        let mut status = self
            .status
            .lock()
            .map_err(|_| EngineError::InvalidTransition {
                from: RunStatus::Error,
                action,
            })?;
        let from = *status;

        let next = match action {
            ControlAction::Start => {
                Self::check(from, RunStatus::Running, action)?;
                RunStatus::Running
            }
            ControlAction::Pause => {
                Self::check(from, RunStatus::Paused, action)?;
                RunStatus::Paused
            }
            ControlAction::Resume => {
                if from != RunStatus::Paused {
                    return Err(EngineError::InvalidTransition { from, action });
                }
                RunStatus::Running
            }
            ControlAction::Stop => {
                if !matches!(from, RunStatus::Running | RunStatus::Paused) {
                    return Err(EngineError::InvalidTransition { from, action });
                }
                self.stop_requested.store(true, Ordering::Release);
                // The loop performs the actual transition once the
                // in-flight turn completes and the step is persisted.
                from
            }
            ControlAction::Step => {
                if from != RunStatus::Paused {
                    return Err(EngineError::InvalidTransition { from, action });
                }
                let _ = self.step_requests.fetch_add(1, Ordering::AcqRel);
                from
            }
        };

        *status = next;
        drop(status);
        self.notify.notify_one();
        Ok(next)
    }

    /// Validate a plain status transition.
    const fn check(
        from: RunStatus,
        to: RunStatus,
        action: ControlAction,
    ) -> Result<(), EngineError> {
        if from.can_transition(to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition { from, action })
        }
    }

    /// Cancel a run that never started (out-of-band abandonment).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] unless the run is
    /// pending.
    pub fn cancel(&self) -> Result<(), EngineError> {
        let mut status = self
            .status
            .lock()
            .map_err(|_| EngineError::InvalidTransition {
                from: RunStatus::Error,
                action: ControlAction::Stop,
            })?;
        if *status != RunStatus::Pending {
            return Err(EngineError::InvalidTransition {
                from: *status,
                action: ControlAction::Stop,
            });
        }
        *status = RunStatus::Cancelled;
        drop(status);
        self.notify.notify_one();
        Ok(())
    }

    /// Engine-side unconditional status write for loop-driven transitions
    /// (completed, stopped, error). Callers outside the engine use
    /// [`apply`](Self::apply).
    pub fn set_status(&self, next: RunStatus) {
        if let Ok(mut status) = self.status.lock() {
            *status = next;
        }
        self.notify.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Consume one pending single-tick request, if any.
    pub fn take_step_request(&self) -> bool {
        self.step_requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                pending.checked_sub(1)
            })
            .is_ok()
    }

    /// Wait until a control command arrives.
    pub async fn wait_for_signal(&self) {
        self.notify.notified().await;
    }

    /// Block while the run is paused (and no stop or step is pending).
    ///
    /// Used at mid-tick suspension points so a pause takes effect between
    /// agents; the tick resumes where it left off.
    pub async fn wait_if_paused(&self) {
        while self.status() == RunStatus::Paused
            && !self.is_stop_requested()
            && self.step_requests.load(Ordering::Acquire) == 0
        {
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let control = RunControl::new();
        assert_eq!(control.status(), RunStatus::Pending);
        assert_eq!(control.apply(ControlAction::Start).unwrap(), RunStatus::Running);
        assert_eq!(control.apply(ControlAction::Pause).unwrap(), RunStatus::Paused);
        assert_eq!(control.apply(ControlAction::Resume).unwrap(), RunStatus::Running);
    }

    #[test]
    fn invalid_transitions_rejected() {
        let control = RunControl::new();
        assert!(control.apply(ControlAction::Pause).is_err());
        assert!(control.apply(ControlAction::Resume).is_err());
        assert!(control.apply(ControlAction::Stop).is_err());
        assert!(control.apply(ControlAction::Step).is_err());

        let _ = control.apply(ControlAction::Start);
        assert!(control.apply(ControlAction::Start).is_err());
        assert!(control.apply(ControlAction::Resume).is_err());
    }

    #[test]
    fn stop_sets_flag_without_changing_status() {
        let control = RunControl::new();
        let _ = control.apply(ControlAction::Start);
        let status = control.apply(ControlAction::Stop).unwrap();
        assert_eq!(status, RunStatus::Running);
        assert!(control.is_stop_requested());
    }

    #[test]
    fn stop_legal_from_paused() {
        let control = RunControl::new();
        let _ = control.apply(ControlAction::Start);
        let _ = control.apply(ControlAction::Pause);
        assert!(control.apply(ControlAction::Stop).is_ok());
        assert!(control.is_stop_requested());
    }

    #[test]
    fn step_only_from_paused() {
        let control = RunControl::new();
        let _ = control.apply(ControlAction::Start);
        assert!(control.apply(ControlAction::Step).is_err());
        let _ = control.apply(ControlAction::Pause);
        assert!(control.apply(ControlAction::Step).is_ok());
        assert!(control.take_step_request());
        assert!(!control.take_step_request());
    }

    #[test]
    fn cancel_only_from_pending() {
        let control = RunControl::new();
        assert!(control.cancel().is_ok());
        assert_eq!(control.status(), RunStatus::Cancelled);

        let started = RunControl::new();
        let _ = started.apply(ControlAction::Start);
        assert!(started.cancel().is_err());
    }

    #[test]
    fn terminal_statuses_reject_commands() {
        let control = RunControl::new();
        let _ = control.apply(ControlAction::Start);
        control.set_status(RunStatus::Completed);
        assert!(control.apply(ControlAction::Pause).is_err());
        assert!(control.apply(ControlAction::Stop).is_err());
    }
}
