//! Deployment status state machine.
//!
//! # State Machine
//!
//! ```text
//!     ┌───────────┐  (worker picks job)  ┌───────────┐
//!     │  Pending  │─────────────────────▶│  Running  │
//!     └─────┬─────┘                      └─────┬─────┘
//!           │ (queue closed)                   │
//!           │                 ┌────────────────┴───────────┐
//!           │                 │ (both phases ok)           │ (phase error)
//!           │                 ▼                            ▼
//!           │          ┌─────────────┐              ┌──────────┐
//!           │          │  Completed  │              │  Failed  │
//!           │          └─────────────┘              └──────────┘
//!           │                                             ▲
//!           └─────────────────────────────────────────────┘
//! ```

use berth_core::DeploymentId;

use crate::error::{ControlError, Result};
use crate::types::DeploymentStatus;

/// Validates a status transition and returns the target status if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(
    id: DeploymentId,
    from: DeploymentStatus,
    to: DeploymentStatus,
) -> Result<DeploymentStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition { id, from, to })
    }
}

/// Check if a status transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: DeploymentStatus, to: DeploymentStatus) -> bool {
    use DeploymentStatus::{Completed, Failed, Pending, Running};

    matches!(
        (from, to),
        (Pending, Running | Failed) | (Running, Completed | Failed)
    )
}

/// Returns true once a deployment can no longer change.
#[must_use]
pub const fn is_terminal(status: DeploymentStatus) -> bool {
    matches!(status, DeploymentStatus::Completed | DeploymentStatus::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use DeploymentStatus::*;

        assert!(is_valid_transition(Pending, Running));
        assert!(is_valid_transition(Running, Completed));
        assert!(is_valid_transition(Running, Failed));
        assert!(is_valid_transition(Pending, Failed));
    }

    #[test]
    fn invalid_transitions() {
        use DeploymentStatus::*;

        // Completion requires the worker to have run the job
        assert!(!is_valid_transition(Pending, Completed));
        assert!(!is_valid_transition(Completed, Running));
        assert!(!is_valid_transition(Failed, Pending));
        assert!(!is_valid_transition(Running, Running));
    }

    #[test]
    fn validate_transition_err() {
        let id = DeploymentId::from_seq(3);
        let result = validate_transition(id, DeploymentStatus::Completed, DeploymentStatus::Failed);

        match result {
            Err(ControlError::InvalidTransition { id: got, from, to }) => {
                assert_eq!(got, id);
                assert_eq!(from, DeploymentStatus::Completed);
                assert_eq!(to, DeploymentStatus::Failed);
            }
            _ => panic!("expected InvalidTransition error"),
        }
    }

    #[test]
    fn terminal_statuses_have_no_way_out() {
        use DeploymentStatus::*;

        for from in [Pending, Running, Completed, Failed] {
            let has_exit = [Pending, Running, Completed, Failed]
                .into_iter()
                .any(|to| is_valid_transition(from, to));
            assert_eq!(is_terminal(from), !has_exit);
        }
    }
}
