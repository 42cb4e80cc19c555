//! Finite State Machine for node updates

use serde::{Deserialize, Serialize};

use crate::errors::OpsError;

/// Update state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// Nothing in progress
    Idle,

    /// Comparing the current and latest versions
    CheckingVersion,

    /// Newer release found, waiting for the operator
    AwaitingConfirmation,

    /// Taking the pre-update backup
    BackingUp,

    /// Building the new image
    Building,

    /// Replacing the running service
    Redeploying,

    /// Waiting for the node to report the new version
    Verifying,

    /// Finished, nothing left to do
    Done,

    /// Putting the previous version back
    RollingBack,
}

/// Update event
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Start a version check
    Check,

    /// Current version is the latest (or newer)
    UpToDate,

    /// A newer release exists
    UpdateAvailable,

    /// Operator accepted the update
    Confirmed,

    /// Operator declined the update
    Declined,

    BackupCompleted,
    BuildCompleted,
    Redeployed,
    Verified,

    /// The current step failed
    StepFailed(String),

    /// Start a rollback outside of an update
    Rollback,

    /// Rollback restored the previous version
    RolledBack,

    /// Return to idle from a terminal state
    Reset,
}

/// Update FSM
#[derive(Debug, Clone)]
pub struct UpdateFsm {
    state: UpdateState,
    error: Option<String>,
    history: Vec<UpdateState>,
}

impl UpdateFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: UpdateState::Idle,
            error: None,
            history: vec![UpdateState::Idle],
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Last failure recorded by a `StepFailed` event
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[UpdateState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: UpdateEvent) -> Result<UpdateState, OpsError> {
        let new_state = match (self.state, &event) {
            // From Idle
            (UpdateState::Idle, UpdateEvent::Check) => {
                self.error = None;
                UpdateState::CheckingVersion
            }
            (UpdateState::Idle, UpdateEvent::Rollback) => {
                self.error = None;
                UpdateState::RollingBack
            }

            // From CheckingVersion
            (UpdateState::CheckingVersion, UpdateEvent::UpToDate) => UpdateState::Done,
            (UpdateState::CheckingVersion, UpdateEvent::UpdateAvailable) => {
                UpdateState::AwaitingConfirmation
            }

            // From AwaitingConfirmation
            (UpdateState::AwaitingConfirmation, UpdateEvent::Confirmed) => UpdateState::BackingUp,
            (UpdateState::AwaitingConfirmation, UpdateEvent::Declined) => UpdateState::Idle,

            // Nothing has been mutated before the build succeeds
            (UpdateState::BackingUp, UpdateEvent::BackupCompleted) => UpdateState::Building,
            (UpdateState::Building, UpdateEvent::BuildCompleted) => UpdateState::Redeploying,
            (
                UpdateState::CheckingVersion | UpdateState::BackingUp | UpdateState::Building,
                UpdateEvent::StepFailed(err),
            ) => {
                self.error = Some(err.clone());
                UpdateState::Idle
            }

            // From Redeploying and Verifying
            (UpdateState::Redeploying, UpdateEvent::Redeployed) => UpdateState::Verifying,
            (UpdateState::Verifying, UpdateEvent::Verified) => UpdateState::Done,
            (UpdateState::Redeploying | UpdateState::Verifying, UpdateEvent::StepFailed(err)) => {
                self.error = Some(err.clone());
                UpdateState::RollingBack
            }

            // From RollingBack
            (UpdateState::RollingBack, UpdateEvent::RolledBack) => UpdateState::Idle,
            (UpdateState::RollingBack, UpdateEvent::StepFailed(err)) => {
                self.error = Some(err.clone());
                UpdateState::Idle
            }

            // From Done
            (UpdateState::Done, UpdateEvent::Reset) => UpdateState::Idle,

            // Invalid transitions
            (state, event) => {
                return Err(OpsError::TransitionError(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for UpdateFsm {
    fn default() -> Self {
        Self::new()
    }
}
