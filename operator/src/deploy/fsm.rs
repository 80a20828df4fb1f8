//! Linear state machine for the descriptor update

use tracing::warn;

use crate::errors::OpsError;

/// Update step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    /// Work tree and descriptor checks
    Preconditions,

    /// Download the candidate descriptor
    Fetch,

    /// Compare current and candidate
    Diff,

    /// Stop the running stack
    Stop,

    /// Back up the current descriptor and move the candidate in place
    Swap,

    /// Start the supervisor on the new descriptor
    Restart,

    /// Drop the backup
    Cleanup,

    /// Record the new descriptor in version control
    Commit,
}

impl UpdateStep {
    /// Step that follows this one, `None` after the last
    pub fn next(self) -> Option<UpdateStep> {
        match self {
            UpdateStep::Preconditions => Some(UpdateStep::Fetch),
            UpdateStep::Fetch => Some(UpdateStep::Diff),
            UpdateStep::Diff => Some(UpdateStep::Stop),
            UpdateStep::Stop => Some(UpdateStep::Swap),
            UpdateStep::Swap => Some(UpdateStep::Restart),
            UpdateStep::Restart => Some(UpdateStep::Cleanup),
            UpdateStep::Cleanup => Some(UpdateStep::Commit),
            UpdateStep::Commit => None,
        }
    }
}

/// Result of executing one step
#[derive(Debug)]
pub enum StepOutcome {
    /// Step done, continue
    Success,

    /// Step degraded but the update continues
    Warning(String),

    /// Nothing left to do; the run ends successfully here
    Finished,

    /// Abort the run
    Fatal(OpsError),
}

/// Update state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    /// About to execute a step
    Running(UpdateStep),

    /// Ended early, upstream matched the deployed descriptor
    UpToDate,

    /// Every step completed
    Completed,

    /// Aborted at a step
    Failed(UpdateStep),
}

/// Update FSM
#[derive(Debug, Clone)]
pub struct UpdateFsm {
    state: UpdateState,
    warnings: Vec<String>,
}

impl UpdateFsm {
    /// Create a new FSM at the first step
    pub fn new() -> Self {
        Self {
            state: UpdateState::Running(UpdateStep::Preconditions),
            warnings: Vec::new(),
        }
    }

    /// Get current state
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Step to execute next, `None` once terminal
    pub fn current_step(&self) -> Option<UpdateStep> {
        match self.state {
            UpdateState::Running(step) => Some(step),
            _ => None,
        }
    }

    /// Warnings collected so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Apply the outcome of the current step
    pub fn process(&mut self, outcome: StepOutcome) -> Result<(), OpsError> {
        let step = match self.state {
            UpdateState::Running(step) => step,
            ref terminal => {
                return Err(OpsError::Internal(format!(
                    "Invalid transition: {:?} -> {:?}",
                    terminal, outcome
                )));
            }
        };

        self.state = match outcome {
            StepOutcome::Success => advance(step),
            StepOutcome::Warning(message) => {
                warn!("{:?}: {}", step, message);
                self.warnings.push(message);
                advance(step)
            }
            StepOutcome::Finished => UpdateState::UpToDate,
            StepOutcome::Fatal(e) => {
                self.state = UpdateState::Failed(step);
                return Err(e);
            }
        };
        Ok(())
    }
}

fn advance(step: UpdateStep) -> UpdateState {
    match step.next() {
        Some(next) => UpdateState::Running(next),
        None => UpdateState::Completed,
    }
}

impl Default for UpdateFsm {
    fn default() -> Self {
        Self::new()
    }
}
