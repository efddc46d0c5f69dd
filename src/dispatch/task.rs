//! Dispatch Step Sequencer.
//!
//! [`DispatchTask`] is a plain state container: an ordered list of
//! [`DispatchStep`]s plus a forward-only cursor. Steps can only be appended
//! while the task is `Submitted`; once execution starts the plan is sealed.
//! Every state change goes through a checked transition method.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::PeerDescriptor;
use crate::errors::SequencerError;

/// Lifecycle of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Lifecycle of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    /// The caller went away before every step was dispatched.
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

/// What gets sent to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepPayload {
    Text(String),
    Data(Value),
}

impl StepPayload {
    /// Payload for a plain request: `"Emergency dispatch: <request>"`.
    pub fn dispatch_text(request: &str) -> Self {
        Self::Text(format!("Emergency dispatch: {}", request))
    }
}

// ---------------------------------------------------------------------------
// DispatchStep
// ---------------------------------------------------------------------------

/// One planned call to one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchStep {
    pub step_id: String,
    pub target_address: String,
    pub target_name: String,
    pub payload: StepPayload,
    state: StepState,
    result: Option<String>,
    error_reason: Option<String>,
}

impl DispatchStep {
    fn new(step_id: String, peer: &PeerDescriptor, payload: StepPayload) -> Self {
        Self {
            step_id,
            target_address: peer.address.clone(),
            target_name: peer.name.clone(),
            payload,
            state: StepState::Pending,
            result: None,
            error_reason: None,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Peer acknowledgment; set iff the step completed.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Failure reason; set iff the step failed.
    pub fn error_reason(&self) -> Option<&str> {
        self.error_reason.as_deref()
    }

    /// Pending → InFlight.
    pub fn mark_in_flight(&mut self) -> Result<(), SequencerError> {
        self.transition(StepState::InFlight, |s| s == StepState::Pending)
    }

    /// InFlight → Completed.
    pub fn complete(&mut self, summary: impl Into<String>) -> Result<(), SequencerError> {
        self.transition(StepState::Completed, |s| s == StepState::InFlight)?;
        self.result = Some(summary.into());
        Ok(())
    }

    /// InFlight → Failed, or Pending → Failed for a step that was never sent.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SequencerError> {
        self.transition(StepState::Failed, |s| {
            matches!(s, StepState::InFlight | StepState::Pending)
        })?;
        self.error_reason = Some(reason.into());
        Ok(())
    }

    fn transition(
        &mut self,
        to: StepState,
        allowed_from: impl Fn(StepState) -> bool,
    ) -> Result<(), SequencerError> {
        if !allowed_from(self.state) {
            return Err(SequencerError::InvalidTransition {
                step_id: self.step_id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DispatchTask
// ---------------------------------------------------------------------------

/// One orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub task_id: String,
    pub context_id: String,
    /// The originating request text.
    pub description: String,
    steps: Vec<DispatchStep>,
    cursor: usize,
    state: TaskState,
}

impl DispatchTask {
    pub fn new(
        task_id: impl Into<String>,
        context_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            description: description.into(),
            steps: Vec::new(),
            cursor: 0,
            state: TaskState::Submitted,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn steps(&self) -> &[DispatchStep] {
        &self.steps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Append a Pending step targeting `peer`. Only allowed while planning.
    pub fn add_step(&mut self, peer: &PeerDescriptor, payload: StepPayload) -> Result<&DispatchStep, SequencerError> {
        if self.state != TaskState::Submitted {
            return Err(SequencerError::PlanSealed {
                task_id: self.task_id.clone(),
            });
        }
        let step_id = format!("{}-step-{}", self.task_id, self.steps.len());
        self.steps.push(DispatchStep::new(step_id, peer, payload));
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Step under the cursor, if any remain.
    pub fn current_step(&self) -> Option<&DispatchStep> {
        self.steps.get(self.cursor)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut DispatchStep> {
        self.steps.get_mut(self.cursor)
    }

    /// Step at `index`, for windowed execution within the unexecuted range.
    pub fn step_mut(&mut self, index: usize) -> Option<&mut DispatchStep> {
        if index < self.cursor {
            return None;
        }
        self.steps.get_mut(index)
    }

    /// Move past the current step. Returns whether more steps remain.
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.steps.len() {
            self.cursor += 1;
        }
        !self.is_complete()
    }

    /// Every step has been passed by the cursor.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// `(completed, total)` where completed counts terminal steps.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.steps.iter().filter(|s| s.state.is_terminal()).count();
        (done, self.steps.len())
    }

    /// `(successful, failed)` step counts.
    pub fn outcome_counts(&self) -> (usize, usize) {
        self.steps.iter().fold((0, 0), |(ok, failed), s| match s.state {
            StepState::Completed => (ok + 1, failed),
            StepState::Failed => (ok, failed + 1),
            _ => (ok, failed),
        })
    }

    /// Submitted → Working; seals the plan.
    pub fn start(&mut self) {
        if self.state == TaskState::Submitted {
            self.state = TaskState::Working;
        }
    }

    /// Finish the task. `Completed` is only reached once every step is
    /// terminal; a zero-step task completes straight from `Submitted`.
    pub fn finish(&mut self) -> TaskState {
        if self.state.is_terminal() {
            return self.state;
        }
        if self.steps.iter().all(|s| s.state.is_terminal()) {
            self.cursor = self.steps.len();
            self.state = TaskState::Completed;
        }
        self.state
    }

    /// Mark the task Failed (plan creation error).
    pub fn mark_failed(&mut self) {
        if !self.state.is_terminal() {
            self.state = TaskState::Failed;
        }
    }

    /// Fail every remaining Pending step with `reason`, move the cursor to
    /// the end and mark the task Canceled.
    pub fn cancel_remaining(&mut self, reason: &str) -> Result<(), SequencerError> {
        while let Some(step) = self.current_step_mut() {
            if step.state() == StepState::Pending {
                step.fail(reason)?;
            }
            self.advance();
        }
        self.state = TaskState::Canceled;
        Ok(())
    }
}
