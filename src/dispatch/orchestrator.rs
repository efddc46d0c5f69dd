//! Orchestrator: the composition root of the dispatch pipeline.
//!
//! A request goes through two phases:
//!
//! 1. [`Orchestrator::create_plan`] discovers peers through the directory
//!    cache, matches them against the request and appends one step per
//!    matched peer.
//! 2. [`Orchestrator::execute_task`] runs the steps in plan order, reporting
//!    every transition through the [`ProgressEmitter`], and finishes with
//!    one final summary event.
//!
//! Partial failure is not task failure: a task whose steps all reached a
//! terminal state is `Completed` whatever their individual outcomes. Only a
//! malformed request fails a task.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::directory::PeerDirectoryCache;
use super::invoker::{InvokeOutcome, PeerInvoker};
use super::matcher::PeerMatcher;
use super::progress::ProgressEmitter;
use super::task::{DispatchStep, DispatchTask, StepPayload, StepState, TaskState};
use crate::config::OrchestratorConfig;
use crate::errors::DispatchError;

/// Reason recorded on steps skipped because the caller went away.
pub const DISCONNECTED_REASON: &str = "not dispatched: caller disconnected";

/// Plans and executes dispatch tasks.
pub struct Orchestrator {
    directory: Arc<PeerDirectoryCache>,
    matcher: Arc<dyn PeerMatcher>,
    invoker: PeerInvoker,
    config: OrchestratorConfig,
    /// Snapshots of running tasks, republished after every transition.
    active_tasks: DashMap<String, DispatchTask>,
}

impl Orchestrator {
    pub fn new(
        directory: Arc<PeerDirectoryCache>,
        matcher: Arc<dyn PeerMatcher>,
        invoker: PeerInvoker,
    ) -> Self {
        Self {
            directory,
            matcher,
            invoker,
            config: OrchestratorConfig::default(),
            active_tasks: DashMap::new(),
        }
    }

    /// Builder: set orchestration limits.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn directory(&self) -> &Arc<PeerDirectoryCache> {
        &self.directory
    }

    /// Snapshot of a running task.
    pub fn get_task(&self, task_id: &str) -> Option<DispatchTask> {
        self.active_tasks.get(task_id).map(|t| t.clone())
    }

    pub fn active_task_count(&self) -> usize {
        self.active_tasks.len()
    }

    fn publish(&self, task: &DispatchTask) {
        self.active_tasks.insert(task.task_id.clone(), task.clone());
    }

    fn validate(&self, request_text: &str, task_id: &str) -> Result<(), DispatchError> {
        if request_text.trim().is_empty() {
            return Err(DispatchError::MalformedRequest(
                "request text is empty".to_string(),
            ));
        }
        let chars = request_text.chars().count();
        if chars > self.config.max_request_chars {
            return Err(DispatchError::MalformedRequest(format!(
                "request text is {} characters; the limit is {}",
                chars, self.config.max_request_chars
            )));
        }
        if task_id.trim().is_empty() {
            return Err(DispatchError::MalformedRequest("task id is empty".to_string()));
        }
        Ok(())
    }

    /// Claim `task`'s id in the active map. Fails if the id is taken.
    fn reserve(&self, task: &DispatchTask) -> Result<(), DispatchError> {
        match self.active_tasks.entry(task.task_id.clone()) {
            Entry::Occupied(_) => Err(DispatchError::MalformedRequest(format!(
                "task {} is already running",
                task.task_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Build the dispatch plan for `request_text`.
    ///
    /// An empty catalog or an empty match is a valid zero-step plan; only a
    /// malformed request returns an error.
    pub async fn create_plan(
        &self,
        request_text: &str,
        task_id: &str,
        context_id: &str,
        emitter: &ProgressEmitter,
    ) -> Result<DispatchTask, DispatchError> {
        self.validate(request_text, task_id)?;
        let task = DispatchTask::new(task_id, context_id, request_text.trim());
        self.reserve(&task)?;
        let planned = self.plan(task, emitter).await;
        if planned.is_err() {
            self.active_tasks.remove(task_id);
        }
        planned
    }

    async fn plan(
        &self,
        mut task: DispatchTask,
        emitter: &ProgressEmitter,
    ) -> Result<DispatchTask, DispatchError> {
        let task_id = task.task_id.clone();
        let context_id = task.context_id.clone();
        let (task_id, context_id) = (task_id.as_str(), context_id.as_str());
        emitter.emit(
            task_id,
            context_id,
            "[ALERT] Emergency call received. Analyzing situation...",
            false,
        );

        let catalog = self
            .directory
            .get_catalog(Some(&emitter.for_discovery(task_id, context_id)))
            .await;
        emitter.emit(
            task_id,
            context_id,
            format!("{} emergency services available", catalog.len()),
            false,
        );
        if catalog.is_empty() {
            emitter.emit(
                task_id,
                context_id,
                "[WARNING] No emergency services available in the registry.",
                false,
            );
            return Ok(task);
        }

        let matched = self.matcher.match_peers(&task.description, &catalog).await;
        log::info!(
            "Task {}: {} matcher selected {} of {} peers",
            task_id,
            self.matcher.name(),
            matched.len(),
            catalog.len()
        );

        let request = task.description.clone();
        for peer in &matched {
            let step = task.add_step(peer, StepPayload::dispatch_text(&request))?;
            log::info!(
                "Added dispatch step {} for {} at {}",
                step.step_id,
                step.target_name,
                step.target_address
            );
        }
        self.publish(&task);

        if task.steps().is_empty() {
            emitter.emit(
                task_id,
                context_id,
                "[WARNING] No emergency services matched for this request.",
                false,
            );
        } else {
            emitter.emit(
                task_id,
                context_id,
                format!("[PLAN] Dispatch plan created: {}", step_names(task.steps())),
                false,
            );
        }
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run every step of `task` and emit the final summary. Returns the task
    /// in its terminal state; it is no longer in the active map afterwards.
    pub async fn execute_task(
        &self,
        task: DispatchTask,
        emitter: &ProgressEmitter,
    ) -> Result<DispatchTask, DispatchError> {
        let task_id = task.task_id.clone();
        let executed = self.run_steps(task, emitter).await;
        if executed.is_err() {
            self.active_tasks.remove(&task_id);
        }
        executed
    }

    async fn run_steps(
        &self,
        mut task: DispatchTask,
        emitter: &ProgressEmitter,
    ) -> Result<DispatchTask, DispatchError> {
        let task_id = task.task_id.clone();
        let context_id = task.context_id.clone();

        if task.steps().is_empty() {
            task.finish();
            emitter.emit(&task_id, &context_id, "No services to dispatch. Call completed.", true);
            self.active_tasks.remove(&task_id);
            return Ok(task);
        }

        task.start();
        self.publish(&task);

        let total = task.steps().len();
        let window = self.config.max_concurrent_dispatches.max(1);

        while !task.is_complete() {
            if emitter.is_disconnected() {
                log::info!(
                    "Caller disconnected from task {}; skipping {} remaining steps",
                    task_id,
                    total - task.cursor()
                );
                task.cancel_remaining(DISCONNECTED_REASON)?;
                break;
            }

            let start = task.cursor();
            let end = (start + window).min(total);

            let mut batch: Vec<DispatchStep> = Vec::with_capacity(end - start);
            for index in start..end {
                if let Some(step) = task.step_mut(index) {
                    step.mark_in_flight()?;
                    emitter.emit(
                        &task_id,
                        &context_id,
                        format!("[{}/{}] Dispatching {}...", index + 1, total, step.target_name),
                        false,
                    );
                    batch.push(step.clone());
                }
            }
            self.publish(&task);

            let outcomes = futures::future::join_all(
                batch.iter().map(|step| self.invoker.dispatch(step, &context_id)),
            )
            .await;

            for (offset, outcome) in outcomes.into_iter().enumerate() {
                let position = format!("[{}/{}]", start + offset + 1, total);
                let Some(step) = task.current_step_mut() else {
                    break;
                };
                let text = match outcome {
                    InvokeOutcome::Ok { summary } => {
                        let text = format!(
                            "[OK] {} {} dispatched successfully: {}",
                            position, step.target_name, summary
                        );
                        step.complete(summary)?;
                        text
                    }
                    InvokeOutcome::Failed { reason } => {
                        let text = format!(
                            "[FAILED] {} Failed to dispatch {}: {}",
                            position, step.target_name, reason
                        );
                        step.fail(reason)?;
                        text
                    }
                };
                emitter.emit(&task_id, &context_id, text, false);
                task.advance();
            }
            self.publish(&task);
        }

        let state = task.finish();
        emitter.emit(&task_id, &context_id, final_summary(&task), true);
        log::info!("Task {} finished as {:?}", task_id, state);
        self.active_tasks.remove(&task_id);
        Ok(task)
    }

    /// Plan and execute one request, reporting a plan failure as the final
    /// event of the task.
    pub async fn handle_request(
        &self,
        request_text: &str,
        task_id: &str,
        context_id: &str,
        emitter: &ProgressEmitter,
    ) -> Result<DispatchTask, DispatchError> {
        let result = match self.create_plan(request_text, task_id, context_id, emitter).await {
            Ok(task) => self.execute_task(task, emitter).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            log::warn!("Task {} failed: {}", task_id, e);
            emitter.emit(task_id, context_id, format!("Dispatch failed: {}", e), true);
        }
        result
    }
}

fn step_names(steps: &[DispatchStep]) -> String {
    steps
        .iter()
        .map(|s| s.target_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn names_in(task: &DispatchTask, state: StepState) -> String {
    task.steps()
        .iter()
        .filter(|s| s.state() == state)
        .map(|s| s.target_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Aggregated text of the final event.
fn final_summary(task: &DispatchTask) -> String {
    let (successful, failed) = task.outcome_counts();
    let mut text = match (task.state(), failed) {
        (TaskState::Canceled, _) => format!(
            "[CANCELED] Dispatch stopped after the caller disconnected: {} successful, {} failed",
            successful, failed
        ),
        (_, 0) => format!(
            "[SUCCESS] All emergency services dispatched successfully: {} successful, 0 failed",
            successful
        ),
        _ => format!(
            "[WARNING] Dispatch completed with issues: {} successful, {} failed",
            successful, failed
        ),
    };
    if successful > 0 {
        text.push_str(&format!(". Dispatched: {}", names_in(task, StepState::Completed)));
    }
    if failed > 0 {
        text.push_str(&format!(". Failed: {}", names_in(task, StepState::Failed)));
    }
    text
}
