//! Session lifecycle: start, submit, read back, expire.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::aggregator::ConfidenceAggregator;
use super::clock::{Clock, SystemClock};
use super::decision::{DecisionEngine, DecisionState};
use super::state::{
    DiagnosticResult, Progress, SessionState, SessionStatus, StepRecord, TerminationReason,
};
use super::synthesis::ResultSynthesizer;
use super::view::NodeView;
use crate::catalog::{RemediationCatalog, StaticCatalog};
use crate::config::{Config, EngineConfig, RequestConfig};
use crate::error::{DiagnosticError, EngineResult, IntegrityError};
use crate::form::{DiagnosticForm, FormSummary};
use crate::storage::{SqliteStorage, Storage};

/// Default number of results returned for a learner.
pub const DEFAULT_RESULTS_LIMIT: u32 = 10;
const MAX_RESULTS_LIMIT: u32 = 100;

/// A freshly started session and the node to show first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    pub state: SessionState,
    pub current_node: NodeView,
    pub progress: Progress,
}

/// One answer from a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    pub session_id: String,
    /// Node the answer is for; defaults to the session's current node.
    ///
    /// Without it a resent request is indistinguishable from a new answer
    /// and is applied to whatever node the session has moved on to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub selected_option_id: String,
    #[serde(default)]
    pub time_spent_seconds: u32,
}

impl SubmitRequest {
    pub fn new(session_id: impl Into<String>, selected_option_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            node_id: None,
            selected_option_id: selected_option_id.into(),
            time_spent_seconds: 0,
        }
    }

    /// Pin the answer to a specific node.
    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_time_spent(mut self, seconds: u32) -> Self {
        self.time_spent_seconds = seconds;
        self
    }
}

/// What happened after an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The session moved on to another node.
    Continue {
        session_id: String,
        next_node: NodeView,
        progress: Progress,
        /// True when this answer had already been applied.
        replayed: bool,
    },
    /// The session ended and its result was written.
    Terminal {
        session_id: String,
        result: Box<DiagnosticResult>,
        progress: Progress,
    },
}

impl SubmitOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmitOutcome::Terminal { .. })
    }

    pub fn session_id(&self) -> &str {
        match self {
            SubmitOutcome::Continue { session_id, .. }
            | SubmitOutcome::Terminal { session_id, .. } => session_id,
        }
    }
}

/// Outcome of evaluating a submit against one snapshot of the session.
enum Step {
    Replay(SubmitOutcome),
    Commit {
        state: SessionState,
        expected_version: i64,
        result: Option<DiagnosticResult>,
        outcome: SubmitOutcome,
    },
    Abort {
        state: SessionState,
        expected_version: i64,
        error: IntegrityError,
    },
}

/// Drives diagnostic sessions against the store.
pub struct SessionManager {
    storage: SqliteStorage,
    clock: Arc<dyn Clock>,
    engine_config: EngineConfig,
    request_config: RequestConfig,
    aggregator: ConfidenceAggregator,
    synthesizer: ResultSynthesizer,
    forms: RwLock<HashMap<(String, u32), Arc<DiagnosticForm>>>,
}

impl SessionManager {
    /// Create a manager using the wall clock and the built-in catalogue.
    pub fn new(storage: SqliteStorage, config: &Config) -> Self {
        let catalog: Arc<dyn RemediationCatalog> = Arc::new(StaticCatalog::with_builtins());
        Self {
            storage,
            clock: Arc::new(SystemClock),
            engine_config: config.engine.clone(),
            request_config: config.request.clone(),
            aggregator: ConfidenceAggregator::new(config.engine.confirmation_threshold),
            synthesizer: ResultSynthesizer::new(config.engine.clone(), catalog),
            forms: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the remediation catalogue.
    pub fn with_catalog(mut self, catalog: Arc<dyn RemediationCatalog>) -> Self {
        self.synthesizer = ResultSynthesizer::new(self.engine_config.clone(), catalog);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Validate and store a form.
    ///
    /// Registering the same `(form_id, version)` twice is accepted only when
    /// the content is identical.
    pub async fn register_form(&self, form: DiagnosticForm) -> EngineResult<FormSummary> {
        form.validate()
            .map_err(|problems| DiagnosticError::InvalidForm {
                form_id: form.form_id.clone(),
                problems,
            })?;

        if let Some(existing) = self.storage.get_form(&form.form_id, form.version).await? {
            if existing != form {
                return Err(DiagnosticError::InvalidForm {
                    form_id: form.form_id.clone(),
                    problems: vec![format!(
                        "version {} is already registered with different content",
                        form.version
                    )],
                });
            }
            debug!(form_id = %form.form_id, version = form.version, "Form already registered");
            return Ok(form.summary());
        }

        self.storage.save_form(&form).await?;
        info!(
            form_id = %form.form_id,
            version = form.version,
            items = form.items.len(),
            probes = form.probes.len(),
            "Diagnostic form registered"
        );

        let summary = form.summary();
        self.forms
            .write()
            .await
            .insert((form.form_id.clone(), form.version), Arc::new(form));
        Ok(summary)
    }

    /// Summaries of every registered form version.
    pub async fn forms(&self) -> EngineResult<Vec<FormSummary>> {
        Ok(self.storage.list_forms().await?)
    }

    /// Start a session for `learner_id` on the latest version of `form_id`.
    pub async fn start(&self, learner_id: &str, form_id: &str) -> EngineResult<SessionStart> {
        self.with_timeout(self.start_inner(learner_id, form_id))
            .await
    }

    async fn start_inner(&self, learner_id: &str, form_id: &str) -> EngineResult<SessionStart> {
        let form = self
            .storage
            .get_latest_form(form_id)
            .await?
            .ok_or_else(|| DiagnosticError::FormNotFound {
                form_id: form_id.to_string(),
            })?;

        let root = DecisionEngine::new(&form).node(&form.root_item_id)?;
        let state = SessionState::new(learner_id, &form, self.clock.now());
        let current_node = NodeView::build(root, &state.session_id, self.engine_config.option_order);
        self.storage.create_session(&state).await?;

        info!(
            session_id = %state.session_id,
            learner_id = %learner_id,
            form_id = %form_id,
            form_version = form.version,
            "Diagnostic session started"
        );

        let progress = state.progress(form.max_depth);
        Ok(SessionStart {
            state,
            current_node,
            progress,
        })
    }

    /// Apply one answer.
    ///
    /// The step is committed against the session version it was computed
    /// from. On a conflict the session is reloaded and the answer
    /// re-evaluated for the node originally targeted, so a concurrent
    /// duplicate becomes a replay or a stale submission.
    pub async fn submit(&self, request: SubmitRequest) -> EngineResult<SubmitOutcome> {
        self.with_timeout(self.submit_inner(request)).await
    }

    async fn submit_inner(&self, mut request: SubmitRequest) -> EngineResult<SubmitOutcome> {
        let attempts = self.request_config.max_retries.max(1);

        for attempt in 1..=attempts {
            let state = self.load_session(&request.session_id).await?;
            let form = self.form(&state.form_id, state.form_version).await?;
            let target = request
                .node_id
                .clone()
                .unwrap_or_else(|| state.current_node_id.clone());

            match self.evaluate(state, &form, &target, &request)? {
                Step::Replay(outcome) => {
                    debug!(
                        session_id = %request.session_id,
                        node_id = %target,
                        "Duplicate submission replayed"
                    );
                    return Ok(outcome);
                }
                Step::Commit {
                    state,
                    expected_version,
                    result,
                    outcome,
                } => {
                    if self
                        .storage
                        .commit_session(&state, expected_version, result.as_ref())
                        .await?
                    {
                        self.log_step(&state, &outcome);
                        return Ok(outcome);
                    }
                }
                Step::Abort {
                    state,
                    expected_version,
                    error,
                } => {
                    if self
                        .storage
                        .commit_session(&state, expected_version, None)
                        .await?
                    {
                        warn!(
                            session_id = %state.session_id,
                            form_id = %state.form_id,
                            error = %error,
                            "Session aborted on malformed form"
                        );
                        return Err(error.into());
                    }
                }
            }

            debug!(
                session_id = %request.session_id,
                attempt,
                "Session changed concurrently, re-evaluating"
            );
            request.node_id = Some(target);
        }

        Err(DiagnosticError::Contention {
            session_id: request.session_id,
            attempts,
        })
    }

    /// Decide what a submit does to one snapshot of the session.
    fn evaluate(
        &self,
        state: SessionState,
        form: &DiagnosticForm,
        target: &str,
        request: &SubmitRequest,
    ) -> EngineResult<Step> {
        if state.is_complete() {
            return Err(DiagnosticError::SessionAlreadyComplete {
                state: Box::new(state),
            });
        }

        if target != state.current_node_id {
            let is_replay = state.last_step().is_some_and(|step| {
                step.node_id == target
                    && step.option_id == request.selected_option_id
                    && step.next_node_id.as_deref() == Some(state.current_node_id.as_str())
            });
            if !is_replay {
                return Err(DiagnosticError::StaleSubmission {
                    submitted_node_id: target.to_string(),
                    state: Box::new(state),
                });
            }
            let engine = DecisionEngine::new(form);
            let current = engine.node(&state.current_node_id)?;
            return Ok(Step::Replay(SubmitOutcome::Continue {
                session_id: state.session_id.clone(),
                next_node: NodeView::build(
                    current,
                    &state.session_id,
                    self.engine_config.option_order,
                ),
                progress: state.progress(form.max_depth),
                replayed: true,
            }));
        }

        let now = self.clock.now();
        let expected_version = state.version;
        let mut next = state;
        next.version = expected_version + 1;

        let engine = DecisionEngine::new(form);
        let node = match engine.node(&next.current_node_id) {
            Ok(node) => node,
            Err(error) => {
                next.abort(error.to_string(), now);
                return Ok(Step::Abort {
                    state: next,
                    expected_version,
                    error,
                });
            }
        };

        let option_id = request.selected_option_id.as_str();
        if !node.has_option(option_id) {
            return Err(DiagnosticError::InvalidOption {
                node_id: node.id().to_string(),
                option_id: option_id.to_string(),
            });
        }

        if next.visited_nodes.last().map(String::as_str) != Some(node.id()) {
            next.visited_nodes.push(node.id().to_string());
        }
        next.responses
            .insert(node.id().to_string(), option_id.to_string());

        let transition = match engine.next(&next, node, option_id, now) {
            Ok(transition) => transition,
            Err(error) => {
                next.abort(error.to_string(), now);
                return Ok(Step::Abort {
                    state: next,
                    expected_version,
                    error,
                });
            }
        };

        let update = self
            .aggregator
            .apply(&mut next, node, transition.edge, option_id);
        for tag in &update.newly_confirmed {
            debug!(session_id = %next.session_id, tag = %tag, "Misconception confirmed");
        }

        next.steps.push(StepRecord {
            node_id: node.id().to_string(),
            option_id: option_id.to_string(),
            correct: node.correct_answer().option_id == option_id,
            time_spent_seconds: request.time_spent_seconds,
            next_node_id: transition.next.node_id().map(str::to_string),
            answered_at: now,
        });
        next.last_activity_at = now;

        match transition.next {
            DecisionState::Terminal(reason) => {
                next.close(SessionStatus::Completed, reason, now);
                let result = self.synthesizer.synthesize(&next, form);
                let outcome = SubmitOutcome::Terminal {
                    session_id: next.session_id.clone(),
                    result: Box::new(result.clone()),
                    progress: next.progress(form.max_depth),
                };
                Ok(Step::Commit {
                    state: next,
                    expected_version,
                    result: Some(result),
                    outcome,
                })
            }
            DecisionState::AtItem(node_id) | DecisionState::AtProbe(node_id) => {
                let next_node = engine.node(&node_id)?;
                next.current_node_id = node_id;
                next.node_entered_at = now;
                let outcome = SubmitOutcome::Continue {
                    session_id: next.session_id.clone(),
                    next_node: NodeView::build(
                        next_node,
                        &next.session_id,
                        self.engine_config.option_order,
                    ),
                    progress: next.progress(form.max_depth),
                    replayed: false,
                };
                Ok(Step::Commit {
                    state: next,
                    expected_version,
                    result: None,
                    outcome,
                })
            }
        }
    }

    fn log_step(&self, state: &SessionState, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Terminal { result, .. } => info!(
                session_id = %state.session_id,
                termination = %result.termination,
                severity = %result.severity,
                primary = ?result.primary_misconception,
                confidence_score = result.confidence_score,
                "Diagnostic session completed"
            ),
            SubmitOutcome::Continue { next_node, .. } => debug!(
                session_id = %state.session_id,
                next_node = %next_node.node_id,
                visited = state.visited_nodes.len(),
                "Session advanced"
            ),
        }
    }

    /// Current state of a session.
    pub async fn session(&self, session_id: &str) -> EngineResult<SessionState> {
        self.load_session(session_id).await
    }

    /// The node a session is waiting on, `None` once it has finished.
    pub async fn current_node(&self, session_id: &str) -> EngineResult<Option<NodeView>> {
        let state = self.load_session(session_id).await?;
        if state.is_complete() {
            return Ok(None);
        }
        let form = self.form(&state.form_id, state.form_version).await?;
        let node = DecisionEngine::new(&form).node(&state.current_node_id)?;
        Ok(Some(NodeView::build(
            node,
            &state.session_id,
            self.engine_config.option_order,
        )))
    }

    /// Result of a finished session.
    pub async fn result(&self, session_id: &str) -> EngineResult<DiagnosticResult> {
        if let Some(result) = self.storage.get_result(session_id).await? {
            return Ok(result);
        }

        let state = self.load_session(session_id).await?;
        match state.status {
            SessionStatus::Aborted => Err(DiagnosticError::SessionAborted {
                session_id: state.session_id,
                reason: state.abort_reason.unwrap_or_default(),
            }),
            _ => Err(DiagnosticError::ResultNotReady {
                session_id: state.session_id,
            }),
        }
    }

    /// Most recent results for a learner, newest first.
    pub async fn learner_results(
        &self,
        learner_id: &str,
        limit: Option<u32>,
    ) -> EngineResult<Vec<DiagnosticResult>> {
        let limit = limit
            .unwrap_or(DEFAULT_RESULTS_LIMIT)
            .clamp(1, MAX_RESULTS_LIMIT);
        Ok(self.storage.get_learner_results(learner_id, limit).await?)
    }

    /// Close every open session idle past its form's time budget plus the
    /// grace window. Returns the ids of the sessions that were expired.
    pub async fn expire_inactive(&self, now: DateTime<Utc>) -> EngineResult<Vec<String>> {
        let grace = self.engine_config.expiry_grace_minutes;
        let mut expired = Vec::new();

        for state in self.storage.list_open_sessions().await? {
            let form = match self.form(&state.form_id, state.form_version).await {
                Ok(form) => form,
                Err(e) => {
                    warn!(session_id = %state.session_id, error = %e, "Cannot expire session");
                    continue;
                }
            };

            let deadline = form
                .max_time_minutes
                .checked_add(grace)
                .and_then(Duration::try_minutes)
                .and_then(|budget| state.last_activity_at.checked_add_signed(budget));
            match deadline {
                Some(deadline) if now > deadline => {}
                _ => continue,
            }

            let expected_version = state.version;
            let mut next = state;
            next.version = expected_version + 1;
            next.close(SessionStatus::Expired, TerminationReason::Expired, now);
            let result = self.synthesizer.synthesize(&next, &form);

            if self
                .storage
                .commit_session(&next, expected_version, Some(&result))
                .await?
            {
                info!(
                    session_id = %next.session_id,
                    visited = next.visited_nodes.len(),
                    "Inactive session expired"
                );
                expired.push(next.session_id);
            } else {
                debug!(session_id = %next.session_id, "Session changed during expiry, skipped");
            }
        }

        Ok(expired)
    }

    async fn load_session(&self, session_id: &str) -> EngineResult<SessionState> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| DiagnosticError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// A pinned form version, cached after the first load.
    async fn form(&self, form_id: &str, version: u32) -> EngineResult<Arc<DiagnosticForm>> {
        let key = (form_id.to_string(), version);
        if let Some(form) = self.forms.read().await.get(&key) {
            return Ok(Arc::clone(form));
        }

        let form = self
            .storage
            .get_form(form_id, version)
            .await?
            .ok_or_else(|| DiagnosticError::FormNotFound {
                form_id: form_id.to_string(),
            })?;
        let form = Arc::new(form);
        self.forms.write().await.insert(key, Arc::clone(&form));
        Ok(form)
    }

    async fn with_timeout<T>(
        &self,
        operation: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        let timeout_ms = self.request_config.timeout_ms;
        tokio::time::timeout(StdDuration::from_millis(timeout_ms), operation)
            .await
            .map_err(|_| DiagnosticError::Timeout { timeout_ms })?
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
