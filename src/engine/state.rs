//! Persisted session records and the results synthesized from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::DiagnosticForm;

/// Lifecycle status of a diagnostic session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the next answer.
    #[default]
    InProgress,
    /// Reached a terminal node and has a result.
    Completed,
    /// Abandoned past its time budget; has a forced result.
    Expired,
    /// Stopped on a malformed form. No result.
    Aborted,
}

impl SessionStatus {
    /// Whether the session can still accept answers.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::InProgress)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Expired => write!(f, "expired"),
            SessionStatus::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            "aborted" => Ok(SessionStatus::Aborted),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Why a session stopped asking questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The answered option's edge has no target.
    EndOfPath,
    /// No edge leaves the answered node for that option.
    NoEdge,
    /// The visit ceiling was reached.
    MaxDepth,
    /// The session ran past its time budget.
    TimeLimit,
    /// A confirming probe was answered with its own misconception.
    MisconceptionConfirmed,
    /// Closed by the inactivity sweep.
    Expired,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::EndOfPath => write!(f, "end_of_path"),
            TerminationReason::NoEdge => write!(f, "no_edge"),
            TerminationReason::MaxDepth => write!(f, "max_depth"),
            TerminationReason::TimeLimit => write!(f, "time_limit"),
            TerminationReason::MisconceptionConfirmed => write!(f, "misconception_confirmed"),
            TerminationReason::Expired => write!(f, "expired"),
        }
    }
}

/// One answered node, kept for replay and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: String,
    pub option_id: String,
    pub correct: bool,
    pub time_spent_seconds: u32,
    /// Node the session moved to, `None` when the step ended it.
    pub next_node_id: Option<String>,
    pub answered_at: DateTime<Utc>,
}

/// A single contribution toward a misconception tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub node_id: String,
    pub option_id: String,
    pub misconception_tag: String,
    pub contribution: f64,
    /// Accumulated confidence for the tag after this record.
    pub confidence_after: f64,
}

/// Durable state of one learner's walk through a form.
///
/// Everything the engine needs between requests lives here; the record is
/// frozen once `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub learner_id: String,
    pub form_id: String,
    pub form_version: u32,
    pub status: SessionStatus,
    pub current_node_id: String,
    pub node_entered_at: DateTime<Utc>,
    /// Answered nodes in order. Append-only.
    pub visited_nodes: Vec<String>,
    /// Node id to selected option id.
    pub responses: BTreeMap<String, String>,
    pub steps: Vec<StepRecord>,
    /// Tag to accumulated confidence. Values never decrease.
    pub suspected_misconceptions: BTreeMap<String, f64>,
    /// Confirmed tags in promotion order.
    pub confirmed_misconceptions: Vec<String>,
    /// Tags validated by their confirming probe.
    pub corroborated_misconceptions: Vec<String>,
    pub evidence: Vec<EvidenceRecord>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_time_seconds: i64,
    pub termination: Option<TerminationReason>,
    pub abort_reason: Option<String>,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
}

impl SessionState {
    /// Create a fresh session positioned at the form's root item.
    pub fn new(learner_id: impl Into<String>, form: &DiagnosticForm, now: DateTime<Utc>) -> Self {
        Self {
            session_id: generate_id("SESSION"),
            learner_id: learner_id.into(),
            form_id: form.form_id.clone(),
            form_version: form.version,
            status: SessionStatus::InProgress,
            current_node_id: form.root_item_id.clone(),
            node_entered_at: now,
            visited_nodes: Vec::new(),
            responses: BTreeMap::new(),
            steps: Vec::new(),
            suspected_misconceptions: BTreeMap::new(),
            confirmed_misconceptions: Vec::new(),
            corroborated_misconceptions: Vec::new(),
            evidence: Vec::new(),
            started_at: now,
            last_activity_at: now,
            completed_at: None,
            total_time_seconds: 0,
            termination: None,
            abort_reason: None,
            version: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// The most recently answered step.
    pub fn last_step(&self) -> Option<&StepRecord> {
        self.steps.last()
    }

    /// Accumulated confidence for `tag`, 0.0 when never seen.
    pub fn confidence(&self, tag: &str) -> f64 {
        self.suspected_misconceptions
            .get(tag)
            .copied()
            .unwrap_or(0.0)
    }

    /// Position of the first evidence record for `tag`.
    pub fn first_trigger_index(&self, tag: &str) -> Option<usize> {
        self.evidence
            .iter()
            .position(|e| e.misconception_tag == tag)
    }

    /// Distinct tags in the order they were first triggered.
    pub fn trigger_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        for record in &self.evidence {
            if !order.contains(&record.misconception_tag.as_str()) {
                order.push(&record.misconception_tag);
            }
        }
        order
    }

    pub fn is_corroborated(&self, tag: &str) -> bool {
        self.corroborated_misconceptions.iter().any(|t| t == tag)
    }

    pub fn is_confirmed(&self, tag: &str) -> bool {
        self.confirmed_misconceptions.iter().any(|t| t == tag)
    }

    /// Freeze the session with a terminal status.
    pub fn close(
        &mut self,
        status: SessionStatus,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.termination = Some(reason);
        self.completed_at = Some(now);
        self.last_activity_at = now;
        self.total_time_seconds = (now - self.started_at).num_seconds().max(0);
    }

    /// Mark the session aborted after an integrity failure.
    pub fn abort(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = SessionStatus::Aborted;
        self.abort_reason = Some(reason.into());
        self.completed_at = Some(now);
        self.last_activity_at = now;
        self.total_time_seconds = (now - self.started_at).num_seconds().max(0);
    }

    /// Progress indicators against the form's visit ceiling.
    pub fn progress(&self, max_depth: usize) -> Progress {
        Progress::new(self.visited_nodes.len(), max_depth, self.is_complete())
    }
}

/// Progress indicators for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub nodes_visited: usize,
    pub max_nodes: usize,
    /// Fraction of the visit ceiling used, 1.0 once complete.
    pub completion: f64,
    pub path_description: String,
}

impl Progress {
    pub fn new(nodes_visited: usize, max_nodes: usize, complete: bool) -> Self {
        let completion = if complete || max_nodes == 0 {
            1.0
        } else {
            (nodes_visited as f64 / max_nodes as f64).min(1.0)
        };
        let path_description = if complete {
            format!("Completed after {} of up to {} steps", nodes_visited, max_nodes)
        } else {
            format!("Step {} of up to {}", nodes_visited + 1, max_nodes)
        };
        Self {
            nodes_visited,
            max_nodes,
            completion,
            path_description,
        }
    }
}

/// How serious the detected gaps are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Final, immutable outcome of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub result_id: String,
    pub session_id: String,
    pub learner_id: String,
    pub form_id: String,
    pub primary_misconception: Option<String>,
    /// Final confidence for every tag that received evidence.
    pub all_misconceptions: BTreeMap<String, f64>,
    pub confirmed_misconceptions: Vec<String>,
    pub severity: Severity,
    pub response_path: Vec<String>,
    pub key_evidence: Vec<EvidenceRecord>,
    pub recommended_interventions: Vec<String>,
    pub confidence_score: f64,
    pub teacher_summary: String,
    pub learner_feedback: String,
    pub termination: TerminationReason,
    pub completed_at: DateTime<Utc>,
    pub total_time_seconds: i64,
}

/// `PREFIX-` followed by 16 upper-case hex digits.
pub(crate) fn generate_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", prefix, &hex[..16])
}
