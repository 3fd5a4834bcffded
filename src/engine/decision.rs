//! Branching rules: where a session goes after an answer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::state::{SessionState, TerminationReason};
use crate::error::IntegrityError;
use crate::form::{DecisionEdge, DiagnosticForm, NodeKind, NodeRef};

/// Position of a session in the decision graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum DecisionState {
    /// Waiting on a root-level item.
    AtItem(String),
    /// Waiting on a follow-up probe.
    AtProbe(String),
    /// No further questions.
    Terminal(TerminationReason),
}

impl DecisionState {
    /// State for a session sitting on `node`.
    pub fn at(node: NodeRef<'_>) -> Self {
        match node.kind() {
            NodeKind::Item => DecisionState::AtItem(node.id().to_string()),
            NodeKind::Probe => DecisionState::AtProbe(node.id().to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DecisionState::Terminal(_))
    }

    /// Node the session should move to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            DecisionState::AtItem(id) | DecisionState::AtProbe(id) => Some(id),
            DecisionState::Terminal(_) => None,
        }
    }
}

/// Result of evaluating one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<'a> {
    pub next: DecisionState,
    /// Edge followed for the answer, when the form has one.
    pub edge: Option<&'a DecisionEdge>,
}

/// The tag a confirming probe validates when answered with `option_id`.
///
/// Only a probe with `confirms_misconception` answered by the distractor
/// carrying the probe's own tag corroborates.
pub fn confirming_tag<'a>(node: NodeRef<'a>, option_id: &str) -> Option<&'a str> {
    let probe = node.as_probe().filter(|p| p.confirms_misconception)?;
    let distractor = node.distractor(option_id)?;
    (distractor.misconception_tag == probe.misconception_tag)
        .then_some(probe.misconception_tag.as_str())
}

/// Stateless branching rules over a form.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine<'a> {
    form: &'a DiagnosticForm,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(form: &'a DiagnosticForm) -> Self {
        Self { form }
    }

    /// Resolve a node of the form, failing on a dangling reference.
    pub fn node(&self, node_id: &str) -> Result<NodeRef<'a>, IntegrityError> {
        self.form
            .node(node_id)
            .ok_or_else(|| IntegrityError::MissingNode {
                form_id: self.form.form_id.clone(),
                node_id: node_id.to_string(),
            })
    }

    /// Decide the next state after `option_id` was chosen on `node`.
    ///
    /// `session.visited_nodes` must already include `node`. The terminal
    /// predicate is evaluated once, with forced termination taking
    /// precedence over the edge's own target.
    pub fn next(
        &self,
        session: &SessionState,
        node: NodeRef<'a>,
        option_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition<'a>, IntegrityError> {
        let edge = self.form.edge(node.id(), option_id);
        let target = match edge.and_then(|e| e.to_node_id.as_deref()) {
            Some(to) => Some(self.node(to)?),
            None => None,
        };

        if let Some(reason) = self.forced_termination(session, node, option_id, now) {
            return Ok(Transition {
                next: DecisionState::Terminal(reason),
                edge,
            });
        }

        let next = match target {
            Some(target) => {
                if session.visited_nodes.iter().any(|v| v == target.id()) {
                    return Err(IntegrityError::Revisit {
                        session_id: session.session_id.clone(),
                        node_id: target.id().to_string(),
                    });
                }
                DecisionState::at(target)
            }
            None if edge.is_some() => DecisionState::Terminal(TerminationReason::EndOfPath),
            None => DecisionState::Terminal(TerminationReason::NoEdge),
        };

        Ok(Transition { next, edge })
    }

    fn forced_termination(
        &self,
        session: &SessionState,
        node: NodeRef<'a>,
        option_id: &str,
        now: DateTime<Utc>,
    ) -> Option<TerminationReason> {
        if confirming_tag(node, option_id).is_some() {
            return Some(TerminationReason::MisconceptionConfirmed);
        }
        let over_time = Duration::try_minutes(self.form.max_time_minutes)
            .is_some_and(|limit| now - session.started_at > limit);
        if over_time {
            return Some(TerminationReason::TimeLimit);
        }
        if session.visited_nodes.len() >= self.form.max_depth {
            return Some(TerminationReason::MaxDepth);
        }
        None
    }
}
