//! Diagnostic form graph: items, probes and the decision edges between them.
//!
//! Forms are authored elsewhere and arrive as JSON. Once registered they are
//! immutable; the engine only ever reads them.

mod validate;


use serde::{Deserialize, Serialize};

/// The correct option of an item or probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectAnswer {
    /// Option identifier (e.g. "A").
    pub option_id: String,
    /// Displayed answer value.
    pub value: String,
    /// Expected reasoning behind the correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// An incorrect option mapped to a misconception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distractor {
    /// Option identifier, unique within its node.
    pub option_id: String,
    /// Displayed answer value.
    pub value: String,
    /// Misconception this choice is evidence for.
    pub misconception_tag: String,
    /// How strongly choosing this option indicates the tag (0.0-1.0).
    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f64,
    /// Follow-up probe for this misconception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_probe_id: Option<String>,
    /// Why this distractor targets the misconception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

fn default_confidence_weight() -> f64 {
    0.7
}

fn default_item_time() -> u32 {
    60
}

fn default_probe_time() -> u32 {
    45
}

fn default_confirms() -> bool {
    true
}

fn default_max_depth() -> usize {
    3
}

/// Upper bound for any time limit, in minutes (one year).
pub const MAX_TIME_LIMIT_MINUTES: i64 = 525_600;

fn default_max_time_minutes() -> i64 {
    8
}

fn default_version() -> u32 {
    1
}

/// A root-level diagnostic question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    pub item_id: String,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_aid_url: Option<String>,
    pub correct_answer: CorrectAnswer,
    pub distractors: Vec<Distractor>,
    #[serde(default = "default_item_time")]
    pub estimated_time_seconds: u32,
}

/// Kind of follow-up probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    /// One-step check of the same concept.
    #[default]
    QuickConfirmer,
    /// Same flawed rule applied in a new context.
    ErrorModelProbe,
    /// Same concept, different representation.
    TransferProbe,
    /// Checks a missing foundational skill.
    PrerequisiteCheck,
}

/// A follow-up question reachable only through a distractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticProbe {
    pub probe_id: String,
    #[serde(default)]
    pub probe_type: ProbeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_item_id: Option<String>,
    /// The suspicion this probe investigates.
    pub misconception_tag: String,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_aid_url: Option<String>,
    pub correct_answer: CorrectAnswer,
    pub distractors: Vec<Distractor>,
    /// Whether this probe exists to confirm `misconception_tag`.
    #[serde(default = "default_confirms")]
    pub confirms_misconception: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micro_intervention_id: Option<String>,
    #[serde(default = "default_probe_time")]
    pub estimated_time_seconds: u32,
}

/// `(from_node_id, option_selected) -> to_node_id` branch in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEdge {
    pub from_node_id: String,
    pub option_selected: String,
    /// Next node, or `None` when this branch ends the session.
    #[serde(default)]
    pub to_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconception_tag: Option<String>,
    /// Multiplier applied to the distractor weight (defaults to 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_delta: Option<f64>,
}

impl DecisionEdge {
    /// Effective evidence multiplier for this edge.
    pub fn delta(&self) -> f64 {
        self.confidence_delta.unwrap_or(1.0)
    }
}

/// A complete diagnostic decision graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticForm {
    pub form_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<u8>,
    pub root_item_id: String,
    pub items: Vec<DiagnosticItem>,
    #[serde(default)]
    pub probes: Vec<DiagnosticProbe>,
    pub edges: Vec<DecisionEdge>,
    /// Ceiling on visited nodes per session.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_time_minutes")]
    pub max_time_minutes: i64,
    #[serde(default = "default_version")]
    pub version: u32,
}

/// Whether a node is a root-level item or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Item,
    Probe,
}

/// Borrowed view over either node type.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Item(&'a DiagnosticItem),
    Probe(&'a DiagnosticProbe),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            NodeRef::Item(item) => &item.item_id,
            NodeRef::Probe(probe) => &probe.probe_id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Item(_) => NodeKind::Item,
            NodeRef::Probe(_) => NodeKind::Probe,
        }
    }

    pub fn stem(&self) -> &'a str {
        match self {
            NodeRef::Item(item) => &item.stem,
            NodeRef::Probe(probe) => &probe.stem,
        }
    }

    pub fn context(&self) -> Option<&'a str> {
        match self {
            NodeRef::Item(item) => item.context.as_deref(),
            NodeRef::Probe(probe) => probe.context.as_deref(),
        }
    }

    pub fn visual_aid_url(&self) -> Option<&'a str> {
        match self {
            NodeRef::Item(item) => item.visual_aid_url.as_deref(),
            NodeRef::Probe(probe) => probe.visual_aid_url.as_deref(),
        }
    }

    pub fn correct_answer(&self) -> &'a CorrectAnswer {
        match self {
            NodeRef::Item(item) => &item.correct_answer,
            NodeRef::Probe(probe) => &probe.correct_answer,
        }
    }

    pub fn distractors(&self) -> &'a [Distractor] {
        match self {
            NodeRef::Item(item) => &item.distractors,
            NodeRef::Probe(probe) => &probe.distractors,
        }
    }

    pub fn estimated_time_seconds(&self) -> u32 {
        match self {
            NodeRef::Item(item) => item.estimated_time_seconds,
            NodeRef::Probe(probe) => probe.estimated_time_seconds,
        }
    }

    /// The probe behind this node, if it is one.
    pub fn as_probe(&self) -> Option<&'a DiagnosticProbe> {
        match self {
            NodeRef::Probe(probe) => Some(probe),
            NodeRef::Item(_) => None,
        }
    }

    /// All option ids: the correct answer first, then distractors.
    pub fn option_ids(&self) -> impl Iterator<Item = &'a str> {
        std::iter::once(self.correct_answer().option_id.as_str())
            .chain(self.distractors().iter().map(|d| d.option_id.as_str()))
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.option_ids().any(|id| id == option_id)
    }

    /// The distractor behind `option_id`, or `None` for the correct answer.
    pub fn distractor(&self, option_id: &str) -> Option<&'a Distractor> {
        self.distractors().iter().find(|d| d.option_id == option_id)
    }
}

/// Short description of a registered form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub form_id: String,
    pub title: String,
    pub version: u32,
    pub item_count: usize,
    pub probe_count: usize,
    pub edge_count: usize,
    pub max_depth: usize,
    pub max_time_minutes: i64,
}

impl DiagnosticForm {
    /// Look up an item or probe by id.
    pub fn node(&self, node_id: &str) -> Option<NodeRef<'_>> {
        self.items
            .iter()
            .find(|item| item.item_id == node_id)
            .map(NodeRef::Item)
            .or_else(|| {
                self.probes
                    .iter()
                    .find(|probe| probe.probe_id == node_id)
                    .map(NodeRef::Probe)
            })
    }

    /// The edge leaving `from_node_id` for `option_selected`, if any.
    pub fn edge(&self, from_node_id: &str, option_selected: &str) -> Option<&DecisionEdge> {
        self.edges
            .iter()
            .find(|e| e.from_node_id == from_node_id && e.option_selected == option_selected)
    }

    /// Iterate over all nodes, items first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.items
            .iter()
            .map(NodeRef::Item)
            .chain(self.probes.iter().map(NodeRef::Probe))
    }

    pub fn summary(&self) -> FormSummary {
        FormSummary {
            form_id: self.form_id.clone(),
            title: self.title.clone(),
            version: self.version,
            item_count: self.items.len(),
            probe_count: self.probes.len(),
            edge_count: self.edges.len(),
            max_depth: self.max_depth,
            max_time_minutes: self.max_time_minutes,
        }
    }
}
