//! Display payloads for the node a learner is currently on.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::OptionOrder;
use crate::form::{NodeKind, NodeRef, ProbeType};

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionView {
    pub option_id: String,
    pub value: String,
}

/// What a client needs to render a node.
///
/// Correctness and misconception tags are never exposed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_type: Option<ProbeType>,
    pub stem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_aid_url: Option<String>,
    pub estimated_time_seconds: u32,
    pub options: Vec<OptionView>,
}

impl NodeView {
    /// Build the view of `node` for `session_id`.
    ///
    /// With [`OptionOrder::Seeded`] the same session and node always produce
    /// the same order, so reloading a page never reshuffles the answers.
    pub fn build(node: NodeRef<'_>, session_id: &str, order: OptionOrder) -> Self {
        let mut options: Vec<OptionView> = std::iter::once(OptionView {
            option_id: node.correct_answer().option_id.clone(),
            value: node.correct_answer().value.clone(),
        })
        .chain(node.distractors().iter().map(|d| OptionView {
            option_id: d.option_id.clone(),
            value: d.value.clone(),
        }))
        .collect();

        if order == OptionOrder::Seeded {
            let mut rng = StdRng::seed_from_u64(shuffle_seed(session_id, node.id()));
            options.shuffle(&mut rng);
        }

        Self {
            node_id: node.id().to_string(),
            kind: node.kind(),
            probe_type: node.as_probe().map(|p| p.probe_type),
            stem: node.stem().to_string(),
            context: node.context().map(str::to_string),
            visual_aid_url: node.visual_aid_url().map(str::to_string),
            estimated_time_seconds: node.estimated_time_seconds(),
            options,
        }
    }
}

fn shuffle_seed(session_id: &str, node_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(node_id.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
