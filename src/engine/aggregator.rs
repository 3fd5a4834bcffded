//! Evidence accumulation and misconception confirmation.

use super::decision::confirming_tag;
use super::state::{EvidenceRecord, SessionState};
use crate::form::{DecisionEdge, NodeRef};

/// What a single answer changed in the evidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceUpdate {
    pub evidence: Option<EvidenceRecord>,
    /// Tag corroborated by this answer.
    pub corroborated: Option<String>,
    /// Tags promoted to confirmed by this answer.
    pub newly_confirmed: Vec<String>,
}

/// Folds answers into per-tag confidence.
///
/// Confidence for a tag only ever grows and saturates at 1.0. A tag is
/// confirmed once it reaches the threshold and a confirming probe has
/// corroborated it.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceAggregator {
    confirmation_threshold: f64,
}

impl ConfidenceAggregator {
    pub fn new(confirmation_threshold: f64) -> Self {
        Self {
            confirmation_threshold,
        }
    }

    /// Apply the evidence of `option_id` chosen on `node`.
    pub fn apply(
        &self,
        state: &mut SessionState,
        node: NodeRef<'_>,
        edge: Option<&DecisionEdge>,
        option_id: &str,
    ) -> EvidenceUpdate {
        let mut update = EvidenceUpdate::default();

        if let Some(distractor) = node.distractor(option_id) {
            let delta = edge.map(DecisionEdge::delta).unwrap_or(1.0).max(0.0);
            let contribution = distractor.confidence_weight.max(0.0) * delta;
            if contribution > 0.0 {
                let tag = distractor.misconception_tag.clone();
                let confidence = state
                    .suspected_misconceptions
                    .entry(tag.clone())
                    .or_insert(0.0);
                *confidence = (*confidence + contribution).min(1.0).max(*confidence);

                let record = EvidenceRecord {
                    node_id: node.id().to_string(),
                    option_id: option_id.to_string(),
                    misconception_tag: tag,
                    contribution,
                    confidence_after: *confidence,
                };
                state.evidence.push(record.clone());
                update.evidence = Some(record);
            }
        }

        if let Some(tag) = confirming_tag(node, option_id) {
            if !state.is_corroborated(tag) {
                state.corroborated_misconceptions.push(tag.to_string());
            }
            update.corroborated = Some(tag.to_string());
        }

        let promotable: Vec<String> = state
            .trigger_order()
            .into_iter()
            .filter(|tag| {
                !state.is_confirmed(tag)
                    && state.is_corroborated(tag)
                    && state.confidence(tag) >= self.confirmation_threshold
            })
            .map(str::to_string)
            .collect();
        for tag in promotable {
            state.confirmed_misconceptions.push(tag.clone());
            update.newly_confirmed.push(tag);
        }

        update
    }
}

/// Confirmed tag with the highest confidence.
///
/// Ties go to the tag whose first evidence came earliest.
pub fn primary_misconception(state: &SessionState) -> Option<&str> {
    let mut best: Option<(&str, f64, usize)> = None;
    for tag in &state.confirmed_misconceptions {
        let confidence = state.confidence(tag);
        let first = state.first_trigger_index(tag).unwrap_or(usize::MAX);
        let better = match best {
            None => true,
            Some((_, best_conf, best_first)) => {
                confidence > best_conf || (confidence == best_conf && first < best_first)
            }
        };
        if better {
            best = Some((tag.as_str(), confidence, first));
        }
    }
    best.map(|(tag, _, _)| tag)
}
