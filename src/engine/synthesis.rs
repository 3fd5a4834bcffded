//! Turns accumulated evidence into a [`DiagnosticResult`].

use std::collections::BTreeSet;
use std::sync::Arc;

use super::aggregator::primary_misconception;
use super::state::{generate_id, DiagnosticResult, SessionState, Severity, TerminationReason};
use crate::catalog::RemediationCatalog;
use crate::config::EngineConfig;
use crate::form::DiagnosticForm;

/// Score ceiling for sessions closed by the inactivity sweep.
const EXPIRED_SCORE_CAP: f64 = 0.3;

/// Builds the final result of a terminal session.
#[derive(Clone)]
pub struct ResultSynthesizer {
    config: EngineConfig,
    catalog: Arc<dyn RemediationCatalog>,
}

impl ResultSynthesizer {
    pub fn new(config: EngineConfig, catalog: Arc<dyn RemediationCatalog>) -> Self {
        Self { config, catalog }
    }

    /// Synthesize the result of a closed session.
    pub fn synthesize(&self, state: &SessionState, form: &DiagnosticForm) -> DiagnosticResult {
        let termination = state.termination.unwrap_or(TerminationReason::EndOfPath);
        let primary = primary_misconception(state).map(str::to_string);
        let severity = self.severity(state, primary.as_deref());
        let recommended_interventions = if severity == Severity::Low {
            Vec::new()
        } else {
            self.interventions(state, form)
        };

        let mut confidence_score = self.confidence_score(state, primary.as_deref());
        if termination == TerminationReason::Expired {
            confidence_score = confidence_score.min(EXPIRED_SCORE_CAP);
        }

        DiagnosticResult {
            result_id: generate_id("RESULT"),
            session_id: state.session_id.clone(),
            learner_id: state.learner_id.clone(),
            form_id: state.form_id.clone(),
            primary_misconception: primary.clone(),
            all_misconceptions: state.suspected_misconceptions.clone(),
            confirmed_misconceptions: state.confirmed_misconceptions.clone(),
            severity,
            response_path: state.visited_nodes.clone(),
            key_evidence: state.evidence.clone(),
            recommended_interventions,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            teacher_summary: self.teacher_summary(state, primary.as_deref(), severity, termination),
            learner_feedback: self.learner_feedback(primary.as_deref(), severity),
            termination,
            completed_at: state.completed_at.unwrap_or(state.last_activity_at),
            total_time_seconds: state.total_time_seconds,
        }
    }

    /// Severity ladder, most serious first.
    pub fn severity(&self, state: &SessionState, primary: Option<&str>) -> Severity {
        if let Some(tag) = primary {
            let confidence = state.confidence(tag);
            if confidence >= self.config.critical_severity_threshold
                || state.confirmed_misconceptions.len() > 1
                || self.affected_skills(state) >= self.config.breadth_critical_skills
            {
                return Severity::Critical;
            }
            if confidence >= self.config.high_severity_threshold {
                return Severity::High;
            }
            return Severity::Medium;
        }

        let above_noise = state
            .suspected_misconceptions
            .values()
            .any(|c| *c > self.config.noise_floor);
        if above_noise {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Distinct prerequisite skills touched by the confirmed tags.
    fn affected_skills(&self, state: &SessionState) -> usize {
        state
            .confirmed_misconceptions
            .iter()
            .flat_map(|tag| self.catalog.prerequisite_skills(tag))
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Micro-interventions from visited confirming probes first, then the
    /// catalogue's interventions for each confirmed tag.
    fn interventions(&self, state: &SessionState, form: &DiagnosticForm) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for tag in &state.confirmed_misconceptions {
            let micro = form
                .probes
                .iter()
                .filter(|p| &p.misconception_tag == tag && state.visited_nodes.contains(&p.probe_id))
                .filter_map(|p| p.micro_intervention_id.clone());
            for id in micro.chain(self.catalog.interventions(tag)) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Certainty of the diagnosis as a whole.
    ///
    /// With a primary tag this is its confidence. With nothing above the
    /// noise floor it is the certainty that nothing is wrong. Otherwise the
    /// top confidence is discounted by how evenly evidence is spread.
    pub fn confidence_score(&self, state: &SessionState, primary: Option<&str>) -> f64 {
        if let Some(tag) = primary {
            return state.confidence(tag);
        }

        let top = state
            .suspected_misconceptions
            .values()
            .copied()
            .fold(0.0_f64, f64::max);
        if top <= self.config.noise_floor {
            return 1.0 - top;
        }

        let values: Vec<f64> = state
            .suspected_misconceptions
            .values()
            .copied()
            .filter(|v| *v > 0.0)
            .collect();
        (1.0 - normalized_entropy(&values)) * top
    }

    fn teacher_summary(
        &self,
        state: &SessionState,
        primary: Option<&str>,
        severity: Severity,
        termination: TerminationReason,
    ) -> String {
        let mut summary = match primary {
            Some(tag) => {
                let mut text = format!(
                    "**Primary Misconception Detected**: {}\n\n**Severity**: {}\n\n",
                    self.catalog.display_name(tag),
                    severity.to_string().to_uppercase()
                );
                if let Some(entry) = self.catalog.entry(tag) {
                    text.push_str(&format!("**Description**: {}\n\n", entry.description));
                }
                text.push_str(&format!(
                    "**Confidence**: {:.0}%\n\n",
                    state.confidence(tag) * 100.0
                ));
                let others = state.confirmed_misconceptions.len().saturating_sub(1);
                if others > 0 {
                    text.push_str(&format!(
                        "**Additional Concerns**: {} other confirmed misconception(s).\n\n",
                        others
                    ));
                }
                match self.catalog.entry(tag) {
                    Some(entry) => text.push_str(&format!(
                        "**Recommended Action**: {}",
                        entry.remediation_strategy
                    )),
                    None => text.push_str(
                        "**Recommended Action**: Assign a targeted micro-intervention for this misconception.",
                    ),
                }
                text
            }
            None if severity == Severity::Medium => {
                let (tag, confidence) = state
                    .suspected_misconceptions
                    .iter()
                    .fold(("", 0.0_f64), |best, (tag, c)| {
                        if *c > best.1 {
                            (tag.as_str(), *c)
                        } else {
                            best
                        }
                    });
                format!(
                    "**Possible Misconception**: {} ({:.0}% confidence)\n\n\
                     Not confirmed by a follow-up probe. Reassess before assigning remediation.",
                    self.catalog.display_name(tag),
                    confidence * 100.0
                )
            }
            None => "Learner demonstrated mastery of this objective. No significant misconceptions detected."
                .to_string(),
        };

        if termination == TerminationReason::Expired {
            summary.push_str("\n\n_Session expired before completion; findings are provisional._");
        }
        summary
    }

    fn learner_feedback(&self, primary: Option<&str>, severity: Severity) -> String {
        match (primary, severity) {
            (Some(_), _) => "Thank you for completing this diagnostic. Your teacher will look at your answers \
                             and help you practise this idea.\n\nMistakes are part of learning! \
                             A little extra practice here will build your confidence."
                .to_string(),
            (None, Severity::Medium) => "Good effort! One of your answers suggests an idea worth another look. \
                                         Keep practising."
                .to_string(),
            (None, _) => "Great work! You've shown a strong understanding of this topic. Keep it up!"
                .to_string(),
        }
    }
}

/// Shannon entropy of `values` normalised to 0-1.
fn normalized_entropy(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let entropy: f64 = values
        .iter()
        .map(|v| v / total)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.ln())
        .sum();
    (entropy / (values.len() as f64).ln()).clamp(0.0, 1.0)
}
