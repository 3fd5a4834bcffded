//! Adaptive diagnostic session engine.
//!
//! A session walks one learner through a form's decision graph:
//!
//! ```text
//! start ──► SessionManager ──► DecisionEngine ──► ConfidenceAggregator
//!                │                                        │
//!                └──────── terminal? ──► ResultSynthesizer ┘
//! ```
//!
//! Every submit is one optimistic read-modify-write of the session record.
//! The terminal step writes the session and its result together.

mod aggregator;
mod clock;
mod decision;
mod manager;
mod state;
mod synthesis;
mod view;

pub use aggregator::{primary_misconception, ConfidenceAggregator, EvidenceUpdate};
pub use clock::{Clock, SystemClock};
pub use decision::{confirming_tag, DecisionEngine, DecisionState, Transition};
pub use manager::{
    SessionManager, SessionStart, SubmitOutcome, SubmitRequest, DEFAULT_RESULTS_LIMIT,
};
pub use state::{
    DiagnosticResult, EvidenceRecord, Progress, SessionState, SessionStatus, Severity,
    StepRecord, TerminationReason,
};
pub use synthesis::ResultSynthesizer;
pub use view::{NodeView, OptionView};

#[cfg(test)]
pub(crate) use clock::MockClock;
