//! Fixtures shared by unit tests.

use crate::form::DiagnosticForm;

const SAMPLE_FORM: &str = include_str!("../tests/fixtures/multiplication_form.json");

/// The multiplication form used throughout the unit tests.
pub(crate) fn sample_form() -> DiagnosticForm {
    serde_json::from_str(SAMPLE_FORM).expect("fixture form parses")
}
