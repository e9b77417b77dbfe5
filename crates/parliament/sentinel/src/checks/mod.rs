//! Veto checks evaluated, in order, for threshold actions.
//!
//! Each check answers pass or fail. A check whose own data is missing
//! passes.

use async_trait::async_trait;
use parliament_types::FaultCode;
use regex::Regex;
use serde_json::Value;

use crate::Submission;

mod boundary;
mod legal;
mod origin;
mod regression;

pub use boundary::BoundaryCheck;
pub use legal::LegalCheck;
pub use origin::OriginConstraintCheck;
pub use regression::RegressionCheck;

/// Result of one veto check.
#[derive(Clone, Debug, PartialEq)]
pub enum CheckOutcome {
    Pass,
    Fail { reason: String, fault_code: FaultCode },
}

impl CheckOutcome {
    pub fn fail(reason: impl Into<String>, fault_code: &str) -> Self {
        CheckOutcome::Fail {
            reason: reason.into(),
            fault_code: FaultCode::new(fault_code),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }
}

/// One stage of the veto pipeline.
///
/// The pipeline stops at the first failing check, so implementations must not
/// rely on later checks having run.
#[async_trait]
pub trait VetoCheck: Send + Sync {
    fn check_name(&self) -> &str;

    async fn evaluate(&self, submission: &Submission) -> CheckOutcome;
}

/// Word-bounded, case-insensitive alternation over `keywords`.
///
/// Returns `None` for an empty list so that an unconfigured family never
/// matches.
pub(crate) fn keyword_pattern(keywords: &[String]) -> Result<Option<Regex>, regex::Error> {
    if keywords.is_empty() {
        return Ok(None);
    }
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).map(Some)
}

/// Like [`keyword_pattern`], for snake_case phrase tokens: each `_` matches
/// any run of whitespace or underscores, so `privacy_breach` also matches
/// "privacy breach".
pub(crate) fn phrase_pattern(phrases: &[String]) -> Result<Option<Regex>, regex::Error> {
    let alternatives = phrases
        .iter()
        .map(|phrase| {
            phrase
                .split('_')
                .filter(|word| !word.is_empty())
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"[\s_]+")
        })
        .filter(|alternative| !alternative.is_empty())
        .collect::<Vec<_>>();
    if alternatives.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).map(Some)
}

/// Flattened text of an artifact, as matched by keyword checks.
pub(crate) fn artifact_text(artifact: &Value) -> String {
    match artifact {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn first_match<'t>(pattern: &Option<Regex>, text: &'t str) -> Option<&'t str> {
    pattern
        .as_ref()
        .and_then(|regex| regex.find(text))
        .map(|m| m.as_str())
}
