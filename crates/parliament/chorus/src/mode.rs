use std::sync::LazyLock;

use parliament_types::Mode;
use regex::Regex;

static EXECUTION_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(run|execute|perform|deploy|start|delete|create file)\b")
        .expect("valid execution regex")
});

static CREATION_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(plan|design|create|build|generate|write|compose|mythos|worldbuild\w*)\b")
        .expect("valid creation regex")
});

/// Classify raw input: execution terms win over creation terms; anything
/// else is an inquiry.
pub fn detect_mode(input: &str) -> Mode {
    if EXECUTION_TERMS.is_match(input) {
        Mode::Execution
    } else if CREATION_TERMS.is_match(input) {
        Mode::Creation
    } else {
        Mode::Inquiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_terms_take_precedence() {
        assert_eq!(detect_mode("Create a file and run the tests"), Mode::Execution);
        assert_eq!(detect_mode("Delete the draft"), Mode::Execution);
    }

    #[test]
    fn creation_terms() {
        assert_eq!(detect_mode("Design a mythos about emergence"), Mode::Creation);
        assert_eq!(detect_mode("Some worldbuilding please"), Mode::Creation);
    }

    #[test]
    fn terms_match_whole_words_only() {
        // "planet" is not "plan", "restart" is not "start"
        assert_eq!(detect_mode("Which planet did we restart from?"), Mode::Inquiry);
        assert_eq!(detect_mode("What is my mission?"), Mode::Inquiry);
    }
}
