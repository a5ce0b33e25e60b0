use thiserror::Error;

/// Result of parsing one raw line.
pub type ParseResult<T> = Result<T, Reject>;

/// Why a raw line did not produce a canonical record.
///
/// Rejects are an expected outcome for uncontrolled upstream input and never
/// fail a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reject {
    #[error("comment or header line")]
    Comment,
    #[error("empty line")]
    Empty,
    #[error("event kind {0:?} is not handled by this source")]
    OtherEventKind(String),
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("field {field} is not a valid number: {value:?}")]
    BadNumber { field: &'static str, value: String },
    #[error("field {field} is not an IP address: {value:?}")]
    BadAddress { field: &'static str, value: String },
    #[error("field {field} is not a valid timestamp: {value:?}")]
    BadTimestamp { field: &'static str, value: String },
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("invalid JSON: {0}")]
    BadJson(String),
}

impl Reject {
    /// Lines that are skipped silently rather than counted as malformed.
    pub fn is_expected(&self) -> bool {
        matches!(self, Reject::Comment | Reject::Empty | Reject::OtherEventKind(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_kinds_are_expected() {
        assert!(Reject::Comment.is_expected());
        assert!(Reject::OtherEventKind("flow".into()).is_expected());
        assert!(!Reject::MissingField("uid").is_expected());
        assert!(!Reject::TooFewFields { expected: 12, found: 3 }.is_expected());
    }

    #[test]
    fn display_names_the_field() {
        let r = Reject::BadNumber { field: "source_port", value: "abc".into() };
        assert_eq!(r.to_string(), "field source_port is not a valid number: \"abc\"");
    }
}
