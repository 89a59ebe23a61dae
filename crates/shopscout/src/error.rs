//! Unified error taxonomy for the assistant.
//!
//! Format errors from generative capabilities are kept distinct from
//! transport failures: the orchestrator maps the former to the help path
//! and never retries them, while transport failures are retried at the
//! client boundary and, on exhaustion, leave the turn uncommitted.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Debug, Error)]
pub enum AssistantError {
    /// Classifier output did not contain a parseable intent tag.
    #[error("classification output was malformed: {output}")]
    ClassificationFormat { output: String },

    /// Classifier produced a syntactically valid label outside the closed
    /// intent taxonomy.
    #[error("classifier returned a label outside the intent taxonomy: {label}")]
    ClassificationRejected { label: String },

    /// Entity extraction returned output that does not parse or validate
    /// against the product-filter schema.
    #[error("entity extraction output was malformed: {reason}")]
    ExtractionFormat { reason: String },

    /// Rank-and-explain output did not parse into a ranking list.
    #[error("ranking output was malformed: {reason}")]
    RankingFormat { reason: String },

    /// Neither the current utterance nor the prior turn identifies which
    /// previously shown product the user means.
    #[error("could not resolve which product the user is referring to")]
    ReferenceNotFound,

    /// An external call exceeded its per-call deadline.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// An external service could not be reached or returned garbage at the
    /// transport level.
    #[error("{service} is unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The structured store rejected or failed a query.
    #[error("store query failed: {0}")]
    StoreQuery(String),
}

impl AssistantError {
    /// Structural/format failures of a generative capability. Never retried
    /// (a nondeterministic capability may repeat the same malformed output);
    /// the orchestrator answers with the help reply instead.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::ClassificationFormat { .. }
                | Self::ClassificationRejected { .. }
                | Self::ExtractionFormat { .. }
                | Self::RankingFormat { .. }
        )
    }

    /// Transient transport failures, eligible for bounded retry with backoff
    /// at the calling client's boundary.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_errors_are_not_transient() {
        let err = AssistantError::ClassificationRejected {
            label: "chitchat".into(),
        };
        assert!(err.is_format_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = AssistantError::Timeout {
            operation: "semantic search",
            timeout_ms: 30_000,
        };
        assert!(err.is_transient());
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_store_query_is_neither_retried_nor_format() {
        let err = AssistantError::StoreQuery("unknown label Subcategorie".into());
        assert!(!err.is_transient());
        assert!(!err.is_format_error());
    }
}
