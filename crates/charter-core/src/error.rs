//! Error types for Charter

/// Result type alias using Charter's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Charter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Submitted action is missing required fields or otherwise unusable.
    /// Rejected before evaluation; distinct from a deny decision.
    #[error("malformed action: {0}")]
    MalformedAction(String),

    /// Internal rule-engine fault. Treated as a critical violation on the
    /// evaluation path (fail-closed).
    #[error("evaluator fault: {0}")]
    Evaluator(String),

    /// Decision cache could not serve the request; callers fall back to
    /// direct evaluation in degraded mode.
    #[error("decision cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Tier 3 consensus could not reach quorum within its budget
    #[error("consensus quorum not reached within budget")]
    ConsensusTimeout,

    /// Tier 4 review window elapsed without human input
    #[error("human review timed out")]
    HumanReviewTimeout,

    /// Audit transport publish failure
    #[error("transport error: {0}")]
    Transport(String),

    /// PII scrubbing failure; affected events are dropped, never forwarded raw
    #[error("scrub error: {0}")]
    Scrub(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new malformed-action error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedAction(msg.into())
    }

    /// Create a new evaluator error
    pub fn evaluator(msg: impl Into<String>) -> Self {
        Self::Evaluator(msg.into())
    }

    /// Create a new cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new scrub error
    pub fn scrub(msg: impl Into<String>) -> Self {
        Self::Scrub(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
