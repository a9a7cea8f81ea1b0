//! Error types for the chainextender pipeline.

use thiserror::Error;

/// Entity kinds handled by the identity resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Address,
    Coin,
    Validator,
    Pool,
    Order,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Coin => write!(f, "coin"),
            Self::Validator => write!(f, "validator"),
            Self::Pool => write!(f, "liquidity pool"),
            Self::Order => write!(f, "order"),
        }
    }
}

/// How the pipeline reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient: retry the operation after a delay.
    Retryable,
    /// Log and skip the offending item; the block continues.
    Skip,
    /// Stop the pipeline; the supervisor shuts down.
    Fatal,
}

/// Errors that can occur while extending the store from the node.
#[derive(Debug, Error)]
pub enum ExtenderError {
    #[error("Node error: {0}")]
    Node(String),

    #[error("Block {height} is not available on the node yet")]
    BlockNotReady { height: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("Foreign key violation: {kind} id {id} referenced before it was written")]
    ForeignKey { kind: EntityKind, id: u64 },

    #[error("Coin id sequence mismatch: expected {expected}, node reported {reported}")]
    CoinSequence { expected: u64, reported: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ExtenderError>,
    },

    #[error("Extender aborted: {reason}")]
    Aborted { reason: String },
}

impl ExtenderError {
    /// Classify the error for the caller's retry/skip/stop decision.
    ///
    /// `NotFound` is fatal here; pipelines running with lenient resolution
    /// downgrade it via [`ExtenderError::class_with`].
    pub fn class(&self) -> ErrorClass {
        self.class_with(true)
    }

    /// Classify the error, treating resolution failures as fatal only when
    /// `strict_resolution` is set.
    pub fn class_with(&self, strict_resolution: bool) -> ErrorClass {
        match self {
            Self::Node(_) | Self::BlockNotReady { .. } | Self::Storage(_) => ErrorClass::Retryable,
            Self::Decode(_) => ErrorClass::Skip,
            Self::NotFound { .. } if !strict_resolution => ErrorClass::Skip,
            Self::NotFound { .. }
            | Self::ForeignKey { .. }
            | Self::CoinSequence { .. }
            | Self::Config(_)
            | Self::RetriesExhausted { .. }
            | Self::Aborted { .. } => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if the error is transient.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn decode(reason: impl std::fmt::Display) -> Self {
        Self::Decode(reason.to_string())
    }
}

impl From<serde_json::Error> for ExtenderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ExtenderError::Node("connection refused".into()).is_retryable());
        assert!(ExtenderError::BlockNotReady { height: 5 }.is_retryable());
        assert!(ExtenderError::Storage("deadlock".into()).is_retryable());
    }

    #[test]
    fn resolution_strictness_is_configurable() {
        let err = ExtenderError::not_found(EntityKind::Address, "Mx00");
        assert_eq!(err.class_with(true), ErrorClass::Fatal);
        assert_eq!(err.class_with(false), ErrorClass::Skip);
    }

    #[test]
    fn exhausted_retries_are_fatal() {
        let err = ExtenderError::RetriesExhausted {
            attempts: 3,
            source: Box::new(ExtenderError::Storage("timeout".into())),
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.to_string().contains("timeout"));
    }
}
