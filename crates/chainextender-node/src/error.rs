//! Transport-level errors of the node and broadcast clients.

use chainextender_core::error::ExtenderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Node API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl NodeError {
    /// The node answers unknown heights, coins and addresses with either a
    /// 404 or an API error whose message says "not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Status { status, .. } => *status == 404,
            Self::Api { code, message } => code == "404" || message.to_ascii_lowercase().contains("not found"),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<NodeError> for ExtenderError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Decode(msg) => ExtenderError::Decode(msg),
            // 4xx other than not-found will not fix itself on retry.
            NodeError::Status { status, body } if (400..500).contains(&status) && status != 404 && status != 429 => {
                ExtenderError::Aborted {
                    reason: format!("node rejected request with HTTP {status}: {body}"),
                }
            }
            other => ExtenderError::Node(other.to_string()),
        }
    }
}
