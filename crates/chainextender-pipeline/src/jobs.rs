//! Units of work handed from the loop to the worker streams.

use chrono::{DateTime, Utc};

use chainextender_core::event::NodeEvent;
use chainextender_core::types::NodeTransaction;

/// One transaction of a persisted block.
#[derive(Debug, Clone)]
pub struct TxJob {
    pub block_id: u64,
    pub created_at: DateTime<Utc>,
    pub tx: NodeTransaction,
}

/// A value transfer awaiting its recipient id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOutput {
    pub to: String,
    pub coin_id: u64,
    pub value: String,
}

/// Outputs of one stored transaction. Sent even when `outputs` is empty so
/// the sender still gets indexed.
#[derive(Debug, Clone)]
pub struct OutputJob {
    pub transaction_id: u64,
    pub outputs: Vec<PendingOutput>,
}

/// Events of one persisted block.
#[derive(Debug, Clone)]
pub struct EventsJob {
    pub block_id: u64,
    pub events: Vec<NodeEvent>,
}

/// Validator-set snapshot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorRefresh {
    pub height: u64,
    /// Also rewrite the stake table.
    pub with_stakes: bool,
}
