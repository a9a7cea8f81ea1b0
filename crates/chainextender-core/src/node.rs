//! The node collaborator: read-only, polled once per height.

use async_trait::async_trait;

use crate::error::ExtenderError;
use crate::types::{AddressBalances, BlockEvents, Candidate, CoinInfo, NodeBlock, NodeStatus};

/// Read-only access to a blockchain node.
///
/// Implementations decode the node's wire format into the typed structures
/// of [`crate::types`]; undecodable items inside a block are dropped (and
/// logged) by the implementation rather than failing the whole call.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Latest height and block time.
    async fn status(&self) -> Result<NodeStatus, ExtenderError>;

    /// Block at `height`, or `None` if the node has not finalized it yet.
    async fn block(&self, height: u64) -> Result<Option<NodeBlock>, ExtenderError>;

    /// Events emitted at `height`.
    async fn events(&self, height: u64) -> Result<BlockEvents, ExtenderError>;

    /// Candidate list at `height`, optionally with each candidate's stakes.
    async fn candidates(
        &self,
        height: u64,
        include_stakes: bool,
    ) -> Result<Vec<Candidate>, ExtenderError>;

    /// Current state of a coin by id.
    async fn coin_info_by_id(&self, id: u64) -> Result<CoinInfo, ExtenderError>;

    /// Current state of a coin by ticker.
    async fn coin_info_by_symbol(&self, symbol: &str) -> Result<CoinInfo, ExtenderError>;

    /// Full balance snapshot for each address in `addresses`.
    async fn balances(&self, addresses: &[String]) -> Result<Vec<AddressBalances>, ExtenderError>;
}
