//! chainextender-node — HTTP collaborators of the extender.
//!
//! - [`client::HttpNodeClient`] — [`NodeClient`](chainextender_core::NodeClient)
//!   over the node's v2 HTTP API
//! - [`broadcast::CentrifugoBroadcaster`] — publishes to a Centrifugo-compatible
//!   HTTP API
//!
//! Wire structs live in [`wire`]; they are decoded once into the typed
//! structures of `chainextender_core::types`.

pub mod broadcast;
pub mod client;
pub mod error;
pub mod wire;

pub use broadcast::CentrifugoBroadcaster;
pub use client::{HttpNodeClient, NodeClientConfig};
pub use error::NodeError;
