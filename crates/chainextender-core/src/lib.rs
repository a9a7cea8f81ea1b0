//! chainextender-core — foundation for the continuous chain extender.
//!
//! # Architecture
//!
//! ```text
//! ExtenderBuilder → Extender (ingestion loop, one height at a time)
//!                      ├── ModeTracker     (chasing / live)
//!                      ├── CoinRegistry    (in-process coin id sequencing)
//!                      ├── Resolvers       (address / coin / validator ids)
//!                      ├── TaskQueue<T>    (bounded worker pools per stream)
//!                      ├── NodeClient      (HTTP node API)
//!                      ├── Store           (memory / Postgres)
//!                      └── Broadcaster     (publish/subscribe fan-out)
//! ```

pub mod broadcast;
pub mod chunk;
pub mod coins;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod mode;
pub mod model;
pub mod node;
pub mod queue;
pub mod retry;
pub mod store;
pub mod tx;
pub mod types;

pub use broadcast::{BroadcastService, Broadcaster, NoopBroadcaster};
pub use chunk::chunk;
pub use coins::{CoinBatch, CoinRegistry};
pub use config::{ExtenderConfig, StreamConfig, StreamsConfig};
pub use error::{EntityKind, ErrorClass, ExtenderError};
pub use event::{NodeEvent, RewardRole};
pub use identity::{IdentityResolver, Resolvers};
pub use mode::{ModeTracker, SyncMode};
pub use node::NodeClient;
pub use queue::{FaultReporter, PoolContext, TaskQueue, Worker, WorkerPool};
pub use retry::{RetryConfig, RetryPolicy};
pub use store::Store;
pub use tx::{TxData, TxType};
pub use types::{NodeBlock, NodeStatus, NodeTransaction};
