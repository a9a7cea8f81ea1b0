//! chainextender-pipeline — the ingestion loop and its worker streams.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainextender_pipeline::{supervise, ExtenderBuilder};
//! # async fn example(
//! #     node: Arc<dyn chainextender_core::NodeClient>,
//! #     store: Arc<dyn chainextender_core::Store>,
//! # ) -> Result<(), chainextender_core::ExtenderError> {
//! let extender = ExtenderBuilder::new()
//!     .node(node)
//!     .store(store)
//!     .chasing_threshold(2)
//!     .build()
//!     .await?;
//! supervise(extender).await
//! # }
//! ```

pub mod builder;
pub mod extender;
pub mod jobs;
pub mod pools;
pub mod streams;
pub mod supervisor;
pub mod workers;

pub use builder::ExtenderBuilder;
pub use extender::{Extender, Shared};
pub use streams::{Queues, Streams};
pub use supervisor::{supervise, supervise_until};
