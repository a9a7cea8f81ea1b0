//! Best-effort publication of processed entities.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::ExtenderError;

/// Channel carrying newly persisted blocks.
pub const BLOCKS_CHANNEL: &str = "blocks";
/// Channel carrying node status samples.
pub const STATUS_CHANNEL: &str = "status";

/// A publish/subscribe sink keyed by channel name.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, channel: &str, data: &Value) -> Result<(), ExtenderError>;
}

/// Broadcaster that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn publish(&self, _channel: &str, _data: &Value) -> Result<(), ExtenderError> {
        Ok(())
    }
}

/// Fire-and-forget wrapper: publishes on a spawned task, logs failures.
#[derive(Clone)]
pub struct BroadcastService {
    inner: Arc<dyn Broadcaster>,
}

impl BroadcastService {
    pub fn new(inner: Arc<dyn Broadcaster>) -> Self {
        Self { inner }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopBroadcaster))
    }

    /// Publish without waiting. Failures never reach the caller.
    pub fn publish(&self, channel: impl Into<String>, data: Value) {
        let inner = Arc::clone(&self.inner);
        let channel = channel.into();
        tokio::spawn(async move {
            if let Err(e) = inner.publish(&channel, &data).await {
                warn!(channel = %channel, error = %e, "broadcast failed");
            }
        });
    }
}
