use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use chainextender_core::error::ExtenderError;
use chainextender_core::identity::Resolvers;
use chainextender_core::queue::Worker;

/// Creates address rows for a chunk of addresses the cache has not seen.
pub struct AddressWorker {
    resolvers: Arc<Resolvers>,
}

impl AddressWorker {
    pub fn new(resolvers: Arc<Resolvers>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl Worker<Vec<String>> for AddressWorker {
    async fn handle(&self, job: &Vec<String>) -> Result<(), ExtenderError> {
        let ids = self.resolvers.addresses.resolve_many_or_create(job).await?;
        debug!(stream = "addresses", chunk = job.len(), resolved = ids.len(), "addresses resolved");
        Ok(())
    }
}
