//! Worker implementations, one per stream.
//!
//! Every worker is idempotent: a retried chunk rewrites the same rows.

pub mod addresses;
pub mod balances;
pub mod coins;
pub mod events;
pub mod rows;
pub mod transactions;
pub mod validators;

use std::collections::HashMap;

use tracing::warn;

use chainextender_core::error::ExtenderError;
use chainextender_core::identity::IdentityResolver;

pub use addresses::AddressWorker;
pub use balances::BalanceWorker;
pub use coins::CoinInfoWorker;
pub use events::EventWorker;
pub use rows::{BlockValidatorWriter, RewardWriter, SlashWriter, TxValidatorWriter};
pub use transactions::{InvalidTxWorker, OutputWorker, TransactionWorker};
pub use validators::ValidatorWorker;

/// Resolve keys that should already exist.
///
/// With `strict` set a missing key fails the whole call. Otherwise missing
/// keys are logged and left out of the map, so callers skip only the rows
/// that reference them.
pub(crate) async fn resolve_known<K: AsRef<str> + Sync>(
    resolver: &IdentityResolver,
    keys: &[K],
    strict: bool,
) -> Result<HashMap<String, u64>, ExtenderError> {
    match resolver.resolve_many(keys).await {
        Ok(ids) => Ok(ids),
        Err(ExtenderError::NotFound { .. }) if !strict => {
            let mut ids = HashMap::with_capacity(keys.len());
            for key in keys {
                let key = key.as_ref();
                if ids.contains_key(key) {
                    continue;
                }
                match resolver.resolve(key).await {
                    Ok(id) => {
                        ids.insert(key.to_string(), id);
                    }
                    Err(ExtenderError::NotFound { .. }) => {
                        warn!(kind = %resolver.kind(), key, "unresolved reference, row skipped");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(ids)
        }
        Err(e) => Err(e),
    }
}
