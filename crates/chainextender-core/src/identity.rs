//! Identity resolution: external natural keys to internal numeric ids.
//!
//! One [`IdentityResolver`] exists per entity kind (address, coin ticker,
//! validator public key). Each is a write-through memoization layer over a
//! store lookup: a cache hit never touches the store, a miss queries it, and
//! for kinds the store numbers itself a genuine miss creates the row with a
//! conflict-safe insert.
//!
//! The cache is sharded and guarded by `parking_lot::RwLock`s that are only
//! held for the in-memory map operation, never across a store round trip, so
//! a slow lookup for one key does not block unrelated keys.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{EntityKind, ExtenderError};
use crate::model::split_ticker;
use crate::store::Store;

const SHARDS: usize = 16;

// ─── Key normalization ───────────────────────────────────────────────────────

/// Normalize an `Mx…` address to 40 lowercase hex chars.
pub fn normalize_address(address: &str) -> Result<String, ExtenderError> {
    normalize_hex(address, "Mx", 40, EntityKind::Address)
}

/// Normalize an `Mp…` public key to 64 lowercase hex chars.
pub fn normalize_public_key(key: &str) -> Result<String, ExtenderError> {
    normalize_hex(key, "Mp", 64, EntityKind::Validator)
}

/// Render a normalized address in its external `Mx…` form.
pub fn display_address(normalized: &str) -> String {
    format!("Mx{normalized}")
}

/// Render a normalized public key in its external `Mp…` form.
pub fn display_public_key(normalized: &str) -> String {
    format!("Mp{normalized}")
}

fn normalize_hex(
    value: &str,
    prefix: &str,
    len: usize,
    kind: EntityKind,
) -> Result<String, ExtenderError> {
    let body = value
        .strip_prefix(prefix)
        .or_else(|| value.strip_prefix(&prefix.to_ascii_lowercase()))
        .unwrap_or(value);
    if body.len() != len || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ExtenderError::decode(format!("malformed {kind} '{value}'")));
    }
    Ok(body.to_ascii_lowercase())
}

// ─── IdentityCache ───────────────────────────────────────────────────────────

/// Sharded key → id map.
///
/// With a capacity, a shard that fills up is cleared wholesale before the
/// next insert (a generation wipe); evicted keys are re-read from the store
/// on their next lookup.
pub struct IdentityCache {
    shards: Vec<RwLock<HashMap<String, u64>>>,
    shard_capacity: Option<usize>,
}

impl IdentityCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            shard_capacity: capacity.map(|c| (c / SHARDS).max(1)),
        }
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, u64>> {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        &self.shards[(h.finish() as usize) % SHARDS]
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.shard(key).read().get(key).copied()
    }

    pub fn insert(&self, key: String, id: u64) {
        let mut shard = self.shard(&key).write();
        if let Some(cap) = self.shard_capacity {
            if shard.len() >= cap && !shard.contains_key(&key) {
                debug!(evicted = shard.len(), "identity cache shard full, clearing");
                shard.clear();
            }
        }
        shard.insert(key, id);
    }

    pub fn remove(&self, key: &str) -> Option<u64> {
        self.shard(key).write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Backends ────────────────────────────────────────────────────────────────

/// Store access for one entity kind.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Canonical form of an external key.
    fn normalize(&self, key: &str) -> Result<String, ExtenderError>;

    /// Look up ids of existing rows for the (normalized) keys.
    async fn find(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError>;

    /// Insert rows for `keys`, ignoring conflicts; returns ids of the rows
    /// actually inserted. Kinds whose ids are not store-generated refuse.
    async fn create(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        let _ = keys;
        Err(ExtenderError::Config(format!(
            "{} ids are not created by the resolver",
            self.kind()
        )))
    }
}

/// Addresses: store-generated ids, created on demand.
pub struct AddressBackend {
    store: Arc<dyn Store>,
}

#[async_trait]
impl IdentityBackend for AddressBackend {
    fn kind(&self) -> EntityKind {
        EntityKind::Address
    }

    fn normalize(&self, key: &str) -> Result<String, ExtenderError> {
        normalize_address(key)
    }

    async fn find(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        self.store.find_address_ids(keys).await
    }

    async fn create(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        self.store.insert_addresses(keys).await
    }
}

/// Validators: store-generated ids keyed by public key.
pub struct ValidatorBackend {
    store: Arc<dyn Store>,
}

#[async_trait]
impl IdentityBackend for ValidatorBackend {
    fn kind(&self) -> EntityKind {
        EntityKind::Validator
    }

    fn normalize(&self, key: &str) -> Result<String, ExtenderError> {
        normalize_public_key(key)
    }

    async fn find(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        self.store.find_validator_ids(keys).await
    }

    async fn create(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        self.store.insert_validators(keys).await
    }
}

/// Coins by ticker. Ids come from the coin registry, so this backend only
/// looks up.
pub struct CoinBackend {
    store: Arc<dyn Store>,
}

#[async_trait]
impl IdentityBackend for CoinBackend {
    fn kind(&self) -> EntityKind {
        EntityKind::Coin
    }

    fn normalize(&self, key: &str) -> Result<String, ExtenderError> {
        let (symbol, version) = split_ticker(key.trim());
        if symbol.is_empty() {
            return Err(ExtenderError::decode("empty coin symbol"));
        }
        Ok(crate::model::ticker(&symbol.to_ascii_uppercase(), version))
    }

    async fn find(&self, keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        self.store.find_coin_ids(keys).await
    }
}

// ─── IdentityResolver ────────────────────────────────────────────────────────

/// Find-or-create resolver with a process-lifetime cache.
pub struct IdentityResolver {
    backend: Box<dyn IdentityBackend>,
    cache: IdentityCache,
}

impl IdentityResolver {
    pub fn new(backend: Box<dyn IdentityBackend>, cache_capacity: Option<usize>) -> Self {
        Self {
            backend,
            cache: IdentityCache::new(cache_capacity),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.backend.kind()
    }

    /// Id of an entity that must already exist.
    pub async fn resolve(&self, key: &str) -> Result<u64, ExtenderError> {
        let norm = self.backend.normalize(key)?;
        if let Some(id) = self.cache.get(&norm) {
            return Ok(id);
        }
        let found = self.backend.find(std::slice::from_ref(&norm)).await?;
        match found.get(&norm) {
            Some(&id) => {
                self.cache.insert(norm, id);
                Ok(id)
            }
            None => Err(ExtenderError::not_found(self.kind(), key)),
        }
    }

    /// Id of an entity, creating it if the store has never seen it.
    pub async fn resolve_or_create(&self, key: &str) -> Result<u64, ExtenderError> {
        let map = self.resolve_many_or_create(std::slice::from_ref(&key)).await?;
        map.get(key)
            .copied()
            .ok_or_else(|| ExtenderError::not_found(self.kind(), key))
    }

    /// Ids of entities that must all exist; one store round trip for all
    /// cache misses.
    pub async fn resolve_many<K: AsRef<str> + Sync>(
        &self,
        keys: &[K],
    ) -> Result<HashMap<String, u64>, ExtenderError> {
        let (mut out, misses) = self.split_cached(keys);
        if misses.is_empty() {
            return Ok(out);
        }
        let norms: Vec<String> = misses.keys().cloned().collect();
        let found = self.backend.find(&norms).await?;
        for (norm, raws) in misses {
            let id = *found
                .get(&norm)
                .ok_or_else(|| ExtenderError::not_found(self.kind(), raws[0].clone()))?;
            self.cache.insert(norm, id);
            for raw in raws {
                out.insert(raw, id);
            }
        }
        Ok(out)
    }

    /// Ids of entities, creating the missing ones.
    ///
    /// At most one existence check and one bulk insert regardless of how
    /// many keys miss the cache; a second lookup is only issued for rows a
    /// concurrent creator inserted first. Malformed keys are logged and left
    /// out of the result.
    pub async fn resolve_many_or_create<K: AsRef<str> + Sync>(
        &self,
        keys: &[K],
    ) -> Result<HashMap<String, u64>, ExtenderError> {
        let (mut out, misses) = self.split_cached(keys);
        if misses.is_empty() {
            return Ok(out);
        }

        let norms: Vec<String> = misses.keys().cloned().collect();
        let mut found = self.backend.find(&norms).await?;

        let residual: Vec<String> = norms
            .iter()
            .filter(|n| !found.contains_key(*n))
            .cloned()
            .collect();
        if !residual.is_empty() {
            let created = self.backend.create(&residual).await?;
            let raced: Vec<String> = residual
                .iter()
                .filter(|n| !created.contains_key(*n))
                .cloned()
                .collect();
            found.extend(created);
            if !raced.is_empty() {
                debug!(kind = %self.kind(), count = raced.len(), "re-reading rows created concurrently");
                found.extend(self.backend.find(&raced).await?);
            }
        }

        for (norm, raws) in misses {
            let id = *found
                .get(&norm)
                .ok_or_else(|| ExtenderError::not_found(self.kind(), raws[0].clone()))?;
            self.cache.insert(norm, id);
            for raw in raws {
                out.insert(raw, id);
            }
        }
        Ok(out)
    }

    /// Keys (as given) that are not in the cache; malformed keys are dropped.
    pub fn uncached<K: AsRef<str>>(&self, keys: &[K]) -> Vec<String> {
        let mut seen = HashSet::new();
        keys.iter()
            .filter_map(|k| {
                let norm = self.backend.normalize(k.as_ref()).ok()?;
                (self.cache.get(&norm).is_none() && seen.insert(norm)).then(|| k.as_ref().to_string())
            })
            .collect()
    }

    /// Cached id for a key, without touching the store.
    pub fn cached(&self, key: &str) -> Option<u64> {
        let norm = self.backend.normalize(key).ok()?;
        self.cache.get(&norm)
    }

    /// Record a mapping created outside the resolver.
    pub fn remember(&self, key: &str, id: u64) -> Result<(), ExtenderError> {
        let norm = self.backend.normalize(key)?;
        self.cache.insert(norm, id);
        Ok(())
    }

    /// Drop a mapping that is no longer valid.
    pub fn forget(&self, key: &str) {
        if let Ok(norm) = self.backend.normalize(key) {
            self.cache.remove(&norm);
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Partition keys into cache hits (keyed by the caller's key) and misses
    /// (normalized key → every caller spelling of it).
    fn split_cached<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> (HashMap<String, u64>, HashMap<String, Vec<String>>) {
        let mut hits = HashMap::new();
        let mut misses: HashMap<String, Vec<String>> = HashMap::new();
        for key in keys {
            let raw = key.as_ref();
            let norm = match self.backend.normalize(raw) {
                Ok(n) => n,
                Err(e) => {
                    warn!(kind = %self.kind(), key = raw, error = %e, "skipping malformed key");
                    continue;
                }
            };
            match self.cache.get(&norm) {
                Some(id) => {
                    hits.insert(raw.to_string(), id);
                }
                None => misses.entry(norm).or_default().push(raw.to_string()),
            }
        }
        (hits, misses)
    }
}

// ─── Resolvers ───────────────────────────────────────────────────────────────

/// The three resolvers the pipeline shares between the loop and its workers.
pub struct Resolvers {
    pub addresses: IdentityResolver,
    pub coins: IdentityResolver,
    pub validators: IdentityResolver,
}

impl Resolvers {
    pub fn new(store: Arc<dyn Store>, cache_capacity: Option<usize>) -> Self {
        Self {
            addresses: IdentityResolver::new(
                Box::new(AddressBackend {
                    store: Arc::clone(&store),
                }),
                cache_capacity,
            ),
            coins: IdentityResolver::new(
                Box::new(CoinBackend {
                    store: Arc::clone(&store),
                }),
                cache_capacity,
            ),
            validators: IdentityResolver::new(Box::new(ValidatorBackend { store }), cache_capacity),
        }
    }
}
