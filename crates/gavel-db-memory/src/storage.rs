use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use gavel_storage::{KvStore, SetCondition, SetOptions, SetOutcome, StoreError};
use globset::Glob;
use tokio::time::Instant;

/// TTL applied to writes that carry neither an explicit TTL nor `keep_ttl`.
pub const DEFAULT_TTL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
enum Value {
    Bytes(Bytes),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn bytes(&self, key: &str) -> Result<&Bytes, StoreError> {
        match &self.value {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Set(_) => Err(StoreError::wrong_type(key, "string")),
        }
    }
}

/// In-process key-value store with Redis-like semantics.
///
/// Mutations of a single key go through the `DashMap` entry API, which holds
/// the shard lock for the duration of the check-and-write. That makes
/// conditional writes (`NX`/`XX`) and the token-checked primitives atomic,
/// the property the lock strategies depend on.
///
/// Expired keys are evicted lazily on access.
#[derive(Debug)]
pub struct MemoryStore {
    data: DashMap<String, Slot>,
    default_ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store using [`DEFAULT_TTL`] for plain writes.
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            default_ttl,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|slot| slot.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`, `None` if missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.data
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn evict_expired(&self, key: &str, now: Instant) {
        self.data.remove_if(key, |_, slot| !slot.is_live(now));
    }

    fn deadline(&self, now: Instant, ttl: Option<Duration>) -> Option<Instant> {
        Some(now + ttl.unwrap_or(self.default_ttl))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_buffer(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        self.evict_expired(key, now);
        match self.data.get(key) {
            Some(slot) => Ok(Some(slot.bytes(key)?.clone())),
            None => Ok(None),
        }
    }

    async fn set_buffer(
        &self,
        key: &str,
        value: Bytes,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError> {
        let now = Instant::now();
        self.evict_expired(key, now);

        match self.data.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let previous = if options.return_old {
                    Some(occupied.get().bytes(key)?.clone())
                } else {
                    None
                };
                if options.condition == SetCondition::IfNotExists {
                    return Ok(SetOutcome {
                        applied: false,
                        previous,
                    });
                }
                let expires_at = if options.keep_ttl {
                    occupied.get().expires_at
                } else {
                    self.deadline(now, options.ttl)
                };
                occupied.insert(Slot {
                    value: Value::Bytes(value),
                    expires_at,
                });
                Ok(SetOutcome {
                    applied: true,
                    previous,
                })
            }
            Entry::Vacant(vacant) => {
                if options.condition == SetCondition::IfExists {
                    return Ok(SetOutcome::skipped());
                }
                let expires_at = if options.keep_ttl {
                    None
                } else {
                    self.deadline(now, options.ttl)
                };
                vacant.insert(Slot {
                    value: Value::Bytes(value),
                    expires_at,
                });
                Ok(SetOutcome::applied())
            }
        }
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        Ok(match self.data.remove(key) {
            Some((_, slot)) if slot.is_live(now) => 1,
            _ => 0,
        })
    }

    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }
        let now = Instant::now();
        self.evict_expired(key, now);

        let mut slot = self.data.entry(key.to_owned()).or_insert_with(|| Slot {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        let Value::Set(set) = &mut slot.value else {
            return Err(StoreError::wrong_type(key, "set"));
        };

        let added = members
            .iter()
            .filter(|member| set.insert((*member).clone()))
            .count() as u64;
        if added > 0 {
            slot.expires_at = self.deadline(now, ttl);
        }
        Ok(added)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        self.evict_expired(key, now);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                Value::Bytes(_) => Err(StoreError::wrong_type(key, "set")),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn incr_by_float(
        &self,
        key: &str,
        amount: f64,
        ttl: Option<Duration>,
    ) -> Result<f64, StoreError> {
        let now = Instant::now();
        self.evict_expired(key, now);

        match self.data.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let raw = occupied.get().bytes(key)?;
                let current: f64 = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|text| text.parse().ok())
                    .ok_or_else(|| StoreError::command("value is not a valid float"))?;
                let next = current + amount;
                occupied.get_mut().value = Value::Bytes(Bytes::from(next.to_string()));
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    value: Value::Bytes(Bytes::from(amount.to_string())),
                    expires_at: self.deadline(now, ttl),
                });
                Ok(amount)
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = Glob::new(pattern)
            .map_err(|e| StoreError::command(format!("invalid key pattern '{pattern}': {e}")))?
            .compile_matcher();
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|slot| slot.is_live(now) && matcher.is_match(slot.key()))
            .map(|slot| slot.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = self.data.remove_if(key, |_, slot| {
            slot.is_live(now)
                && matches!(&slot.value, Value::Bytes(bytes) if bytes.as_ref() == expected)
        });
        Ok(removed.is_some())
    }

    async fn pexpire_if_eq(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.data.get_mut(key) {
            Some(mut slot)
                if slot.is_live(now)
                    && matches!(&slot.value, Value::Bytes(bytes) if bytes.as_ref() == expected) =>
            {
                slot.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let dropped = self.data.len();
        self.data.clear();
        tracing::debug!(dropped, "memory store flushed");
        Ok(())
    }
}
