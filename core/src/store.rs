//! Key/value storage behind `load`, `save`, `push` and `pop`.
//!
//! The runtime talks to a [`Store`] only through this trait. A persistent
//! or networked backend plugs in through
//! [`ServicesBuilder::store`](crate::api::ServicesBuilder::store);
//! [`MemoryStore`] is the default.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tracing::trace;

use crate::errors::{Error, Result};
use crate::sync::lock;
use crate::types::Type;
use crate::values::{Data, Value};

/// A thread-safe key/value store.
///
/// Missing or expired keys read as void. `push` and `pop` treat a key as a
/// FIFO list.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Value>;

    /// Store `value`, replacing what was there. With a `ttl`, the key
    /// reads as missing once it elapses.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Append to the list at `key`, creating it if needed.
    fn push(&self, key: &str, value: Value) -> Result<()>;

    /// Take the first element of the list at `key`, waiting up to
    /// `timeout` for one to arrive. Void if none did.
    fn pop(&self, key: &str, timeout: Duration) -> Result<Value>;

    /// Forget `key`. Returns whether it was present.
    fn remove(&self, key: &str) -> Result<bool>;
}

enum Slot {
    Single(Value),
    List(VecDeque<Value>),
}

struct Record {
    slot: Slot,
    expires: Option<Instant>,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

/// Process-local [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    pushed: Condvar,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock(&self.records)
            .values()
            .filter(|record| record.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(records: &mut HashMap<String, Record>, key: &str) {
        let now = Instant::now();
        if records.get(key).is_some_and(|record| !record.is_live(now)) {
            records.remove(key);
        }
    }

    fn take_front(records: &mut HashMap<String, Record>, key: &str) -> Result<Option<Value>> {
        Self::evict(records, key);
        match records.get_mut(key) {
            None => Ok(None),
            Some(Record {
                slot: Slot::List(items),
                ..
            }) => Ok(items.pop_front()),
            Some(Record {
                slot: Slot::Single(value),
                ..
            }) => Err(Error::invalid_operation("pop", value.ty())),
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Value> {
        let mut records = lock(&self.records);
        Self::evict(&mut records, key);
        let value = match records.get(key) {
            Some(Record {
                slot: Slot::Single(value),
                ..
            }) => value.clone(),
            Some(Record {
                slot: Slot::List(items),
                ..
            }) => Value::list(items.iter().cloned().collect()),
            None => Value::void(),
        };
        trace!(key, found = !value.is_void(), "store get");
        Ok(value)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        if value.is_lambda() {
            return Err(Error::invalid_operation("save", Type::Block));
        }
        let slot = match value.data() {
            Data::List(items) => Slot::List(items.iter().cloned().collect()),
            _ => Slot::Single(value.clone()),
        };
        let record = Record {
            slot,
            expires: ttl.map(|ttl| Instant::now() + ttl),
        };
        lock(&self.records).insert(key.to_string(), record);
        self.pushed.notify_all();
        trace!(key, ?ttl, "store set");
        Ok(())
    }

    fn push(&self, key: &str, value: Value) -> Result<()> {
        {
            let mut records = lock(&self.records);
            Self::evict(&mut records, key);
            let record = records.entry(key.to_string()).or_insert_with(|| Record {
                slot: Slot::List(VecDeque::new()),
                expires: None,
            });
            match &mut record.slot {
                Slot::List(items) => items.push_back(value),
                Slot::Single(existing) => {
                    return Err(Error::invalid_operation("push", existing.ty()));
                }
            }
        }
        self.pushed.notify_all();
        Ok(())
    }

    fn pop(&self, key: &str, timeout: Duration) -> Result<Value> {
        let deadline = Instant::now() + timeout;
        let mut records = lock(&self.records);
        loop {
            if let Some(value) = Self::take_front(&mut records, key)? {
                return Ok(value);
            }
            let now = Instant::now();
            if now >= deadline {
                trace!(key, "store pop timed out");
                return Ok(Value::void());
            }
            records = self
                .pushed
                .wait_timeout(records, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(lock(&self.records)
            .remove(key)
            .is_some_and(|record| record.is_live(now)))
    }
}
