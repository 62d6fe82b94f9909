//! In-memory queue resource.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::debug;

use super::stream::{StreamResource, Subscriber};
use super::value::Value;
use crate::errors::Result;
use crate::sync::lock;

/// An unbounded FIFO queue with subscribers.
///
/// Every enqueued or published value is also delivered to each subscriber,
/// in subscription order, outside the queue lock.
#[derive(Default)]
pub struct QueueResource {
    items: Mutex<VecDeque<Value>>,
    available: Condvar,
    subscribers: Mutex<IndexMap<String, Subscriber>>,
    next_id: AtomicU64,
}

impl QueueResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// Current contents, front first.
    pub fn snapshot(&self) -> Vec<Value> {
        lock(&self.items).iter().cloned().collect()
    }

    pub fn push(&self, value: Value) -> Result<()> {
        lock(&self.items).push_back(value.clone());
        self.available.notify_all();
        self.fan_out(&value)
    }

    pub fn peek(&self) -> Option<Value> {
        lock(&self.items).front().cloned()
    }

    pub fn poll(&self) -> Option<Value> {
        lock(&self.items).pop_front()
    }

    /// Wait until an item is available (or `timeout` expires), then take
    /// it if `mutating`, else copy it.
    pub fn wait(&self, timeout: Option<Duration>, mutating: bool) -> Option<Value> {
        let items = lock(&self.items);
        let mut items = match timeout {
            Some(timeout) => {
                self.available
                    .wait_timeout_while(items, timeout, |items| items.is_empty())
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0
            }
            None => self
                .available
                .wait_while(items, |items| items.is_empty())
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
        if mutating {
            items.pop_front()
        } else {
            items.front().cloned()
        }
    }

    pub fn drain_all(&self) -> Vec<Value> {
        lock(&self.items).drain(..).collect()
    }

    fn fan_out(&self, value: &Value) -> Result<()> {
        let subscribers: Vec<Subscriber> = lock(&self.subscribers).values().cloned().collect();
        let mut first_error = None;
        for subscriber in subscribers {
            if let Err(err) = subscriber(value) {
                debug!("queue subscriber failed: {}", err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl StreamResource for QueueResource {
    fn read(&self, blocking: bool, mutating: bool) -> Result<Value> {
        let value = match (blocking, mutating) {
            (false, false) => self.peek(),
            (false, true) => self.poll(),
            (true, _) => self.wait(None, mutating),
        };
        Ok(value.unwrap_or_else(Value::void))
    }

    fn read_timeout(&self, timeout: Duration, mutating: bool) -> Result<Value> {
        Ok(self.wait(Some(timeout), mutating).unwrap_or_else(Value::void))
    }

    fn write(&self, value: Value, _blocking: bool, mutating: bool) -> Result<Value> {
        if mutating {
            self.push(value.clone())?;
        } else {
            self.fan_out(&value)?;
        }
        Ok(value)
    }

    fn subscribe(&self, subscriber: Subscriber) -> Result<String> {
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).insert(id.clone(), subscriber);
        Ok(id)
    }

    fn unsubscribe(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.subscribers).shift_remove(id).is_some())
    }

    fn drain(&self) -> Result<Vec<Value>> {
        Ok(self.drain_all())
    }

    fn all(&self) -> Result<Vec<Value>> {
        Ok(self.snapshot())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.len())
    }
}
