//! Forcing values to a bounded depth, and value-level listeners.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::errors::Result;
use crate::values::{Data, Value};

const DEFAULT_PARALLEL_THRESHOLD: usize = 2;

static NEXT_STATIC_LISTENER: AtomicU64 = AtomicU64::new(1);

fn fix_items(items: &[Value], depth: usize, parallel: bool) -> Result<Vec<Value>> {
    let threshold = items
        .iter()
        .find_map(Value::runtime)
        .map_or(DEFAULT_PARALLEL_THRESHOLD, |runtime| {
            runtime.config().parallel_threshold()
        });
    if parallel && items.len() >= threshold {
        items
            .par_iter()
            .map(|item| item.fix_depth(depth, parallel))
            .collect()
    } else {
        items
            .iter()
            .map(|item| item.fix_depth(depth, parallel))
            .collect()
    }
}

impl Value {
    /// Force one layer: a lambda becomes its value, a collection is
    /// returned as it is even if it holds lambdas.
    pub fn fix(&self, parallel: bool) -> Result<Value> {
        self.fix_depth(1, parallel)
    }

    /// Force through every nested collection.
    pub fn fix_deep(&self, parallel: bool) -> Result<Value> {
        self.fix_depth(usize::MAX, parallel)
    }

    /// Force `depth` layers. `1` forces only this value, `2` also forces
    /// the elements of a collection, and so on.
    ///
    /// With `parallel`, the elements of a large enough collection are
    /// forced on the rayon pool. The result is the same either way.
    pub fn fix_depth(&self, depth: usize, parallel: bool) -> Result<Value> {
        if depth == 0 {
            return Ok(self.clone());
        }
        let value = match self.as_lambda() {
            Some(lambda) if !lambda.is_fixable() => return Ok(self.clone()),
            Some(_) => self.forced()?,
            None => self.clone(),
        };
        if depth == 1 {
            return Ok(value);
        }

        let depth = depth - 1;
        Ok(match value.data() {
            Data::List(items) => value.with_data(Data::List(fix_items(items, depth, parallel)?)),
            Data::Sequence(items) => {
                value.with_data(Data::Sequence(fix_items(items, depth, parallel)?))
            }
            Data::Map(entries) => {
                let values: Vec<Value> = entries.values().cloned().collect();
                let fixed = fix_items(&values, depth, parallel)?;
                value.with_data(Data::Map(entries.keys().cloned().zip(fixed).collect()))
            }
            Data::Range(from, to) => value.with_data(Data::Range(
                from.fix_depth(depth, parallel)?,
                to.fix_depth(depth, parallel)?,
            )),
            _ => value,
        })
    }

    /// Call `callback` with the new value every time this value is
    /// notified. Returns an id for [`unlisten`](Self::unlisten).
    ///
    /// Concrete values never change; they accept the registration and
    /// never call back.
    pub fn listen(
        &self,
        callback: impl Fn(&Value) -> Result<()> + Send + Sync + 'static,
    ) -> String {
        match self.as_lambda() {
            Some(lambda) => lambda.listen(Arc::new(callback)),
            None => format!(
                "static-{}",
                NEXT_STATIC_LISTENER.fetch_add(1, Ordering::Relaxed)
            ),
        }
    }

    pub fn unlisten(&self, id: &str) -> bool {
        self.as_lambda().is_some_and(|lambda| lambda.unlisten(id))
    }

    /// Invalidate and propagate to listeners. Returns this value.
    pub fn notify(&self) -> Result<Value> {
        if let Some(lambda) = self.as_lambda() {
            lambda.notify()?;
        }
        Ok(self.clone())
    }
}
