//! Collection operations and aggregates.
//!
//! Scalars behave as one-element lists: `size` is 1, `get(0)` is the value
//! itself, and aggregates over a scalar see just that value. Void behaves as
//! an empty collection.

use core::cmp::Ordering;

use indexmap::IndexMap;

use super::value::{Data, Value};
use crate::errors::{Error, ErrorKind, Result};
use crate::types::Type;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Largest range that will be expanded into a list.
const MAX_RANGE_LEN: u64 = 10_000_000;

fn index_of(key: &Value) -> Result<Option<usize>> {
    Ok(usize::try_from(key.to_integer()?).ok())
}

fn range_len(from: &Value, to: &Value) -> Result<u64> {
    let (from, to) = (from.forced()?, to.forced()?);
    match (from.data(), to.data()) {
        (Data::Integer(a), Data::Integer(b)) => Ok(a.abs_diff(*b).saturating_add(1)),
        (Data::Date(a), Data::Date(b)) => Ok(a.abs_diff(*b) / MILLIS_PER_DAY as u64 + 1),
        (Data::String(a), Data::String(b)) => match (single_char(a), single_char(b)) {
            (Some(a), Some(b)) => Ok((a as u64).abs_diff(b as u64) + 1),
            _ => Err(Error::invalid_operands("range", Type::String, Type::String)),
        },
        (a, b) => Err(Error::invalid_operands("range", a.ty(), b.ty())),
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn range_items(from: &Value, to: &Value) -> Result<Vec<Value>> {
    let len = range_len(from, to)?;
    if len > MAX_RANGE_LEN {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("Range of {} elements is too large to expand", len),
        ));
    }
    let (from, to) = (from.forced()?, to.forced()?);
    let (start, end, step) = match (from.data(), to.data()) {
        (Data::Integer(a), Data::Integer(b)) => (*a, *b, 1),
        (Data::Date(a), Data::Date(b)) => (*a, *b, MILLIS_PER_DAY),
        (Data::String(a), Data::String(b)) => match (single_char(a), single_char(b)) {
            (Some(a), Some(b)) => (a as i64, b as i64, 1),
            _ => return Err(Error::invalid_operands("range", Type::String, Type::String)),
        },
        (a, b) => return Err(Error::invalid_operands("range", a.ty(), b.ty())),
    };
    let make = |n: i64| match from.data() {
        Data::Date(_) => Value::date(n),
        Data::String(_) => u32::try_from(n)
            .ok()
            .and_then(char::from_u32)
            .map_or_else(Value::void, |c| Value::string(c.to_string())),
        _ => Value::integer(n),
    };
    let step = if start <= end { step } else { -step };
    Ok((0..len as i64).map(|i| make(start + i * step)).collect())
}

fn within(value: &Value, from: &Value, to: &Value) -> Result<bool> {
    let (low, high) = match from.compare(to)? {
        Ordering::Greater => (to, from),
        _ => (from, to),
    };
    Ok(value.compare(low)? != Ordering::Less && value.compare(high)? != Ordering::Greater)
}

fn sort_values(items: &mut [Value]) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| {
        a.compare(b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Rebuild a collection of the same kind from `items`.
fn same_kind(original: &Value, items: Vec<Value>) -> Value {
    match original.data() {
        Data::Sequence(_) => Value::sequence(items),
        _ => Value::list(items),
    }
}

impl Value {
    /// Number of elements. Scalars have size 1, void and null size 0.
    pub fn size(&self) -> Result<usize> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Void | Data::Null(_) | Data::Error(_) => 0,
            Data::String(s) => s.chars().count(),
            Data::List(items) | Data::Sequence(items) => items.len(),
            Data::Map(entries) => entries.len(),
            Data::Range(from, to) => usize::try_from(range_len(from, to)?).unwrap_or(usize::MAX),
            Data::Queue(queue) => queue.len(),
            Data::Uri(uri) => uri.resource()?.size()?,
            _ => 1,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.size().map_or(true, |n| n == 0)
    }

    /// Element at an index (lists, strings, ranges, queues) or key (maps).
    /// Missing elements read as void.
    pub fn get(&self, key: &Value) -> Result<Value> {
        let value = self.forced()?;
        let found = match value.data() {
            Data::Void | Data::Null(_) => None,
            Data::Map(entries) => entries.get(key.to_human_string().as_str()).cloned(),
            Data::List(items) | Data::Sequence(items) => {
                index_of(key)?.and_then(|i| items.get(i).cloned())
            }
            Data::String(s) => index_of(key)?
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::string(c.to_string())),
            Data::Range(..) | Data::Queue(_) => {
                let items = value.to_list()?;
                index_of(key)?.and_then(|i| items.get(i).cloned())
            }
            Data::Uri(_) => return Err(Error::invalid_operation("get", Type::Uri)),
            _ => (index_of(key)? == Some(0)).then(|| value.clone()),
        };
        Ok(found.unwrap_or_else(Value::void))
    }

    /// A copy with the element at `key` replaced. Setting one past the end
    /// of a list appends.
    pub fn set(&self, key: &Value, item: &Value) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::Map(entries) => {
                let mut entries = entries.clone();
                entries.insert(key.to_human_string(), item.clone());
                Ok(Value::map(entries))
            }
            Data::List(items) | Data::Sequence(items) => {
                let mut items = items.clone();
                match index_of(key)? {
                    Some(i) if i < items.len() => items[i] = item.clone(),
                    Some(i) if i == items.len() => items.push(item.clone()),
                    _ => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            format!(
                                "Index {} out of bounds (length: {})",
                                key.to_human_string(),
                                items.len()
                            ),
                        ));
                    }
                }
                Ok(same_kind(&value, items))
            }
            other => Err(Error::invalid_operation("set", other.ty())),
        }
    }

    pub fn append(&self, item: &Value) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::Void => Ok(Value::list(vec![item.clone()])),
            Data::List(items) | Data::Sequence(items) => {
                let mut items = items.clone();
                items.push(item.clone());
                Ok(same_kind(&value, items))
            }
            Data::Map(_) => match item.forced()?.data() {
                Data::Map(_) => value.plus(item),
                other => Err(Error::invalid_operands("append", Type::Map, other.ty())),
            },
            Data::String(s) => Ok(Value::string(format!("{}{}", s, item.to_human_string()))),
            Data::Queue(_) | Data::Uri(_) => Err(Error::invalid_operation("append", value.ty())),
            _ => Ok(Value::list(vec![value.clone(), item.clone()])),
        }
    }

    pub fn prepend(&self, item: &Value) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::Void => Ok(Value::list(vec![item.clone()])),
            Data::List(items) | Data::Sequence(items) => {
                let mut prepended = Vec::with_capacity(items.len() + 1);
                prepended.push(item.clone());
                prepended.extend(items.iter().cloned());
                Ok(same_kind(&value, prepended))
            }
            Data::String(s) => Ok(Value::string(format!("{}{}", item.to_human_string(), s))),
            Data::Map(_) | Data::Queue(_) | Data::Uri(_) => {
                Err(Error::invalid_operation("prepend", value.ty()))
            }
            _ => Ok(Value::list(vec![item.clone(), value.clone()])),
        }
    }

    /// Remove every element equal to `item` (lists), the key `item`
    /// (maps) or every occurrence of its text (strings).
    pub fn remove(&self, item: &Value) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::List(_) | Data::Sequence(_) | Data::String(_) | Data::Map(_) => value.minus(item),
            Data::Void => Ok(value.clone()),
            other => Err(Error::invalid_operation("remove", other.ty())),
        }
    }

    pub fn contains_value(&self, item: &Value) -> Result<bool> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Void | Data::Null(_) | Data::Error(_) => false,
            Data::List(items) | Data::Sequence(items) => items.iter().any(|v| v == item),
            Data::Map(entries) => entries.values().any(|v| v == item),
            Data::String(s) => s.contains(item.to_human_string().as_str()),
            Data::Range(from, to) => within(item, from, to)?,
            Data::Queue(queue) => queue.snapshot().iter().any(|v| v == item),
            _ => value == *item,
        })
    }

    pub fn contains_key(&self, key: &Value) -> Result<bool> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Map(entries) => entries.contains_key(key.to_human_string().as_str()),
            Data::List(items) | Data::Sequence(items) => {
                index_of(key)?.is_some_and(|i| i < items.len())
            }
            Data::String(s) => index_of(key)?.is_some_and(|i| i < s.chars().count()),
            _ => false,
        })
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.contains_key(&Value::string(key))
    }

    /// Map builder: a copy with `key` bound to `item`. Void starts a new map.
    pub fn with(&self, key: &str, item: Value) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::Void | Data::Null(_) => Ok(Value::map_from([(key, item)])),
            Data::Map(entries) => {
                let mut entries = entries.clone();
                entries.insert(key.to_string(), item);
                Ok(Value::map(entries))
            }
            other => Err(Error::invalid_operation("with", other.ty())),
        }
    }

    pub fn keys(&self) -> Result<Value> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Map(entries) => Value::list(entries.keys().map(Value::string).collect()),
            Data::List(items) | Data::Sequence(items) => {
                Value::list((0..items.len() as i64).map(Value::integer).collect())
            }
            _ => Value::list(Vec::new()),
        })
    }

    /// Elements as a vector. Ranges expand, maps become single-entry maps.
    pub fn to_list(&self) -> Result<Vec<Value>> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Void => Vec::new(),
            Data::List(items) | Data::Sequence(items) => items.clone(),
            Data::Range(from, to) => range_items(from, to)?,
            Data::Queue(queue) => queue.snapshot(),
            Data::Uri(uri) => uri.resource()?.all()?,
            Data::Map(entries) => entries
                .iter()
                .map(|(k, v)| Value::map_from([(k.clone(), v.clone())]))
                .collect(),
            _ => vec![value.clone()],
        })
    }

    pub fn to_map(&self) -> Result<IndexMap<String, Value>> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Void => IndexMap::new(),
            Data::Map(entries) => entries.clone(),
            Data::List(_) | Data::Sequence(_) | Data::Range(..) | Data::Queue(_) => value
                .to_list()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => IndexMap::from([("value".to_string(), value.clone())]),
        })
    }

    pub fn first(&self) -> Result<Value> {
        Ok(self.to_list()?.into_iter().next().unwrap_or_else(Value::void))
    }

    pub fn last(&self) -> Result<Value> {
        Ok(self.to_list()?.pop().unwrap_or_else(Value::void))
    }

    /// Apply `f` to each element. Failures become error values in place.
    pub fn each(&self, f: impl Fn(&Value) -> Result<Value>) -> Result<Value> {
        let items = self.to_list()?;
        Ok(Value::list(
            items
                .iter()
                .map(|item| f(item).unwrap_or_else(Value::failure))
                .collect(),
        ))
    }

    /// Feed this value to `f`. A failure is attached to this value instead.
    pub fn pipe(&self, f: impl FnOnce(&Value) -> Result<Value>) -> Value {
        f(self).unwrap_or_else(|err| self.with_error(err))
    }

    /// `fallback` if this value is void, else this value.
    pub fn default(&self, fallback: &Value) -> Value {
        if self.is_void() {
            fallback.clone()
        } else {
            self.clone()
        }
    }

    pub fn sum(&self) -> Result<Value> {
        let mut items = self.to_list()?.into_iter();
        let Some(first) = items.next() else {
            return Ok(Value::integer(0));
        };
        items.try_fold(first, |total, item| total.plus(&item))
    }

    pub fn product(&self) -> Result<Value> {
        let mut items = self.to_list()?.into_iter();
        let Some(first) = items.next() else {
            return Ok(Value::integer(1));
        };
        items.try_fold(first, |total, item| total.multiply(&item))
    }

    pub fn min(&self) -> Result<Value> {
        let mut best: Option<Value> = None;
        for item in self.to_list()? {
            best = match best {
                Some(current) if current.compare(&item)? != Ordering::Greater => Some(current),
                _ => Some(item),
            };
        }
        Ok(best.unwrap_or_else(Value::void))
    }

    pub fn max(&self) -> Result<Value> {
        let mut best: Option<Value> = None;
        for item in self.to_list()? {
            best = match best {
                Some(current) if current.compare(&item)? != Ordering::Less => Some(current),
                _ => Some(item),
            };
        }
        Ok(best.unwrap_or_else(Value::void))
    }

    pub fn avg(&self) -> Result<Value> {
        let count = self.to_list()?.len();
        if count == 0 {
            return Ok(Value::void());
        }
        self.sum()?.divide(&Value::integer(count as i64))
    }

    pub fn sort(&self) -> Result<Value> {
        let value = self.forced()?;
        let mut items = value.to_list()?;
        sort_values(&mut items)?;
        Ok(same_kind(&value, items))
    }

    pub fn reverse(&self) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::String(_) | Data::Range(..) => value.negate(),
            _ => {
                let mut items = value.to_list()?;
                items.reverse();
                Ok(same_kind(&value, items))
            }
        }
    }

    /// Elements with later duplicates removed.
    pub fn unique(&self) -> Result<Value> {
        let value = self.forced()?;
        let mut seen: Vec<Value> = Vec::new();
        for item in value.to_list()? {
            if !seen.contains(&item) {
                seen.push(item);
            }
        }
        Ok(same_kind(&value, seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::integer).collect())
    }

    #[test]
    fn test_scalar_is_singleton() {
        let five = Value::integer(5);
        assert_eq!(five.size().unwrap(), 1);
        assert_eq!(five.get(&Value::integer(0)).unwrap(), five);
        assert!(five.get(&Value::integer(1)).unwrap().is_void());
        assert_eq!(five.sum().unwrap(), five);
    }

    #[test]
    fn test_list_get_set() {
        let list = ints(&[1, 2, 3]);
        assert_eq!(list.get(&Value::integer(1)).unwrap(), Value::integer(2));
        assert!(list.get(&Value::integer(9)).unwrap().is_void());
        assert_eq!(list.set(&Value::integer(3), &Value::integer(4)).unwrap(), ints(&[1, 2, 3, 4]));
        let err = list.set(&Value::integer(7), &Value::integer(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        // The original is untouched.
        assert_eq!(list, ints(&[1, 2, 3]));
    }

    #[test]
    fn test_map_with_and_get() {
        let map = Value::void()
            .with("name", Value::from("ada"))
            .unwrap()
            .with("age", Value::from(36))
            .unwrap();
        assert_eq!(map.get(&Value::from("age")).unwrap(), Value::from(36));
        assert!(map.has("name").unwrap());
        assert!(!map.has("email").unwrap());
        assert_eq!(map.keys().unwrap(), Value::list(vec![Value::from("name"), Value::from("age")]));
    }

    #[test]
    fn test_range_expands() {
        let range = Value::range(Value::integer(3), Value::integer(1));
        assert_eq!(range.to_list().unwrap(), vec![Value::integer(3), Value::integer(2), Value::integer(1)]);
        assert_eq!(range.size().unwrap(), 3);
        assert!(range.contains_value(&Value::integer(2)).unwrap());
        assert!(!range.contains_value(&Value::integer(4)).unwrap());
    }

    #[test]
    fn test_char_range() {
        let range = Value::range(Value::from("a"), Value::from("c"));
        assert_eq!(range.size().unwrap(), 3);
        assert_eq!(
            range.to_list().unwrap(),
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
        assert!(Value::range(Value::from("ab"), Value::from("c")).size().is_err());
    }

    #[test]
    fn test_full_integer_range_size() {
        let range = Value::range(Value::integer(i64::MIN), Value::integer(i64::MAX));
        assert_eq!(range.size().unwrap(), usize::MAX);
        let err = range.to_list().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_aggregates() {
        let list = ints(&[3, 1, 2, 3]);
        assert_eq!(list.sum().unwrap(), Value::integer(9));
        assert_eq!(list.product().unwrap(), Value::integer(18));
        assert_eq!(list.min().unwrap(), Value::integer(1));
        assert_eq!(list.max().unwrap(), Value::integer(3));
        assert_eq!(list.sort().unwrap(), ints(&[1, 2, 3, 3]));
        assert_eq!(list.unique().unwrap(), ints(&[3, 1, 2]));
        assert_eq!(list.reverse().unwrap(), ints(&[3, 2, 1, 3]));
        assert_eq!(ints(&[1, 2]).avg().unwrap(), Value::decimal(1.5));
        assert!(Value::list(vec![]).avg().unwrap().is_void());
    }

    #[test]
    fn test_each_turns_failures_into_values() {
        let out = ints(&[1, 0, 2])
            .each(|v| Value::integer(10).modulus(v).and_then(|r| {
                if r.is(Type::Infinity) {
                    Err(Error::exception("zero"))
                } else {
                    Ok(r)
                }
            }))
            .unwrap();
        assert_eq!(out.size().unwrap(), 3);
        assert!(out.get(&Value::integer(1)).unwrap().is_error());
    }

    #[test]
    fn test_default_and_pipe() {
        assert_eq!(Value::void().default(&Value::from(1)), Value::from(1));
        assert_eq!(Value::from(2).default(&Value::from(1)), Value::from(2));
        let piped = Value::from(2).pipe(|v| v.multiply(&Value::from(3)));
        assert_eq!(piped, Value::from(6));
    }

    #[test]
    fn test_failed_pipe_keeps_the_input() {
        let list = Value::list(vec![Value::integer(1), Value::integer(2)]);
        let piped = list.pipe(|_| Err(crate::errors::Error::exception("boom")));
        assert!(piped.has_errors());
        assert!(!piped.is_void());
        assert_eq!(piped.clear_errors(), list);
    }

    #[test]
    fn test_string_as_collection() {
        let s = Value::from("abc");
        assert_eq!(s.size().unwrap(), 3);
        assert_eq!(s.get(&Value::integer(1)).unwrap(), Value::from("b"));
        assert!(s.contains_value(&Value::from("bc")).unwrap());
        assert_eq!(s.append(&Value::from("d")).unwrap(), Value::from("abcd"));
    }
}
