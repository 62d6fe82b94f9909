//! The dynamic value type.

use core::cmp::Ordering;
use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::operators::Number;
use super::queue::QueueResource;
use super::uri::Uri;
use crate::api::Runtime;
use crate::errors::{Error, ErrorKind, Result};
use crate::lambda::Lambda;
use crate::source::short_hash;
use crate::types::{Type, TypeLabel};

/// Meta key holding a constraint fingerprint.
pub const CONSTRAINT_META: &str = "constraint";

/// An immutable, dynamically typed value.
///
/// Values are cheap to clone (a reference count bump) and safe to share
/// across threads. Every operation returns a new value; none mutate in place.
///
/// A value is either concrete or a deferred computation ([`Data::Lambda`]).
/// Operators force deferred operands before use; [`Value::fix`] forces
/// explicitly.
#[derive(Clone)]
pub struct Value {
    inner: Arc<ValueInner>,
}

struct ValueInner {
    data: Data,
    errors: Vec<Error>,
    meta: BTreeMap<String, String>,
}

/// Payload of a [`Value`].
#[derive(Clone)]
pub enum Data {
    Void,
    /// Null, optionally carrying the type it stands in for.
    Null(Option<Type>),
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    /// Milliseconds since the Unix epoch, UTC.
    Date(i64),
    Infinity { positive: bool },
    List(Vec<Value>),
    Sequence(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// Inclusive range.
    Range(Value, Value),
    Uri(Uri),
    Queue(Arc<QueueResource>),
    Error(Error),
    Lambda(Arc<Lambda>),
}

impl Data {
    /// Type tag, without forcing. Deferred computations report `Block`.
    pub fn ty(&self) -> Type {
        match self {
            Data::Void => Type::Void,
            Data::Null(_) => Type::Null,
            Data::Boolean(_) => Type::Boolean,
            Data::Integer(_) => Type::Integer,
            Data::Decimal(_) => Type::Decimal,
            Data::String(_) => Type::String,
            Data::Date(_) => Type::Date,
            Data::Infinity { .. } => Type::Infinity,
            Data::List(_) => Type::List,
            Data::Sequence(_) => Type::Sequence,
            Data::Map(_) => Type::Map,
            Data::Range(..) => Type::Range,
            Data::Uri(_) => Type::Uri,
            Data::Queue(_) => Type::Queue,
            Data::Error(_) => Type::Error,
            Data::Lambda(_) => Type::Block,
        }
    }

    pub(crate) fn is_scalar(&self) -> bool {
        matches!(
            self,
            Data::Boolean(_)
                | Data::Integer(_)
                | Data::Decimal(_)
                | Data::String(_)
                | Data::Date(_)
                | Data::Infinity { .. }
                | Data::Uri(_)
        )
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Value {
    pub fn new(data: Data) -> Self {
        Self {
            inner: Arc::new(ValueInner {
                data,
                errors: Vec::new(),
                meta: BTreeMap::new(),
            }),
        }
    }

    fn rebuild(&self, errors: Vec<Error>, meta: BTreeMap<String, String>) -> Self {
        Self {
            inner: Arc::new(ValueInner {
                data: self.inner.data.clone(),
                errors,
                meta,
            }),
        }
    }

    pub fn void() -> Self {
        Self::new(Data::Void)
    }

    pub fn null() -> Self {
        Self::new(Data::Null(None))
    }

    /// A null standing in for a value of type `ty`.
    pub fn typed_null(ty: Type) -> Self {
        Self::new(Data::Null(Some(ty)))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(Data::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::new(Data::Integer(value))
    }

    pub fn decimal(value: f64) -> Self {
        Self::new(Data::Decimal(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Data::String(value.into()))
    }

    pub fn date(millis: i64) -> Self {
        Self::new(Data::Date(millis))
    }

    pub fn infinity(positive: bool) -> Self {
        Self::new(Data::Infinity { positive })
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::new(Data::List(items))
    }

    pub fn sequence(items: Vec<Value>) -> Self {
        Self::new(Data::Sequence(items))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Self::new(Data::Map(entries))
    }

    pub fn map_from<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn range(from: Value, to: Value) -> Self {
        Self::new(Data::Range(from, to))
    }

    /// A new, empty in-memory queue.
    pub fn queue() -> Self {
        Self::new(Data::Queue(Arc::new(QueueResource::new())))
    }

    /// A failure value carrying `error` both as data and in its error list.
    pub fn failure(error: Error) -> Self {
        Self {
            inner: Arc::new(ValueInner {
                data: Data::Error(error.clone()),
                errors: vec![error],
                meta: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn from_lambda(lambda: Arc<Lambda>) -> Self {
        Self::new(Data::Lambda(lambda))
    }

    /// Same errors and meta, new payload.
    pub(crate) fn with_data(&self, data: Data) -> Self {
        Self {
            inner: Arc::new(ValueInner {
                data,
                errors: self.inner.errors.clone(),
                meta: self.inner.meta.clone(),
            }),
        }
    }

    /// A deep copy that shares no mutable state with this value.
    ///
    /// Collections are copied element by element and each queue gets its
    /// own storage holding copies of the current items. Scalars, URIs and
    /// deferred values are shared as they are. Errors and meta are kept.
    pub fn copy(&self) -> Result<Value> {
        let copy_items =
            |items: &[Value]| items.iter().map(Value::copy).collect::<Result<Vec<_>>>();
        Ok(match self.data() {
            Data::List(items) => self.with_data(Data::List(copy_items(items)?)),
            Data::Sequence(items) => self.with_data(Data::Sequence(copy_items(items)?)),
            Data::Map(entries) => {
                let mut copied = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    copied.insert(key.clone(), item.copy()?);
                }
                self.with_data(Data::Map(copied))
            }
            Data::Range(from, to) => self.with_data(Data::Range(from.copy()?, to.copy()?)),
            Data::Queue(queue) => {
                let fresh = QueueResource::new();
                for item in queue.snapshot() {
                    fresh.push(item.copy()?)?;
                }
                self.with_data(Data::Queue(Arc::new(fresh)))
            }
            _ => self.clone(),
        })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Value::map(entries)
    }
}

impl From<Uri> for Value {
    fn from(uri: Uri) -> Self {
        Value::new(Data::Uri(uri))
    }
}

impl From<Error> for Value {
    fn from(error: Error) -> Self {
        Value::failure(error)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Value::null, Into::into)
    }
}

// ============================================================================
// Inspection
// ============================================================================

impl Value {
    /// The payload, without forcing.
    pub fn data(&self) -> &Data {
        &self.inner.data
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.inner.data, Data::Lambda(_))
    }

    pub fn as_lambda(&self) -> Option<&Arc<Lambda>> {
        match &self.inner.data {
            Data::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// Resolve to a concrete value, forcing a deferred computation once.
    ///
    /// Errors attached to this handle are carried over to the result.
    pub fn forced(&self) -> Result<Value> {
        match &self.inner.data {
            Data::Lambda(lambda) => {
                let value = lambda.force()?;
                if self.inner.errors.is_empty() {
                    Ok(value)
                } else {
                    let mut errors = value.inner.errors.clone();
                    errors.extend(self.inner.errors.iter().cloned());
                    Ok(value.rebuild(errors, value.inner.meta.clone()))
                }
            }
            _ => Ok(self.clone()),
        }
    }

    /// The type tag. Forces deferred values; a failed force reports `Error`.
    pub fn ty(&self) -> Type {
        match self.forced() {
            Ok(value) => value.inner.data.ty(),
            Err(_) => Type::Error,
        }
    }

    /// The type tag plus the constraint fingerprint, if any.
    pub fn type_label(&self) -> TypeLabel {
        TypeLabel {
            ty: self.ty(),
            constraint: self.meta(CONSTRAINT_META),
        }
    }

    pub fn is(&self, ty: Type) -> bool {
        self.ty() == ty
    }

    pub fn is_void(&self) -> bool {
        self.is(Type::Void)
    }

    pub fn is_null(&self) -> bool {
        self.is(Type::Null)
    }

    pub fn is_error(&self) -> bool {
        self.is(Type::Error)
    }

    pub fn is_number(&self) -> bool {
        self.ty().is_numeric()
    }

    /// The runtime a deferred value evaluates in.
    pub fn runtime(&self) -> Option<Runtime> {
        self.as_lambda().map(|lambda| lambda.scope().runtime().clone())
    }

    /// Concrete integer payload, without forcing.
    pub fn as_integer(&self) -> Option<i64> {
        match self.inner.data {
            Data::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Concrete string payload, without forcing.
    pub fn as_str(&self) -> Option<&str> {
        match &self.inner.data {
            Data::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_integer(&self) -> Result<i64> {
        let value = self.forced()?;
        match value.data() {
            Data::Integer(i) => Ok(*i),
            Data::Decimal(d) => Ok(*d as i64),
            Data::Boolean(b) => Ok(i64::from(*b)),
            Data::Date(millis) => Ok(*millis),
            Data::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::invalid_cast(Type::String, Type::Integer)),
            other => Err(Error::invalid_cast(other.ty(), Type::Integer)),
        }
    }

    pub fn to_decimal(&self) -> Result<f64> {
        let value = self.forced()?;
        match value.data() {
            Data::Integer(i) => Ok(*i as f64),
            Data::Decimal(d) => Ok(*d),
            Data::Infinity { positive: true } => Ok(f64::INFINITY),
            Data::Infinity { positive: false } => Ok(f64::NEG_INFINITY),
            Data::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Data::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::invalid_cast(Type::String, Type::Decimal)),
            other => Err(Error::invalid_cast(other.ty(), Type::Decimal)),
        }
    }
}

// ============================================================================
// Errors as values
// ============================================================================

impl Value {
    pub fn errors(&self) -> &[Error] {
        &self.inner.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.inner.errors.is_empty() || matches!(self.inner.data, Data::Error(_))
    }

    /// A copy of this value with `error` appended to its error list.
    pub fn with_error(&self, error: Error) -> Value {
        let mut errors = self.inner.errors.clone();
        errors.push(error);
        self.rebuild(errors, self.inner.meta.clone())
    }

    /// A copy of this value carrying `errors` in addition to its own.
    pub fn with_errors<'a>(&self, errors: impl IntoIterator<Item = &'a Error>) -> Value {
        let mut all = self.inner.errors.clone();
        all.extend(errors.into_iter().cloned());
        self.rebuild(all, self.inner.meta.clone())
    }

    pub fn clear_errors(&self) -> Value {
        if self.inner.errors.is_empty() {
            return self.clone();
        }
        self.rebuild(Vec::new(), self.inner.meta.clone())
    }

    /// Pass each attached error to `handler` and return a cleared copy.
    pub fn on_errors(&self, mut handler: impl FnMut(&Error)) -> Value {
        self.inner.errors.iter().for_each(&mut handler);
        self.clear_errors()
    }

    /// `Err` with the first attached error, or the value itself.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.inner.errors.first() {
            return Err(error.clone());
        }
        if let Data::Error(error) = &self.inner.data {
            return Err(error.clone());
        }
        Ok(self)
    }
}

// ============================================================================
// Meta-data
// ============================================================================

impl Value {
    pub fn meta(&self, key: &str) -> Option<String> {
        self.inner.meta.get(key).cloned()
    }

    /// A copy of this value with meta `key` set to `value`.
    pub fn with_meta(&self, key: &str, value: impl Into<String>) -> Value {
        let mut meta = self.inner.meta.clone();
        meta.insert(key.to_string(), value.into());
        self.rebuild(self.inner.errors.clone(), meta)
    }

    /// Like [`with_meta`](Self::with_meta), but refuses to overwrite a
    /// different existing entry.
    pub fn with_meta_once(&self, key: &str, value: impl Into<String>) -> Result<Value> {
        let value = value.into();
        match self.inner.meta.get(key) {
            Some(existing) if *existing == value => Ok(self.clone()),
            Some(existing) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!(
                    "Meta '{}' is already set to '{}', cannot change it to '{}'",
                    key, existing, value
                ),
            )),
            None => Ok(self.with_meta(key, value)),
        }
    }

    /// Tag this value with the fingerprint of the constraint `source`.
    ///
    /// A value may only ever carry one constraint.
    pub fn constrain(&self, source: &str) -> Result<Value> {
        let fingerprint = short_hash(source);
        match self.inner.meta.get(CONSTRAINT_META) {
            Some(existing) if *existing != fingerprint => Err(Error::new(
                ErrorKind::ConstraintViolation,
                format!("Cannot change the constraint of a value (was {})", existing),
            )),
            _ => Ok(self.with_meta(CONSTRAINT_META, fingerprint)),
        }
    }

    pub fn constraint_fingerprint(&self) -> Option<String> {
        self.meta(CONSTRAINT_META)
    }
}

// ============================================================================
// Truthiness
// ============================================================================

fn truthy_data(data: &Data) -> bool {
    match data {
        Data::Void | Data::Null(_) | Data::Error(_) | Data::Lambda(_) => false,
        Data::Boolean(b) => *b,
        Data::Integer(i) => *i != 0,
        Data::Decimal(d) => *d != 0.0 && !d.is_nan(),
        Data::String(s) => !s.is_empty(),
        Data::List(items) | Data::Sequence(items) => !items.is_empty(),
        Data::Map(entries) => !entries.is_empty(),
        Data::Queue(queue) => !queue.is_empty(),
        Data::Range(..) | Data::Infinity { .. } | Data::Date(_) | Data::Uri(_) => true,
    }
}

impl Value {
    /// Zero, empty, void, null and errors are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        self.forced().is_ok_and(|value| truthy_data(value.data()))
    }

    pub fn is_true(&self) -> bool {
        !self.is_neither_true_nor_false() && self.truthy()
    }

    pub fn is_false(&self) -> bool {
        !self.is_neither_true_nor_false() && !self.truthy()
    }

    /// An unresolved error state is neither true nor false.
    pub fn is_neither_true_nor_false(&self) -> bool {
        match self.forced() {
            Ok(value) => matches!(value.data(), Data::Error(_)),
            Err(_) => true,
        }
    }
}

// ============================================================================
// Equality and ordering
// ============================================================================

fn loosely_equals(a: &Value, b: &Value) -> bool {
    match (a.data(), b.data()) {
        (Data::Void, Data::Void) => true,
        (Data::Void, _) | (_, Data::Void) => false,
        (Data::Null(x), Data::Null(y)) => x == y,
        (Data::Null(_), _) | (_, Data::Null(_)) => false,
        (Data::Error(x), Data::Error(y)) => x.kind() == y.kind() && x.message() == y.message(),
        (Data::Error(_), _) | (_, Data::Error(_)) => false,
        (Data::Boolean(x), Data::Boolean(y)) => x == y,
        (Data::Date(x), Data::Date(y)) => x == y,
        (
            Data::List(x) | Data::Sequence(x),
            Data::List(y) | Data::Sequence(y),
        ) => x == y,
        (Data::Range(from_a, to_a), Data::Range(from_b, to_b)) => from_a == from_b && to_a == to_b,
        (Data::Map(x), Data::Map(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| v == w))
        }
        (Data::Queue(x), Data::Queue(y)) => Arc::ptr_eq(x, y) || x.snapshot() == y.snapshot(),
        (Data::Uri(x), Data::Uri(y)) => x.text() == y.text(),
        (x, y) => match (Number::of(x), Number::of(y)) {
            (Some(m), Some(n)) => m.numeric_eq(n),
            _ if x.is_scalar() && y.is_scalar() => a.to_human_string() == b.to_human_string(),
            _ => false,
        },
    }
}

/// Equality forces both sides. A side that fails to force is unequal to
/// everything.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) && !self.is_lambda() {
            return true;
        }
        match (self.forced(), other.forced()) {
            (Ok(a), Ok(b)) => loosely_equals(&a, &b),
            _ => false,
        }
    }
}

fn compare_concrete(a: &Value, b: &Value) -> Result<Ordering> {
    match (a.data(), b.data()) {
        (Data::Void, Data::Void) | (Data::Null(_), Data::Null(_)) => Ok(Ordering::Equal),
        (Data::Void, _) => Ok(Ordering::Less),
        (_, Data::Void) => Ok(Ordering::Greater),
        (Data::Null(_), _) => Ok(Ordering::Less),
        (_, Data::Null(_)) => Ok(Ordering::Greater),
        (Data::Boolean(x), Data::Boolean(y)) => Ok(x.cmp(y)),
        (Data::Date(x), Data::Date(y)) => Ok(x.cmp(y)),
        (Data::String(x), Data::String(y)) => match (Number::parse(x), Number::parse(y)) {
            (Some(m), Some(n)) => Ok(m.total_cmp(n)),
            _ => Ok(x.cmp(y)),
        },
        (
            Data::List(x) | Data::Sequence(x),
            Data::List(y) | Data::Sequence(y),
        ) => {
            for (p, q) in x.iter().zip(y) {
                match p.compare(q)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        (x, y) => match (Number::coerce(x), Number::coerce(y)) {
            (Some(m), Some(n)) => Ok(m.total_cmp(n)),
            _ if x.is_scalar() && y.is_scalar() => Ok(a.to_human_string().cmp(&b.to_human_string())),
            _ => Err(Error::invalid_operands("compare", x.ty(), y.ty())),
        },
    }
}

impl Value {
    /// Total ordering used by comparisons, `sort`, `min` and `max`.
    ///
    /// Numbers (and numeric strings) compare numerically, void sorts first,
    /// null next. Mixed scalars fall back to their text.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        compare_concrete(&self.forced()?, &other.forced()?)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.data {
            Data::Lambda(lambda) => write!(f, "Lambda({})", lambda.operation())?,
            Data::Queue(queue) => write!(f, "Queue({} items)", queue.len())?,
            data => write!(f, "{}({})", data.ty(), self.to_human_string())?,
        }
        if !self.inner.errors.is_empty() {
            write!(f, " errors={:?}", self.inner.errors)?;
        }
        Ok(())
    }
}
