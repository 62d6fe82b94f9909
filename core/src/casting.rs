//! Type casting validation and conversion
//!
//! Casting converts a value to a target [`Type`]. Some casts always succeed
//! (anything to `String`, any number to `Decimal`), some depend on the value
//! (`String` to `Integer` parses), and some are never allowed (`Map` to
//! `Integer`). A failed cast is an `INVALID_CAST` error.

use crate::errors::{Error, Result};
use crate::types::Type;
use crate::values::date::parse_iso;
use crate::values::uri::Uri;
use crate::values::{Data, QueueResource, Value};

/// Check whether a value of `source` type can ever be cast to `target`.
///
/// A `true` answer does not guarantee success: `"abc"` is a `String` and
/// `String -> Integer` is valid, but that particular string fails to parse.
pub fn is_cast_valid(source: Type, target: Type) -> bool {
    use Type as T;
    if source == target || matches!(target, T::Any | T::String | T::Void | T::Null) {
        return true;
    }
    match source {
        T::Void => matches!(target, T::List | T::Map | T::Boolean | T::Sequence),
        T::Null | T::Block | T::Any => false,
        T::Error => matches!(target, T::Boolean),
        T::Integer | T::Decimal => matches!(
            target,
            T::Integer | T::Decimal | T::Boolean | T::Date | T::List | T::Sequence | T::Map
        ),
        T::Boolean => matches!(target, T::Integer | T::Decimal | T::List | T::Sequence | T::Map),
        T::String => matches!(
            target,
            T::Integer | T::Decimal | T::Boolean | T::Date | T::Uri | T::List | T::Sequence | T::Map
        ),
        T::Date => matches!(
            target,
            T::Integer | T::Decimal | T::Boolean | T::List | T::Sequence | T::Map
        ),
        T::Infinity => matches!(target, T::Decimal | T::Boolean | T::List | T::Sequence | T::Map),
        T::List | T::Sequence => matches!(
            target,
            T::List | T::Sequence | T::Map | T::Boolean | T::Range | T::Queue
        ),
        T::Map => matches!(target, T::List | T::Sequence | T::Boolean),
        T::Range | T::Queue => matches!(target, T::List | T::Sequence | T::Map | T::Boolean),
        T::Uri => matches!(target, T::Boolean | T::List | T::Sequence),
    }
}

/// Check a cast between types, returning the error a failing cast raises.
pub fn validate_cast(source: Type, target: Type) -> Result<()> {
    if is_cast_valid(source, target) {
        Ok(())
    } else {
        Err(Error::invalid_cast(source, target))
    }
}

/// Convert `value` to `target`.
pub fn cast(value: &Value, target: Type) -> Result<Value> {
    let value = value.forced()?;
    let source = value.data().ty();
    if source == target || target == Type::Any {
        return Ok(value);
    }
    validate_cast(source, target)?;
    let failed = || Error::invalid_cast(source, target);

    Ok(match target {
        Type::String => Value::string(value.to_human_string()),
        Type::Boolean => match value.data() {
            Data::String(s) => {
                let s = s.trim();
                Value::boolean(s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("yes"))
            }
            _ => Value::boolean(value.truthy()),
        },
        Type::Integer => match value.data() {
            Data::Decimal(d) if !d.is_finite() => return Err(failed()),
            _ => Value::integer(value.to_integer().map_err(|_| failed())?),
        },
        Type::Decimal => match value.data() {
            Data::Date(millis) => Value::decimal(*millis as f64),
            _ => Value::decimal(value.to_decimal().map_err(|_| failed())?),
        },
        Type::Date => match value.data() {
            Data::String(s) => Value::date(parse_iso(s.trim()).ok_or_else(failed)?),
            _ => Value::date(value.to_integer().map_err(|_| failed())?),
        },
        Type::Uri => Value::from(Uri::new(value.to_human_string())),
        Type::List => Value::list(value.to_list()?),
        Type::Sequence => Value::sequence(value.to_list()?),
        Type::Map => Value::map(value.to_map()?),
        Type::Range => match value.to_list()?.as_slice() {
            [from, to] => Value::range(from.clone(), to.clone()),
            _ => return Err(failed()),
        },
        Type::Queue => {
            let queue = QueueResource::new();
            for item in value.to_list()? {
                queue.push(item)?;
            }
            Value::new(Data::Queue(std::sync::Arc::new(queue)))
        }
        Type::Void => Value::void(),
        Type::Null => Value::typed_null(source),
        _ => return Err(failed()),
    })
}

impl Value {
    /// See [`cast`].
    pub fn cast(&self, target: Type) -> Result<Value> {
        cast(self, target)
    }
}
