//! Arithmetic and logical operators.
//!
//! Operators force their operands first. Void is the identity for `+` and
//! `-`, null and error operands propagate unchanged, and errors attached to
//! either operand are carried over to the result.

use core::cmp::Ordering;

use super::value::{Data, Value};
use crate::errors::{Error, ErrorKind, Result};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Largest string (in bytes) or list that repetition will build.
const MAX_REPEAT_LEN: usize = 10_000_000;

/// Numeric view of a value, used for mixed-type arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Dec(f64),
    Inf(bool),
}

impl Number {
    pub(crate) fn of(data: &Data) -> Option<Number> {
        match data {
            Data::Integer(i) => Some(Number::Int(*i)),
            Data::Decimal(d) => Some(Number::Dec(*d)),
            Data::Infinity { positive } => Some(Number::Inf(*positive)),
            _ => None,
        }
    }

    /// Like [`of`](Self::of), also accepting numeric strings.
    pub(crate) fn coerce(data: &Data) -> Option<Number> {
        match data {
            Data::String(s) => Number::parse(s),
            other => Number::of(other),
        }
    }

    pub(crate) fn parse(text: &str) -> Option<Number> {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::Int(i));
        }
        match text.parse::<f64>() {
            Ok(d) if d.is_finite() => Some(Number::Dec(d)),
            _ => None,
        }
    }

    pub(crate) fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Dec(d) => d,
            Number::Inf(true) => f64::INFINITY,
            Number::Inf(false) => f64::NEG_INFINITY,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Dec(d) => d == 0.0,
            Number::Inf(_) => false,
        }
    }

    fn is_negative(self) -> bool {
        match self {
            Number::Int(i) => i < 0,
            Number::Dec(d) => d < 0.0,
            Number::Inf(positive) => !positive,
        }
    }

    pub(crate) fn numeric_eq(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Inf(a), Number::Inf(b)) => a == b,
            (Number::Inf(_), _) | (_, Number::Inf(_)) => false,
            (a, b) => a.to_f64() == b.to_f64(),
        }
    }

    pub(crate) fn total_cmp(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (Number::Inf(a), Number::Inf(b)) => a.cmp(&b),
            (Number::Inf(positive), _) => {
                if positive {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (_, Number::Inf(positive)) => {
                if positive {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (a, b) => a.to_f64().total_cmp(&b.to_f64()),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::integer(i),
            Number::Dec(d) => Value::decimal(d),
            Number::Inf(positive) => Value::infinity(positive),
        }
    }

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Inf(p), Number::Inf(q)) if p != q => Number::Dec(f64::NAN),
            (Number::Inf(p), _) | (_, Number::Inf(p)) => Number::Inf(p),
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map_or(Number::Dec(a as f64 + b as f64), Number::Int),
            (a, b) => Number::Dec(a.to_f64() + b.to_f64()),
        }
    }

    fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Inf(p), Number::Inf(q)) if p == q => Number::Dec(f64::NAN),
            (Number::Inf(p), _) => Number::Inf(p),
            (_, Number::Inf(q)) => Number::Inf(!q),
            (Number::Int(a), Number::Int(b)) => a
                .checked_sub(b)
                .map_or(Number::Dec(a as f64 - b as f64), Number::Int),
            (a, b) => Number::Dec(a.to_f64() - b.to_f64()),
        }
    }

    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Inf(p), n) | (n, Number::Inf(p)) => {
                if n.is_zero() {
                    Number::Int(0)
                } else {
                    Number::Inf(p != n.is_negative())
                }
            }
            (Number::Int(a), Number::Int(b)) => a
                .checked_mul(b)
                .map_or(Number::Dec(a as f64 * b as f64), Number::Int),
            (a, b) => Number::Dec(a.to_f64() * b.to_f64()),
        }
    }

    /// Division by zero yields signed infinity; division by infinity yields 0.
    /// Integer division stays integral only when exact.
    fn div(self, other: Number) -> Number {
        match (self, other) {
            (Number::Inf(_), Number::Inf(_)) => Number::Dec(f64::NAN),
            (_, Number::Inf(_)) => Number::Int(0),
            (Number::Inf(p), n) => Number::Inf(p != n.is_negative()),
            (a, b) if b.is_zero() => Number::Inf(!a.is_negative()),
            (Number::Int(a), Number::Int(b)) => match (a.checked_rem(b), a.checked_div(b)) {
                (Some(0), Some(q)) => Number::Int(q),
                _ => Number::Dec(a as f64 / b as f64),
            },
            (a, b) => Number::Dec(a.to_f64() / b.to_f64()),
        }
    }

    fn rem(self, other: Number) -> Number {
        match (self, other) {
            (a, b) if b.is_zero() => Number::Inf(!a.is_negative()),
            (Number::Inf(_), _) => Number::Dec(f64::NAN),
            (a, Number::Inf(_)) => a,
            (Number::Int(a), Number::Int(b)) => Number::Int(a.checked_rem(b).unwrap_or(0)),
            (a, b) => Number::Dec(a.to_f64() % b.to_f64()),
        }
    }

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => i.checked_neg().map_or(Number::Dec(-(i as f64)), Number::Int),
            Number::Dec(d) => Number::Dec(-d),
            Number::Inf(p) => Number::Inf(!p),
        }
    }
}

/// Attach the operands' errors to `result`, skipping ones it already has.
fn carry(result: Value, a: &Value, b: &Value) -> Value {
    let missing: Vec<_> = a
        .errors()
        .iter()
        .chain(b.errors())
        .filter(|e| !result.errors().contains(e))
        .cloned()
        .collect();
    if missing.is_empty() {
        result
    } else {
        result.with_errors(&missing)
    }
}

/// Null and error operands win over everything else.
fn absorbing(a: &Value, b: &Value) -> Option<Value> {
    match (a.data(), b.data()) {
        (Data::Error(_), _) | (Data::Null(_), _) => Some(a.clone()),
        (_, Data::Error(_)) | (_, Data::Null(_)) => Some(b.clone()),
        _ => None,
    }
}

fn numeric(op: &str, a: &Value, b: &Value, f: fn(Number, Number) -> Number) -> Result<Value> {
    match (Number::of(a.data()), Number::of(b.data())) {
        (Some(m), Some(n)) => Ok(f(m, n).into_value()),
        _ => Err(Error::invalid_operands(op, a.data().ty(), b.data().ty())),
    }
}

/// `"abc"` stepped by one is `"abd"`.
fn step_last_char(s: &str, delta: i32) -> Result<String> {
    let mut chars: Vec<char> = s.chars().collect();
    let stepped = chars
        .last()
        .and_then(|c| (*c as u32).checked_add_signed(delta))
        .and_then(char::from_u32);
    match stepped {
        Some(c) => {
            if let Some(last) = chars.last_mut() {
                *last = c;
            }
            Ok(chars.into_iter().collect())
        }
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("Cannot step the last character of '{}'", s),
        )),
    }
}

/// Negative counts repeat zero times.
fn repeat_count(len: usize, times: &Value) -> Result<usize> {
    let count = usize::try_from(times.to_integer()?).unwrap_or(0);
    match len.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("Repeating {} elements {} times is too large", len, count),
        )),
    }
}

fn shift_days(millis: i64, days: &Value) -> Result<Value> {
    let offset = days.to_decimal()? * MILLIS_PER_DAY;
    Ok(Value::date(millis.saturating_add(offset as i64)))
}

fn plus_concrete(a: &Value, b: &Value) -> Result<Value> {
    Ok(match (a.data(), b.data()) {
        (Data::String(x), _) => Value::string(format!("{}{}", x, b.to_human_string())),
        (Data::List(items), _) => {
            let mut items = items.clone();
            items.push(b.clone());
            Value::list(items)
        }
        (Data::Sequence(items), _) => {
            let mut items = items.clone();
            items.push(b.clone());
            Value::sequence(items)
        }
        (Data::Map(x), Data::Map(y)) => {
            let mut merged = x.clone();
            merged.extend(y.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::map(merged)
        }
        (Data::Range(from, to), _) if b.is_number() => Value::range(from.plus(b)?, to.plus(b)?),
        (Data::Date(millis), _) if b.is_number() => shift_days(*millis, b)?,
        (x, Data::String(y)) if x.is_scalar() => {
            Value::string(format!("{}{}", a.to_human_string(), y))
        }
        (x, Data::List(items)) if x.is_scalar() => {
            let mut prepended = Vec::with_capacity(items.len() + 1);
            prepended.push(a.clone());
            prepended.extend(items.iter().cloned());
            Value::list(prepended)
        }
        _ => numeric("+", a, b, Number::add)?,
    })
}

fn minus_concrete(a: &Value, b: &Value) -> Result<Value> {
    Ok(match (a.data(), b.data()) {
        (Data::String(x), _) => {
            let needle = b.to_human_string();
            if needle.is_empty() {
                a.clone()
            } else {
                Value::string(x.replace(&needle, ""))
            }
        }
        (Data::List(items), _) => Value::list(items.iter().filter(|v| *v != b).cloned().collect()),
        (Data::Sequence(items), _) => {
            Value::sequence(items.iter().filter(|v| *v != b).cloned().collect())
        }
        (Data::Map(x), Data::Map(y)) => Value::map(
            x.iter()
                .filter(|(k, _)| !y.contains_key(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        (Data::Map(x), _) => {
            let mut reduced = x.clone();
            reduced.shift_remove(&b.to_human_string());
            Value::map(reduced)
        }
        (Data::Range(from, to), _) if b.is_number() => Value::range(from.minus(b)?, to.minus(b)?),
        (Data::Date(x), Data::Date(y)) => {
            Value::decimal(x.saturating_sub(*y) as f64 / MILLIS_PER_DAY)
        }
        (Data::Date(millis), _) if b.is_number() => shift_days(*millis, &b.negate()?)?,
        _ => numeric("-", a, b, Number::sub)?,
    })
}

impl Value {
    /// `+`: numeric addition, string concatenation, list append, map merge,
    /// range shift and date plus days.
    pub fn plus(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.forced()?, rhs.forced()?);
        let result = match (a.data(), b.data()) {
            (Data::Void, _) => b.clone(),
            (_, Data::Void) => a.clone(),
            _ => match absorbing(&a, &b) {
                Some(absorbed) => absorbed,
                None => plus_concrete(&a, &b)?,
            },
        };
        Ok(carry(result, &a, &b))
    }

    /// `-`: numeric subtraction, removal from strings, lists and maps,
    /// and date arithmetic (date minus date is a decimal number of days).
    pub fn minus(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.forced()?, rhs.forced()?);
        let result = match (a.data(), b.data()) {
            (_, Data::Void) => a.clone(),
            (Data::Void, _) => b.negate()?,
            _ => match absorbing(&a, &b) {
                Some(absorbed) => absorbed,
                None => minus_concrete(&a, &b)?,
            },
        };
        Ok(carry(result, &a, &b))
    }

    /// `*`: numeric multiplication, string and list repetition.
    pub fn multiply(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.forced()?, rhs.forced()?);
        if let Some(result) = absorbing(&a, &b) {
            return Ok(carry(result, &a, &b));
        }
        let result = match (a.data(), b.data()) {
            (Data::Void, _) | (_, Data::Void) => Value::void(),
            (Data::String(s), _) if b.is_number() => {
                let count = repeat_count(s.len(), &b)?;
                Value::string(s.repeat(count))
            }
            (Data::List(items), _) if b.is_number() => {
                let count = repeat_count(items.len(), &b)?;
                Value::list(items.iter().cloned().cycle().take(items.len() * count).collect())
            }
            _ => numeric("*", &a, &b, Number::mul)?,
        };
        Ok(carry(result, &a, &b))
    }

    /// `/`: numeric division, string split (by a string) and string
    /// truncation (by a positive number).
    pub fn divide(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.forced()?, rhs.forced()?);
        if let Some(result) = absorbing(&a, &b) {
            return Ok(carry(result, &a, &b));
        }
        let result = match (a.data(), b.data()) {
            (Data::Void, _) | (_, Data::Void) => Value::void(),
            (Data::String(s), Data::String(separator)) => {
                if separator.is_empty() {
                    Value::list(s.chars().map(|c| Value::string(c.to_string())).collect())
                } else {
                    Value::list(s.split(separator.as_str()).map(Value::string).collect())
                }
            }
            (Data::String(s), _) if b.is_number() => {
                let divisor = b.to_decimal()?;
                if divisor <= 0.0 {
                    return Err(Error::new(
                        ErrorKind::InvalidOperation,
                        format!("Cannot divide a string by {}", b.to_human_string()),
                    ));
                }
                let keep = (s.chars().count() as f64 / divisor) as usize;
                Value::string(s.chars().take(keep).collect::<String>())
            }
            _ => numeric("/", &a, &b, Number::div)?,
        };
        Ok(carry(result, &a, &b))
    }

    /// `%`: numeric remainder. A zero divisor yields signed infinity.
    pub fn modulus(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.forced()?, rhs.forced()?);
        if let Some(result) = absorbing(&a, &b) {
            return Ok(carry(result, &a, &b));
        }
        let result = numeric("%", &a, &b, Number::rem)?;
        Ok(carry(result, &a, &b))
    }

    /// Unary minus: numbers flip sign, strings and lists reverse, ranges
    /// swap ends, booleans invert.
    pub fn negate(&self) -> Result<Value> {
        let value = self.forced()?;
        let result = match value.data() {
            Data::Void | Data::Null(_) | Data::Error(_) => value.clone(),
            Data::String(s) => Value::string(s.chars().rev().collect::<String>()),
            Data::List(items) => Value::list(items.iter().rev().cloned().collect()),
            Data::Sequence(items) => Value::sequence(items.iter().rev().cloned().collect()),
            Data::Range(from, to) => Value::range(to.clone(), from.clone()),
            Data::Boolean(b) => Value::boolean(!b),
            data => match Number::of(data) {
                Some(n) => n.neg().into_value(),
                None => return Err(Error::invalid_operation("negate", data.ty())),
            },
        };
        Ok(carry(result, &value, &Value::void()))
    }

    pub fn abs(&self) -> Result<Value> {
        let value = self.forced()?;
        match Number::of(value.data()) {
            Some(n) if n.is_negative() => value.negate(),
            Some(_) => Ok(value),
            None => Err(Error::invalid_operation("abs", value.data().ty())),
        }
    }

    /// -1, 0 or 1.
    pub fn sign(&self) -> Result<Value> {
        let value = self.forced()?;
        match Number::of(value.data()) {
            Some(n) if n.is_zero() => Ok(Value::integer(0)),
            Some(n) if n.is_negative() => Ok(Value::integer(-1)),
            Some(Number::Dec(d)) if d.is_nan() => Ok(Value::decimal(f64::NAN)),
            Some(_) => Ok(Value::integer(1)),
            None => Err(Error::invalid_operation("sign", value.data().ty())),
        }
    }

    /// Add one. A string steps its final character forward.
    pub fn inc(&self) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::String(s) => Ok(value.with_data(Data::String(step_last_char(s, 1)?))),
            _ => value.plus(&Value::integer(1)),
        }
    }

    /// Subtract one. A string steps its final character back.
    pub fn dec(&self) -> Result<Value> {
        let value = self.forced()?;
        match value.data() {
            Data::String(s) => Ok(value.with_data(Data::String(step_last_char(s, -1)?))),
            _ => value.minus(&Value::integer(1)),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.number_matches(Number::is_zero)
    }

    pub fn is_negative(&self) -> bool {
        self.number_matches(Number::is_negative)
    }

    pub fn is_positive(&self) -> bool {
        self.number_matches(|n| !n.is_zero() && !n.is_negative())
    }

    fn number_matches(&self, test: impl Fn(Number) -> bool) -> bool {
        match self.forced() {
            Ok(value) => Number::of(value.data()).is_some_and(test),
            Err(_) => false,
        }
    }

    pub fn logical_not(&self) -> Value {
        Value::boolean(!self.truthy())
    }

    pub fn logical_and(&self, rhs: &Value) -> Value {
        Value::boolean(self.truthy() && rhs.truthy())
    }

    pub fn logical_or(&self, rhs: &Value) -> Value {
        Value::boolean(self.truthy() || rhs.truthy())
    }

    /// Equality as a boolean value.
    pub fn equals(&self, rhs: &Value) -> Value {
        Value::boolean(self == rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    fn int(i: i64) -> Value {
        Value::integer(i)
    }

    #[test]
    fn test_int_add() {
        assert_eq!(int(2).plus(&int(3)).unwrap(), int(5));
    }

    #[test]
    fn test_int_overflow_promotes_to_decimal() {
        let sum = int(i64::MAX).plus(&int(1)).unwrap();
        assert_eq!(sum.ty(), Type::Decimal);
    }

    #[test]
    fn test_int_div_exact_stays_integer() {
        let q = int(10).divide(&int(2)).unwrap();
        assert_eq!(q.ty(), Type::Integer);
        assert_eq!(q, int(5));
    }

    #[test]
    fn test_int_div_inexact_promotes() {
        let q = int(7).divide(&int(2)).unwrap();
        assert_eq!(q.ty(), Type::Decimal);
        assert_eq!(q, Value::decimal(3.5));
    }

    #[test]
    fn test_div_by_zero_is_signed_infinity() {
        assert_eq!(int(5).divide(&int(0)).unwrap(), Value::infinity(true));
        assert_eq!(int(-5).divide(&int(0)).unwrap(), Value::infinity(false));
        assert_eq!(int(5).modulus(&int(0)).unwrap(), Value::infinity(true));
    }

    #[test]
    fn test_div_by_infinity_is_zero() {
        assert_eq!(int(5).divide(&Value::infinity(true)).unwrap(), int(0));
    }

    #[test]
    fn test_infinity_absorbs_addition() {
        assert_eq!(Value::infinity(false).plus(&int(1)).unwrap(), Value::infinity(false));
        assert_eq!(int(3).multiply(&Value::infinity(false)).unwrap(), Value::infinity(false));
        assert_eq!(int(-3).multiply(&Value::infinity(false)).unwrap(), Value::infinity(true));
    }

    #[test]
    fn test_string_ops() {
        let hello = Value::from("hello");
        assert_eq!(hello.plus(&int(1)).unwrap(), Value::from("hello1"));
        assert_eq!(int(1).plus(&Value::from("x")).unwrap(), Value::from("1x"));
        assert_eq!(hello.minus(&Value::from("l")).unwrap(), Value::from("heo"));
        assert_eq!(Value::from("ab").multiply(&int(3)).unwrap(), Value::from("ababab"));
        assert_eq!(hello.negate().unwrap(), Value::from("olleh"));
        assert_eq!(hello.divide(&int(2)).unwrap(), Value::from("he"));
        assert_eq!(
            Value::from("a,b").divide(&Value::from(",")).unwrap(),
            Value::list(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_list_append_and_prepend() {
        let list = Value::list(vec![int(1), int(2)]);
        assert_eq!(list.plus(&int(3)).unwrap(), Value::list(vec![int(1), int(2), int(3)]));
        assert_eq!(int(0).plus(&list).unwrap(), Value::list(vec![int(0), int(1), int(2)]));
        assert_eq!(list.minus(&int(1)).unwrap(), Value::list(vec![int(2)]));
    }

    #[test]
    fn test_void_is_identity() {
        assert_eq!(Value::void().plus(&int(4)).unwrap(), int(4));
        assert_eq!(int(4).minus(&Value::void()).unwrap(), int(4));
    }

    #[test]
    fn test_map_merge() {
        let a = Value::map_from([("x", int(1))]);
        let b = Value::map_from([("y", int(2)), ("x", int(3))]);
        assert_eq!(
            a.plus(&b).unwrap(),
            Value::map_from([("x", int(3)), ("y", int(2))])
        );
    }

    #[test]
    fn test_invalid_operands() {
        let err = Value::boolean(true).plus(&int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_errors_carry_over() {
        let tainted = int(1).with_error(Error::exception("upstream"));
        let sum = tainted.plus(&int(1)).unwrap();
        assert_eq!(sum, int(2));
        assert_eq!(sum.errors().len(), 1);
    }

    #[test]
    fn test_sign_abs() {
        assert_eq!(int(-4).abs().unwrap(), int(4));
        assert_eq!(Value::decimal(-0.5).sign().unwrap(), int(-1));
        assert_eq!(int(0).sign().unwrap(), int(0));
    }

    #[test]
    fn test_date_days() {
        let day = 86_400_000;
        let d = Value::date(0).plus(&int(2)).unwrap();
        assert_eq!(d, Value::date(2 * day));
        assert_eq!(d.minus(&Value::date(day)).unwrap(), Value::decimal(1.0));
    }

    #[test]
    fn test_inc_dec() {
        assert_eq!(int(1).inc().unwrap(), int(2));
        assert_eq!(Value::decimal(1.5).dec().unwrap(), Value::decimal(0.5));
        assert_eq!(Value::from("abc").inc().unwrap(), Value::from("abd"));
        assert_eq!(Value::from("b").dec().unwrap(), Value::from("a"));
        assert!(Value::from("").inc().is_err());
    }

    #[test]
    fn test_number_predicates() {
        assert!(int(0).is_zero());
        assert!(int(3).is_positive());
        assert!(Value::decimal(-0.1).is_negative());
        assert!(!Value::from("0").is_zero());
        assert!(!int(0).is_positive());
    }

    #[test]
    fn test_huge_repetition_fails() {
        let err = Value::from("ab").multiply(&int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let list = Value::list(vec![int(1), int(2)]);
        let err = list.multiply(&int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(list.multiply(&int(-1)).unwrap(), Value::list(vec![]));
    }
}
