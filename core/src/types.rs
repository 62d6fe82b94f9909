//! Runtime type tags.
//!
//! Every [`Value`](crate::Value) reports one of these tags. A tag may carry a
//! constraint label (`Integer:positive`) when it names a constrained
//! variable; [`TypeLabel::is`] ignores that label.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, ErrorKind};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Type {
    String,
    Integer,
    Decimal,
    List,
    Map,
    Range,
    Uri,
    Queue,
    Boolean,
    Date,
    Void,
    Null,
    Error,
    Block,
    Sequence,
    Infinity,
    /// Placeholder for an input whose type is not known yet.
    Any,
}

impl Type {
    pub const ALL: [Type; 17] = [
        Type::String,
        Type::Integer,
        Type::Decimal,
        Type::List,
        Type::Map,
        Type::Range,
        Type::Uri,
        Type::Queue,
        Type::Boolean,
        Type::Date,
        Type::Void,
        Type::Null,
        Type::Error,
        Type::Block,
        Type::Sequence,
        Type::Infinity,
        Type::Any,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Type::String => "String",
            Type::Integer => "Integer",
            Type::Decimal => "Decimal",
            Type::List => "List",
            Type::Map => "Map",
            Type::Range => "Range",
            Type::Uri => "URI",
            Type::Queue => "Queue",
            Type::Boolean => "Boolean",
            Type::Date => "Date",
            Type::Void => "Void",
            Type::Null => "Null",
            Type::Error => "Error",
            Type::Block => "Block",
            Type::Sequence => "Sequence",
            Type::Infinity => "Infinity",
            Type::Any => "Any",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Decimal | Type::Infinity)
    }

    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Type::List | Type::Map | Type::Range | Type::Sequence | Type::Queue
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Type {
    type Err = Error;

    /// Parses a tag name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Type::ALL
            .iter()
            .copied()
            .find(|ty| ty.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::new(ErrorKind::InvalidCast, format!("Unknown type '{}'", s)))
    }
}

/// A type tag plus an optional constraint label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeLabel {
    pub ty: Type,
    pub constraint: Option<String>,
}

impl TypeLabel {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            constraint: None,
        }
    }

    pub fn constrained(ty: Type, constraint: impl Into<String>) -> Self {
        Self {
            ty,
            constraint: Some(constraint.into()),
        }
    }

    /// Parses `Integer` or `Integer:positive`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        match text.split_once(':') {
            Some((ty, constraint)) => Ok(Self::constrained(ty.parse()?, constraint.trim())),
            None => Ok(Self::new(text.parse()?)),
        }
    }

    /// Compares the tag only.
    pub fn is(&self, ty: Type) -> bool {
        self.ty == ty
    }
}

impl From<Type> for TypeLabel {
    fn from(ty: Type) -> Self {
        Self::new(ty)
    }
}

impl fmt::Display for TypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{}:{}", self.ty, constraint),
            None => write!(f, "{}", self.ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_and_constrained() {
        assert_eq!(TypeLabel::parse("Integer").unwrap(), TypeLabel::new(Type::Integer));
        let label = TypeLabel::parse("integer:positive").unwrap();
        assert_eq!(label.to_string(), "Integer:positive");
        assert!(label.is(Type::Integer));
    }

    #[test]
    fn test_unknown_type_is_invalid_cast() {
        let err = "Banana".parse::<Type>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCast);
    }

    #[test]
    fn test_uri_name() {
        assert_eq!(Type::Uri.to_string(), "URI");
        assert_eq!("uri".parse::<Type>().unwrap(), Type::Uri);
    }
}
