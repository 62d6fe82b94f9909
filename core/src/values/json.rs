//! JSON conversion.
//!
//! Types with a native JSON form map directly. The rest are encoded as an
//! object tagged with `"$type"`, so every concrete value survives a round
//! trip:
//!
//! ```text
//! void           {"$type": "Void"}
//! 1..3           {"$type": "Range", "from": 1, "to": 3}
//! date           {"$type": "Date", "value": "2024-01-01T00:00:00.000Z"}
//! error          {"$type": "Error", "errorType": "TIMEOUT", "errorMessage": "..."}
//! ```
//!
//! A map that has a `"$type"` key of its own is wrapped as
//! `{"$type": "Map", "entries": {...}}`.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as Json, json};

use super::date::{format_iso, parse_iso};
use super::queue::QueueResource;
use super::uri::Uri;
use super::value::{Data, Value};
use crate::errors::{Error, ErrorKind, Result};
use crate::types::Type;

const TYPE_TAG: &str = "$type";

fn tagged(ty: &str, fields: Json) -> Json {
    let mut object = JsonMap::new();
    object.insert(TYPE_TAG.to_string(), Json::String(ty.to_string()));
    if let Json::Object(fields) = fields {
        object.extend(fields);
    }
    Json::Object(object)
}

fn json_items(items: &[Value]) -> Result<Json> {
    Ok(Json::Array(
        items.iter().map(Value::to_json_type).collect::<Result<Vec<_>>>()?,
    ))
}

impl Value {
    /// Convert to a JSON document. Deferred values are forced.
    pub fn to_json_type(&self) -> Result<Json> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Void | Data::Lambda(_) => tagged("Void", json!({})),
            Data::Null(None) => Json::Null,
            Data::Null(Some(ty)) => tagged("Null", json!({ "of": ty.name() })),
            Data::Boolean(b) => Json::Bool(*b),
            Data::Integer(i) => Json::Number((*i).into()),
            Data::Decimal(d) => match JsonNumber::from_f64(*d) {
                Some(n) => Json::Number(n),
                None => tagged("Decimal", json!({ "value": d.to_string() })),
            },
            Data::String(s) => Json::String(s.clone()),
            Data::Date(millis) => tagged("Date", json!({ "value": format_iso(*millis) })),
            Data::Infinity { positive } => tagged("Infinity", json!({ "positive": positive })),
            Data::List(items) => json_items(items)?,
            Data::Sequence(items) => tagged("Sequence", json!({ "values": json_items(items)? })),
            Data::Map(entries) => {
                let mut object = JsonMap::new();
                for (key, item) in entries {
                    object.insert(key.clone(), item.to_json_type()?);
                }
                if entries.contains_key(TYPE_TAG) {
                    tagged("Map", json!({ "entries": Json::Object(object) }))
                } else {
                    Json::Object(object)
                }
            }
            Data::Range(from, to) => tagged(
                "Range",
                json!({ "from": from.to_json_type()?, "to": to.to_json_type()? }),
            ),
            Data::Uri(uri) => tagged("URI", json!({ "value": uri.text() })),
            Data::Queue(queue) => {
                tagged("Queue", json!({ "values": json_items(&queue.snapshot())? }))
            }
            Data::Error(err) => tagged(
                "Error",
                json!({ "errorType": err.kind().name(), "errorMessage": err.message() }),
            ),
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json_type()?)?)
    }

    pub fn from_json(json: &Json) -> Result<Value> {
        Ok(match json {
            Json::Null => Value::null(),
            Json::Bool(b) => Value::boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::integer(i),
                None => Value::decimal(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::string(s.clone()),
            Json::Array(items) => Value::list(decode_items(items)?),
            Json::Object(object) => match object.get(TYPE_TAG) {
                Some(Json::String(tag)) => decode_tagged(tag, object)?,
                _ => decode_entries(object)?,
            },
        })
    }

    pub fn from_json_str(text: &str) -> Result<Value> {
        let json: Json = serde_json::from_str(text)?;
        Value::from_json(&json)
    }
}

fn decode_items(items: &[Json]) -> Result<Vec<Value>> {
    items.iter().map(Value::from_json).collect()
}

fn decode_entries(object: &JsonMap<String, Json>) -> Result<Value> {
    let mut entries = indexmap::IndexMap::with_capacity(object.len());
    for (key, item) in object {
        entries.insert(key.clone(), Value::from_json(item)?);
    }
    Ok(Value::map(entries))
}

fn field<'a>(object: &'a JsonMap<String, Json>, tag: &str, name: &str) -> Result<&'a Json> {
    object.get(name).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidCast,
            format!("JSON {} is missing '{}'", tag, name),
        )
    })
}

fn text_field<'a>(object: &'a JsonMap<String, Json>, tag: &str, name: &str) -> Result<&'a str> {
    field(object, tag, name)?.as_str().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidCast,
            format!("JSON {} field '{}' must be a string", tag, name),
        )
    })
}

fn array_field<'a>(object: &'a JsonMap<String, Json>, tag: &str) -> Result<&'a [Json]> {
    match field(object, tag, "values")? {
        Json::Array(items) => Ok(items),
        _ => Err(Error::new(
            ErrorKind::InvalidCast,
            format!("JSON {} field 'values' must be an array", tag),
        )),
    }
}

fn decode_tagged(tag: &str, object: &JsonMap<String, Json>) -> Result<Value> {
    Ok(match tag {
        "Void" => Value::void(),
        "Null" => Value::typed_null(text_field(object, tag, "of")?.parse::<Type>()?),
        "Decimal" => {
            let text = text_field(object, tag, "value")?;
            Value::decimal(text.parse().map_err(|_| Error::invalid_cast(Type::String, Type::Decimal))?)
        }
        "Date" => {
            let text = text_field(object, tag, "value")?;
            Value::date(parse_iso(text).ok_or_else(|| Error::invalid_cast(Type::String, Type::Date))?)
        }
        "Infinity" => Value::infinity(field(object, tag, "positive")?.as_bool().unwrap_or(true)),
        "Sequence" => Value::sequence(decode_items(array_field(object, tag)?)?),
        "Range" => Value::range(
            Value::from_json(field(object, tag, "from")?)?,
            Value::from_json(field(object, tag, "to")?)?,
        ),
        "URI" => Value::from(Uri::new(text_field(object, tag, "value")?)),
        "Map" => match field(object, tag, "entries")? {
            Json::Object(entries) => decode_entries(entries)?,
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidCast,
                    "JSON Map entries must be an object",
                ));
            }
        },
        "Queue" => {
            let queue = QueueResource::new();
            for item in decode_items(array_field(object, tag)?)? {
                queue.push(item)?;
            }
            Value::new(Data::Queue(std::sync::Arc::new(queue)))
        }
        "Error" => {
            let kind = ErrorKind::from_name(text_field(object, tag, "errorType")?)
                .unwrap_or(ErrorKind::Exception);
            Value::failure(Error::new(kind, text_field(object, tag, "errorMessage")?))
        }
        other => {
            return Err(Error::new(
                ErrorKind::InvalidCast,
                format!("Unknown JSON type tag '{}'", other),
            ));
        }
    })
}
