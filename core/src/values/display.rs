//! Text forms of values: human-readable and Dollar script source.

use core::fmt;

use super::date::format_iso;
use super::value::{Data, Value};
use crate::errors::{Error, ErrorKind, Result};

pub(crate) fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "infinity" } else { "-infinity" };
        text.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn quote(text: &str) -> Result<String> {
    Ok(serde_json::to_string(text)?)
}

impl Value {
    /// Text meant for people: strings unquoted, void empty, collections as
    /// JSON.
    pub fn to_human_string(&self) -> String {
        let value = match self.forced() {
            Ok(value) => value,
            Err(err) => return err.to_string(),
        };
        match value.data() {
            Data::Void | Data::Lambda(_) => String::new(),
            Data::Null(_) => "null".to_string(),
            Data::Boolean(b) => b.to_string(),
            Data::Integer(i) => i.to_string(),
            Data::Decimal(d) => format_decimal(*d),
            Data::String(s) => s.clone(),
            Data::Date(millis) => format_iso(*millis),
            Data::Infinity { positive: true } => "infinity".to_string(),
            Data::Infinity { positive: false } => "-infinity".to_string(),
            Data::Range(from, to) => format!("{}..{}", from.to_human_string(), to.to_human_string()),
            Data::Uri(uri) => uri.text().to_string(),
            Data::Error(err) => err.to_string(),
            Data::List(_) | Data::Sequence(_) | Data::Map(_) | Data::Queue(_) => value
                .to_json_string()
                .unwrap_or_else(|err| err.to_string()),
        }
    }

    /// Dollar source text that evaluates back to this value.
    ///
    /// Queues are live resources and have no source form.
    pub fn to_dollar_script(&self) -> Result<String> {
        let value = self.forced()?;
        Ok(match value.data() {
            Data::Void | Data::Lambda(_) => "void".to_string(),
            Data::Null(None) => "null".to_string(),
            Data::Null(Some(ty)) => format!("(null as {})", ty),
            Data::Boolean(b) => b.to_string(),
            Data::Integer(i) => i.to_string(),
            Data::Decimal(d) => format_decimal(*d),
            Data::Infinity { positive: true } => "infinity".to_string(),
            Data::Infinity { positive: false } => "-infinity".to_string(),
            Data::String(s) => quote(s)?,
            Data::Date(millis) => format!("({} as Date)", quote(&format_iso(*millis))?),
            Data::Uri(uri) => format!("({} as URI)", quote(uri.text())?),
            Data::Range(from, to) => {
                format!("({}..{})", from.to_dollar_script()?, to.to_dollar_script()?)
            }
            Data::List(items) | Data::Sequence(items) => {
                let parts = items
                    .iter()
                    .map(Value::to_dollar_script)
                    .collect::<Result<Vec<_>>>()?;
                format!("[{}]", parts.join(", "))
            }
            Data::Map(entries) => {
                let parts = entries
                    .iter()
                    .map(|(k, v)| Ok(format!("{}: {}", quote(k)?, v.to_dollar_script()?)))
                    .collect::<Result<Vec<_>>>()?;
                format!("{{{}}}", parts.join(", "))
            }
            Data::Error(err) => format!(
                "error({}, {})",
                quote(err.kind().name())?,
                quote(err.message())?
            ),
            Data::Queue(_) => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "A queue cannot be converted to script",
                ));
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_string())
    }
}
