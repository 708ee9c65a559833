//! Field specifications: what a caller wants extracted from a document.
//!
//! Callers describe fields in one of three shapes:
//!
//! ```json
//! ["tax_id", "company_name"]
//! {"tax_id": "integer", "company_name": "legal name of the issuer"}
//! {"tax_id": {"name": "Tax ID", "type": "integer", "description": "10 digits"}}
//! ```
//!
//! All of them normalize to a list of [`NormalizedField`]s, which render into the prompt sent to
//! the model and drive type coercion of the values it returns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Field specification as received on the wire.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldSpec {
    /// Bare field names, each typed as a string
    List(Vec<String>),
    /// Field name to a type tag, a description, or a detailed object
    Map(IndexMap<String, Value>),
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Number,
    Boolean,
    Date,
    List,
}

impl FromStr for FieldType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "integer" | "int" => Ok(FieldType::Integer),
            "float" => Ok(FieldType::Float),
            "number" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "list" | "array" => Ok(FieldType::List),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::List => "list",
        };
        f.write_str(name)
    }
}

impl FieldType {
    /// Nudge a model-returned value towards this type.
    ///
    /// Only unambiguous conversions are applied; anything else is returned as-is.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (FieldType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            (FieldType::Integer, Value::Number(n)) => match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
                _ => Value::Number(n),
            },
            (FieldType::Float, Value::String(s)) => match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Value::Number(n),
                None => Value::String(s),
            },
            (FieldType::Number, Value::String(s)) => {
                let trimmed = s.trim();
                if let Ok(n) = trimmed.parse::<i64>() {
                    Value::from(n)
                } else if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
                    Value::Number(n)
                } else {
                    Value::String(s)
                }
            }
            (FieldType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => Value::Bool(true),
                "false" | "no" => Value::Bool(false),
                _ => Value::String(s),
            },
            (FieldType::List, Value::Array(items)) => Value::Array(items),
            (FieldType::List, scalar) => Value::Array(vec![scalar]),
            (_, other) => other,
        }
    }
}

/// A field after shape normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedField {
    /// Key the value is returned under
    pub key: String,
    /// Human-readable label used in the prompt
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
}

impl NormalizedField {
    fn plain(key: &str, description: String, field_type: FieldType) -> Self {
        Self {
            key: key.to_string(),
            name: title_case(key),
            description,
            field_type,
        }
    }

    fn detailed(key: &str, spec: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        let field_type = match spec.get("type") {
            None | Some(Value::Null) => FieldType::String,
            Some(Value::String(tag)) => tag.parse().map_err(|_| Error::BadRequest {
                message: format!("Unknown type '{tag}' for field '{key}'"),
            })?,
            Some(other) => {
                return Err(Error::BadRequest {
                    message: format!("Invalid type {other} for field '{key}'"),
                });
            }
        };

        let name = spec
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(key)
            .to_string();

        let description = spec.get("description").map(describe_value).unwrap_or_default();

        Ok(Self {
            key: key.to_string(),
            name,
            description,
            field_type,
        })
    }

    /// Render as a single prompt line: `- "key": Name (type) - description`
    pub fn prompt_line(&self) -> String {
        let mut line = format!("- \"{}\": {} ({})", self.key, self.name, self.field_type);
        if !self.description.is_empty() {
            line.push_str(" - ");
            line.push_str(&self.description);
        }
        line
    }
}

impl FieldSpec {
    /// Normalize into one entry per requested key, in request order.
    pub fn normalize(&self) -> Result<Vec<NormalizedField>, Error> {
        let fields = match self {
            FieldSpec::List(keys) => {
                let mut seen = std::collections::HashSet::new();
                keys.iter()
                    .filter(|key| seen.insert(key.as_str()))
                    .map(|key| NormalizedField::plain(key, String::new(), FieldType::String))
                    .collect::<Vec<_>>()
            }
            FieldSpec::Map(map) => map
                .iter()
                .map(|(key, value)| match value {
                    Value::Object(spec) => NormalizedField::detailed(key, spec),
                    Value::String(text) => Ok(match text.parse::<FieldType>() {
                        Ok(field_type) => NormalizedField::plain(key, String::new(), field_type),
                        Err(()) => NormalizedField::plain(key, text.clone(), FieldType::String),
                    }),
                    other => Ok(NormalizedField::plain(key, describe_value(other), FieldType::String)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if fields.is_empty() {
            return Err(Error::BadRequest {
                message: "At least one field must be requested".to_string(),
            });
        }

        if let Some(blank) = fields.iter().find(|field| field.key.trim().is_empty()) {
            return Err(Error::BadRequest {
                message: format!("Field keys cannot be blank (got {:?})", blank.key),
            });
        }

        Ok(fields)
    }
}

/// Render the "Requested Fields" block of a prompt.
pub fn describe_fields(fields: &[NormalizedField]) -> String {
    fields.iter().map(NormalizedField::prompt_line).collect::<Vec<_>>().join("\n")
}

/// Pick the requested keys out of a model response, in request order, coercing each value.
///
/// Keys the model omitted come back as `null`; keys it invented are dropped.
pub fn select_fields(fields: &[NormalizedField], returned: &serde_json::Map<String, Value>) -> IndexMap<String, Value> {
    fields
        .iter()
        .map(|field| {
            let value = returned.get(&field.key).cloned().unwrap_or(Value::Null);
            (field.key.clone(), field.field_type.coerce(value))
        })
        .collect()
}

/// `tax_id` -> `Tax Id`: underscores become spaces, each word capitalized and the rest lowered.
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut at_word_start = true;
    for c in key.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}
