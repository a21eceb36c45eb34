//! Argument contracts derived from tool input schemas
//!
//! A provider's JSON schema is reduced to a flat list of typed fields.
//! Validation rejects missing required fields and wrong types, coerces lax
//! inputs the model commonly produces, fills defaults and drops fields the
//! schema does not declare.

use serde_json::{Map, Number, Value};

/// Primitive kind of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Untyped or unrecognised schema; anything goes
    Any,
}

impl ArgKind {
    fn from_schema(schema: &Value) -> Self {
        let type_name = match schema.get("type") {
            Some(Value::String(s)) => Some(s.as_str()),
            // ["string", "null"] style unions: first non-null member
            Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
            _ => None,
        };
        match type_name {
            Some("string") => ArgKind::String,
            Some("integer") => ArgKind::Integer,
            Some("number") => ArgKind::Number,
            Some("boolean") => ArgKind::Boolean,
            Some("array") => ArgKind::Array,
            Some("object") => ArgKind::Object,
            _ => ArgKind::Any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Number => "number",
            ArgKind::Boolean => "boolean",
            ArgKind::Array => "array",
            ArgKind::Object => "object",
            ArgKind::Any => "any",
        }
    }

    /// Check `value` against this kind, coercing where unambiguous
    fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (ArgKind::Any, v) => Some(v),
            (ArgKind::String, Value::String(s)) => Some(Value::String(s)),
            (ArgKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ArgKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ArgKind::Integer, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Some(Value::Number(n))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::Number(Number::from(f as i64)))
                }
            }
            (ArgKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ArgKind::Number, Value::Number(n)) => Some(Value::Number(n)),
            (ArgKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (ArgKind::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (ArgKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ArgKind::Array, Value::Array(items)) => Some(Value::Array(items)),
            (ArgKind::Object, Value::Object(map)) => Some(Value::Object(map)),
            _ => None,
        }
    }
}

/// One declared argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// Why a call's arguments were rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be {}, got {got}", .expected.as_str())]
    WrongType {
        field: String,
        expected: ArgKind,
        got: &'static str,
    },
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validator for a tool's arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSchema {
    fields: Vec<ArgSpec>,
}

impl ArgSchema {
    /// Build from a JSON schema's `properties` and `required`
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| ArgSpec {
                        name: name.clone(),
                        kind: ArgKind::from_schema(prop),
                        required: required.contains(&name.as_str()),
                        default: prop.get("default").cloned(),
                        description: prop
                            .get("description")
                            .and_then(Value::as_str)
                            .map(String::from),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fields }
    }

    pub fn fields(&self) -> &[ArgSpec] {
        &self.fields
    }

    /// Validate and normalize call arguments. `null` is treated as `{}`.
    pub fn validate(&self, args: Value) -> Result<Value, SchemaError> {
        let mut input = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(SchemaError::NotAnObject),
        };

        let mut output = Map::new();
        for spec in &self.fields {
            match input.remove(&spec.name) {
                Some(Value::Null) | None => {
                    if spec.required {
                        return Err(SchemaError::MissingField(spec.name.clone()));
                    }
                    if let Some(default) = &spec.default {
                        output.insert(spec.name.clone(), default.clone());
                    }
                }
                Some(value) => {
                    let got = json_type_name(&value);
                    let coerced = spec.kind.coerce(value).ok_or_else(|| SchemaError::WrongType {
                        field: spec.name.clone(),
                        expected: spec.kind,
                        got,
                    })?;
                    output.insert(spec.name.clone(), coerced);
                }
            }
        }

        if !input.is_empty() {
            tracing::debug!(
                dropped = ?input.keys().collect::<Vec<_>>(),
                "Dropping undeclared tool arguments"
            );
        }

        Ok(Value::Object(output))
    }
}
