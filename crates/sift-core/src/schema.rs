use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::models::RawExtractedRecord;

/// Key under which the model returns its sequence of records.
pub const SEQUENCE_KEY: &str = "items";

/// Type of a single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    List { items: Box<FieldType> },
    Enum { values: Vec<String> },
    Record { schema: RecordSchema },
}

impl FieldType {
    pub fn list(items: FieldType) -> Self {
        FieldType::List {
            items: Box::new(items),
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn record(schema: RecordSchema) -> Self {
        FieldType::Record { schema }
    }

    /// Check `value` against this type, applying lax scalar coercion.
    fn coerce(&self, value: &Value, path: &str) -> Result<Value, AppError> {
        match (self, value) {
            (FieldType::String, Value::String(_)) => Ok(value.clone()),
            (FieldType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

            (FieldType::Integer, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    return Ok(value.clone());
                }
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(Value::from(f as i64)),
                    _ => Err(mismatch(path, "an integer", value)),
                }
            }
            (FieldType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch(path, "an integer", value)),

            (FieldType::Number, Value::Number(_)) => Ok(value.clone()),
            (FieldType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| mismatch(path, "a number", value)),

            (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch(path, "a boolean", value)),
            },

            (FieldType::List { items }, Value::Array(elements)) => elements
                .iter()
                .enumerate()
                .map(|(i, element)| items.coerce(element, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            (FieldType::Enum { values }, Value::String(s)) => values
                .iter()
                .find(|v| v.eq_ignore_ascii_case(s.trim()))
                .map(|v| Value::String(v.clone()))
                .ok_or_else(|| {
                    AppError::SchemaValidationError(format!(
                        "{path}: '{s}' is not one of [{}]",
                        values.join(", ")
                    ))
                }),

            (FieldType::Record { schema }, _) => schema.validate_at(value, path).map(Value::Object),

            (FieldType::String, _) => Err(mismatch(path, "a string", value)),
            (FieldType::Integer, _) => Err(mismatch(path, "an integer", value)),
            (FieldType::Number, _) => Err(mismatch(path, "a number", value)),
            (FieldType::Boolean, _) => Err(mismatch(path, "a boolean", value)),
            (FieldType::List { .. }, _) => Err(mismatch(path, "a list", value)),
            (FieldType::Enum { .. }, _) => Err(mismatch(path, "a string", value)),
        }
    }

    fn json_schema(&self, nullable: bool) -> Value {
        let simple = |name: &str| {
            if nullable {
                json!({ "type": [name, "null"] })
            } else {
                json!({ "type": name })
            }
        };

        match self {
            FieldType::String => simple("string"),
            FieldType::Integer => simple("integer"),
            FieldType::Number => simple("number"),
            FieldType::Boolean => simple("boolean"),
            FieldType::List { items } => {
                let mut schema = simple("array");
                schema["items"] = items.json_schema(false);
                schema
            }
            FieldType::Enum { values } => {
                let mut schema = simple("string");
                let mut variants: Vec<Value> = values.iter().cloned().map(Value::String).collect();
                if nullable {
                    variants.push(Value::Null);
                }
                schema["enum"] = Value::Array(variants);
                schema
            }
            FieldType::Record { schema } => {
                if nullable {
                    json!({ "anyOf": [schema.json_schema(), { "type": "null" }] })
                } else {
                    schema.json_schema()
                }
            }
        }
    }
}

fn mismatch(path: &str, expected: &str, got: &Value) -> AppError {
    AppError::SchemaValidationError(format!("{path}: expected {expected}, got {}", kind(got)))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// A named field of a [`RecordSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Optional fields tolerate partial model output; required ones do not.
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Description of the records an extraction should produce.
///
/// Descriptors can be built in code or loaded from JSON:
///
/// ```json
/// {
///   "name": "facility.Listing",
///   "fields": [
///     { "name": "title", "type": "string", "required": true },
///     { "name": "beds", "type": "integer" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn required(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(FieldDescriptor::required(name, field_type))
    }

    pub fn optional(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(FieldDescriptor::optional(name, field_type))
    }

    /// The first required field, used to identify records in logs.
    pub fn identifying_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.required)
            .map(|f| f.name.as_str())
    }

    /// Validate one model-produced instance and convert it to a plain record.
    ///
    /// Missing optional fields are filled with `null`, undeclared keys are
    /// dropped, and missing or `null` required fields are rejected.
    pub fn validate(&self, value: &Value) -> Result<RawExtractedRecord, AppError> {
        self.validate_at(value, &self.name)
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<RawExtractedRecord, AppError> {
        let object = value
            .as_object()
            .ok_or_else(|| mismatch(path, "an object", value))?;

        let mut record = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let field_path = format!("{path}.{}", field.name);
            let coerced = match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(AppError::SchemaValidationError(format!(
                        "{field_path}: required field is missing"
                    )));
                }
                None | Some(Value::Null) => Value::Null,
                Some(v) => field.field_type.coerce(v, &field_path)?,
            };
            record.insert(field.name.clone(), coerced);
        }
        Ok(record)
    }

    /// Strict JSON Schema for one record.
    ///
    /// Every property is listed as required; optional ones accept `null`.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let mut property = field.field_type.json_schema(!field.required);
            if let (Some(description), Some(obj)) = (&field.description, property.as_object_mut()) {
                obj.insert("description".into(), Value::String(description.clone()));
            }
            properties.insert(field.name.clone(), property);
            required.push(Value::String(field.name.clone()));
        }

        let mut schema = json!({
            "type": "object",
            "title": self.name,
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        });
        if let Some(description) = &self.description {
            schema["description"] = Value::String(description.clone());
        }
        schema
    }

    /// JSON Schema asking for zero or more records under [`SEQUENCE_KEY`].
    ///
    /// The model always answers with a sequence, even for a single entity.
    pub fn sequence_json_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                SEQUENCE_KEY: {
                    "type": "array",
                    "items": self.json_schema(),
                }
            },
            "required": [SEQUENCE_KEY],
            "additionalProperties": false,
        })
    }
}
