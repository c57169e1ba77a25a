//! # Response Schemas
//!
//! A response schema describes the JSON object the model is asked to
//! produce. It has two jobs:
//!
//! 1. **Render a skeleton**: a JSON document embedded in the system
//!    instruction so the model knows which fields to fill in.
//! 2. **Strictly parse candidate text**: turn the model's reply into a value
//!    that contains every required field with the right type, or fail.
//!
//! The rest of the crate only sees the [`SchemaDescriptor`] trait, so callers
//! can bring their own implementation. Two are provided:
//!
//! - [`Schema`]: an explicit field table, built with [`schema()`].
//! - [`TypedSchema`]: a concrete serde type deriving `schemars::JsonSchema`.
//!   Both the skeleton and the parse come from the type, so they can't drift
//!   apart.
//!
//! ## Skeleton Format
//!
//! The skeleton is a JSON Schema object:
//!
//! ```json
//! {
//!   "properties": { "markdown": { "type": "string" } },
//!   "required": ["markdown"],
//!   "title": "BlockTranscription",
//!   "type": "object"
//! }
//! ```
//!
//! ## Examples
//!
//! ```rust
//! use vlm_structured::{schema, SchemaDescriptor};
//!
//! let s = schema()
//!     .title("BlockTranscription")
//!     .field("markdown", "string")
//!     .build();
//!
//! let value = s.try_parse(r#"{"markdown": "hi", "extra": 1}"#).unwrap();
//! assert_eq!(value, serde_json::json!({"markdown": "hi"}));
//! assert!(s.try_parse(r#"{"text": "hi"}"#).is_err());
//! ```

use crate::{Error, Result};
use schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::marker::PhantomData;

/// Capability interface for anything that can describe and validate the
/// model's structured reply.
pub trait SchemaDescriptor: Send + Sync {
    /// Example document describing the expected shape. Must be valid JSON.
    fn skeleton(&self) -> Value;

    /// Strictly parse `text` into a value satisfying this schema.
    ///
    /// Failures are reported as [`Error::Validation`] carrying the parse
    /// diagnostic. A returned value is always complete.
    fn try_parse(&self, text: &str) -> Result<Value>;

    /// Pretty-printed skeleton, two-space indented.
    fn skeleton_pretty(&self) -> String {
        format!("{:#}", self.skeleton())
    }
}

/// The JSON type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<FieldType>),
    Object(Schema),
    /// Any JSON value, including null
    Any,
}

impl FieldType {
    /// Map a friendly type name to a field type.
    ///
    /// Accepts the usual aliases (`str`, `int`, `i64`, `f64`, `bool`, `vec`,
    /// `list`, `dict`, `map`, ...). Unknown names fall back to `String`.
    pub fn from_type_str(type_str: &str) -> Self {
        match type_str {
            "string" | "str" => FieldType::String,
            "integer" | "int" | "i32" | "i64" | "u32" | "u64" => FieldType::Integer,
            "number" | "float" | "f32" | "f64" => FieldType::Number,
            "boolean" | "bool" => FieldType::Boolean,
            "array" | "list" | "vec" => FieldType::Array(Box::new(FieldType::Any)),
            "object" | "dict" | "map" => FieldType::Object(Schema::default()),
            "any" => FieldType::Any,
            _ => FieldType::String,
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldType::String => json!({ "type": "string" }),
            FieldType::Number => json!({ "type": "number" }),
            FieldType::Integer => json!({ "type": "integer" }),
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::Array(items) => match items.as_ref() {
                FieldType::Any => json!({ "type": "array", "items": {} }),
                inner => json!({ "type": "array", "items": inner.to_json_schema() }),
            },
            FieldType::Object(schema) => schema.skeleton(),
            FieldType::Any => json!({}),
        }
    }

    fn validate(&self, value: &Value, path: &str) -> Result<Value> {
        let ok = match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Any => true,
            FieldType::Array(items) => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| type_mismatch(path, "array", value))?;
                let validated = arr
                    .iter()
                    .enumerate()
                    .map(|(i, item)| items.validate(item, &format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::Array(validated));
            }
            FieldType::Object(schema) => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| type_mismatch(path, "object", value))?;
                // No declared fields means a free-form object
                if schema.fields.is_empty() {
                    return Ok(value.clone());
                }
                return schema.validate_object(obj, path);
            }
        };

        if ok {
            Ok(value.clone())
        } else {
            Err(type_mismatch(path, self.name(), value))
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array(_) => "array",
            FieldType::Object(_) => "object",
            FieldType::Any => "any",
        }
    }
}

fn type_mismatch(path: &str, expected: &str, found: &Value) -> Error {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    Error::validation(format!(
        "field `{}`: expected {}, found {}",
        path, expected, found
    ))
}

/// A single named field in a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub required: bool,
}

impl Field {
    /// A required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: None,
            required: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Missing or null values are accepted and dumped as `null`.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Explicit field table describing a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    title: Option<String>,
    fields: Vec<Field>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validate a parsed value against the field table.
    pub fn validate(&self, value: &Value) -> Result<Value> {
        let obj = value
            .as_object()
            .ok_or_else(|| type_mismatch("$", "object", value))?;
        self.validate_object(obj, "")
    }

    /// Validate an object, keeping only declared fields.
    fn validate_object(&self, obj: &Map<String, Value>, prefix: &str) -> Result<Value> {
        let mut out = Map::new();

        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}.{}", prefix, field.name)
            };

            match obj.get(&field.name) {
                Some(Value::Null) | None if !field.required => {
                    out.insert(field.name.clone(), Value::Null);
                }
                None => {
                    return Err(Error::validation(format!("missing field `{}`", path)));
                }
                Some(value) => {
                    out.insert(field.name.clone(), field.field_type.validate(value, &path)?);
                }
            }
        }

        Ok(Value::Object(out))
    }
}

impl SchemaDescriptor for Schema {
    fn skeleton(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = field.field_type.to_json_schema();
            if let (Some(desc), Some(obj)) = (&field.description, prop.as_object_mut()) {
                obj.insert("description".to_string(), Value::String(desc.clone()));
            }
            properties.insert(field.name.clone(), prop);

            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        let mut skeleton = Map::new();
        if let Some(title) = &self.title {
            skeleton.insert("title".to_string(), Value::String(title.clone()));
        }
        skeleton.insert("type".to_string(), Value::String("object".to_string()));
        skeleton.insert("properties".to_string(), Value::Object(properties));
        skeleton.insert("required".to_string(), Value::Array(required));
        Value::Object(skeleton)
    }

    fn try_parse(&self, text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::validation(format!("invalid JSON: {}", e)))?;
        self.validate(&value)
    }
}

/// Fluent builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    title: Option<String>,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a required field using a friendly type name, see
    /// [`FieldType::from_type_str`].
    pub fn field(self, name: &str, type_str: &str) -> Self {
        self.push(Field::new(name, FieldType::from_type_str(type_str)))
    }

    /// Add an optional field using a friendly type name.
    pub fn optional_field(self, name: &str, type_str: &str) -> Self {
        self.push(Field::new(name, FieldType::from_type_str(type_str)).optional())
    }

    /// Add a required nested object.
    pub fn nested(self, name: &str, schema: Schema) -> Self {
        self.push(Field::new(name, FieldType::Object(schema)))
    }

    /// Add a fully specified field. A field with the same name is replaced.
    pub fn push(mut self, field: Field) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            title: self.title,
            fields: self.fields,
        }
    }
}

/// Start building a [`Schema`].
pub fn schema() -> SchemaBuilder {
    SchemaBuilder::default()
}

/// A response schema derived from a concrete type.
///
/// The skeleton is `T`'s JSON Schema and parsing is `T`'s `Deserialize`, so
/// serde attributes (`default`, `rename`, `deny_unknown_fields`) apply to
/// both. The value handed back is `T` serialized again, so it only ever
/// contains what `T` keeps.
///
/// ```rust
/// use schemars::JsonSchema;
/// use serde::{Deserialize, Serialize};
/// use vlm_structured::{SchemaDescriptor, TypedSchema};
///
/// #[derive(Serialize, Deserialize, JsonSchema)]
/// struct PageLabel {
///     label: String,
///     #[serde(default)]
///     score: f64,
/// }
///
/// let schema = TypedSchema::<PageLabel>::new();
/// let value = schema.try_parse(r#"{"label": "figure"}"#).unwrap();
/// assert_eq!(value, serde_json::json!({"label": "figure", "score": 0.0}));
/// ```
pub struct TypedSchema<T> {
    skeleton: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Serialize,
{
    pub fn new() -> Self {
        let mut skeleton = serde_json::to_value(schema_for!(T)).unwrap_or_else(|e| {
            log::warn!("Failed to render schema for {}: {}", std::any::type_name::<T>(), e);
            json!({ "type": "object" })
        });
        if let Some(obj) = skeleton.as_object_mut() {
            obj.remove("$schema");
        }

        Self {
            skeleton,
            _marker: PhantomData,
        }
    }

    /// Parse straight into `T`.
    pub fn parse_typed(&self, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| Error::validation(format!("invalid JSON: {}", e)))
    }
}

impl<T> Default for TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedSchema<T> {
    fn clone(&self) -> Self {
        Self {
            skeleton: self.skeleton.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .field("skeleton", &self.skeleton)
            .finish()
    }
}

impl<T> SchemaDescriptor for TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Serialize,
{
    fn skeleton(&self) -> Value {
        self.skeleton.clone()
    }

    fn try_parse(&self, text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::validation(format!("invalid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(type_mismatch("$", "object", &value));
        }

        let typed: T =
            serde_json::from_value(value).map_err(|e| Error::validation(e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| Error::validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn transcription() -> Schema {
        schema()
            .title("BlockTranscription")
            .field("markdown", "string")
            .build()
    }

    #[test]
    fn test_type_aliases() {
        assert_eq!(FieldType::from_type_str("str"), FieldType::String);
        assert_eq!(FieldType::from_type_str("i64"), FieldType::Integer);
        assert_eq!(FieldType::from_type_str("f32"), FieldType::Number);
        assert_eq!(FieldType::from_type_str("bool"), FieldType::Boolean);
        assert_eq!(
            FieldType::from_type_str("vec"),
            FieldType::Array(Box::new(FieldType::Any))
        );
        assert_eq!(FieldType::from_type_str("unknown"), FieldType::String);
    }

    #[test]
    fn test_skeleton_shape() {
        let skeleton = transcription().skeleton();
        assert_eq!(
            skeleton,
            json!({
                "title": "BlockTranscription",
                "type": "object",
                "properties": { "markdown": { "type": "string" } },
                "required": ["markdown"]
            })
        );
    }

    #[test]
    fn test_skeleton_pretty_is_valid_json() {
        let s = schema()
            .field("label", "string")
            .optional_field("confidence", "number")
            .nested("bbox", schema().field("x", "int").field("y", "int").build())
            .build();

        let pretty = s.skeleton_pretty();
        assert!(pretty.contains('\n'));
        let reparsed: Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(reparsed, s.skeleton());
        assert_eq!(reparsed["required"], json!(["label", "bbox"]));
    }

    #[test]
    fn test_try_parse_drops_undeclared_fields() {
        let value = transcription()
            .try_parse(r#"{"markdown": "hello", "confidence": 0.9}"#)
            .unwrap();
        assert_eq!(value, json!({"markdown": "hello"}));
    }

    #[test]
    fn test_try_parse_missing_field() {
        let err = transcription().try_parse(r#"{"text": "x"}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("missing field `markdown`"));
    }

    #[test]
    fn test_try_parse_type_mismatch() {
        let err = transcription().try_parse(r#"{"markdown": 3}"#).unwrap_err();
        assert!(err.to_string().contains("expected string, found number"));
    }

    #[test]
    fn test_try_parse_invalid_json() {
        let err = transcription().try_parse("not json").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_try_parse_rejects_non_object() {
        assert!(transcription().try_parse(r#"["markdown"]"#).is_err());
    }

    #[test]
    fn test_optional_field_defaults_to_null() {
        let s = schema()
            .field("label", "string")
            .optional_field("note", "string")
            .build();
        let value = s.try_parse(r#"{"label": "table"}"#).unwrap();
        assert_eq!(value, json!({"label": "table", "note": null}));
    }

    #[test]
    fn test_nested_and_array_validation() {
        let s = schema()
            .push(Field::new(
                "rows",
                FieldType::Array(Box::new(FieldType::Object(
                    schema().field("cells", "array").build(),
                ))),
            ))
            .build();

        let ok = s.try_parse(r#"{"rows": [{"cells": ["a", 1]}]}"#).unwrap();
        assert_eq!(ok, json!({"rows": [{"cells": ["a", 1]}]}));

        let err = s.try_parse(r#"{"rows": [{"cells": "a"}]}"#).unwrap_err();
        assert!(err.to_string().contains("rows[0].cells"));
    }

    #[test]
    fn test_integer_rejects_float() {
        let s = schema().field("count", "int").build();
        assert!(s.try_parse(r#"{"count": 2}"#).is_ok());
        assert!(s.try_parse(r#"{"count": 2.5}"#).is_err());
    }

    #[test]
    fn test_push_replaces_same_name() {
        let s = schema().field("a", "string").field("a", "int").build();
        assert_eq!(s.fields().len(), 1);
        assert_eq!(s.fields()[0].field_type, FieldType::Integer);
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
    struct PageLabel {
        label: String,
        #[serde(default)]
        score: f64,
    }

    #[test]
    fn test_typed_schema() {
        let typed = TypedSchema::<PageLabel>::new();

        let parsed = typed.parse_typed(r#"{"label": "figure", "score": 0.5}"#).unwrap();
        assert_eq!(
            parsed,
            PageLabel {
                label: "figure".to_string(),
                score: 0.5
            }
        );

        let value = typed
            .try_parse(r#"{"label": "figure", "score": 0.5, "extra": true}"#)
            .unwrap();
        assert_eq!(value, json!({"label": "figure", "score": 0.5}));
    }

    #[test]
    fn test_typed_schema_applies_serde_defaults() {
        let typed = TypedSchema::<PageLabel>::new();

        let value = typed.try_parse(r#"{"label": "figure"}"#).unwrap();
        assert_eq!(value, json!({"label": "figure", "score": 0.0}));

        let parsed = typed.parse_typed(r#"{"label": "figure"}"#).unwrap();
        assert_eq!(parsed.score, 0.0);
    }

    #[test]
    fn test_typed_skeleton_comes_from_type() {
        let skeleton = TypedSchema::<PageLabel>::new().skeleton();

        assert_eq!(skeleton["type"], "object");
        assert_eq!(skeleton["title"], "PageLabel");
        assert!(skeleton.get("$schema").is_none());
        assert_eq!(skeleton["properties"]["label"]["type"], "string");
        assert!(skeleton["properties"].get("score").is_some());
        assert_eq!(skeleton["required"], json!(["label"]));

        let pretty = TypedSchema::<PageLabel>::new().skeleton_pretty();
        let reparsed: Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(reparsed, skeleton);
    }

    #[test]
    fn test_typed_schema_rejects_wrong_shapes() {
        let typed = TypedSchema::<PageLabel>::new();

        for text in [r#"{"label": 1}"#, r#"{"score": 0.5}"#, r#"["figure"]"#, "figure"] {
            let err = typed.try_parse(text).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "input {:?}", text);
        }
    }
}
