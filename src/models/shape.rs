//! Result shapes: the subset of attributes a consumer wants materialized.
//!
//! Any `#[derive(Deserialize, JsonSchema)]` struct is a [`Shape`]; its field
//! list is read from the generated JSON schema, so serde renames are honoured.

use crate::error::{DbError, DbResult};
use crate::models::Mapping;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

/// Ordered set of field names requested by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescription {
    name: String,
    fields: Vec<String>,
}

impl ShapeDescription {
    /// Describe a shape explicitly. Duplicate field names are collapsed.
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self {
            name: name.into(),
            fields: unique,
        }
    }

    /// Derive the description from a type's JSON schema properties.
    pub fn of<T: JsonSchema>() -> Self {
        let schema = schemars::schema_for!(T);
        let fields: Vec<String> = schema
            .as_object()
            .and_then(|o| o.get("properties"))
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        Self::new(T::schema_name(), fields)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// A typed result shape.
pub trait Shape: DeserializeOwned {
    fn describe() -> ShapeDescription;

    /// Validate one row mapping into the shape.
    fn from_mapping(mapping: Mapping) -> DbResult<Self> {
        serde_json::from_value(serde_json::Value::Object(mapping))
            .map_err(|e| DbError::decode(Self::describe().name(), e.to_string()))
    }
}

impl<T: JsonSchema + DeserializeOwned> Shape for T {
    fn describe() -> ShapeDescription {
        ShapeDescription::of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct UserOut {
        username: String,
        #[serde(rename = "email")]
        mail: Option<String>,
    }

    #[test]
    fn test_shape_fields_from_schema() {
        let shape = UserOut::describe();
        assert_eq!(shape.name(), "UserOut");
        assert!(shape.contains("username"));
        assert!(shape.contains("email"));
        assert!(!shape.contains("mail"));
        assert_eq!(shape.fields().len(), 2);
    }

    #[test]
    fn test_explicit_shape_dedupes() {
        let shape = ShapeDescription::new("s", ["a", "b", "a"]);
        assert_eq!(shape.fields(), ["a", "b"]);
    }

    #[test]
    fn test_from_mapping() {
        let mapping = json!({"username": "ann", "email": null})
            .as_object()
            .cloned()
            .unwrap();
        let user = UserOut::from_mapping(mapping).unwrap();
        assert_eq!(
            user,
            UserOut {
                username: "ann".into(),
                mail: None
            }
        );
    }

    #[test]
    fn test_from_mapping_reports_decode_error() {
        let mapping = json!({"email": "a@b"}).as_object().cloned().unwrap();
        let err = UserOut::from_mapping(mapping).unwrap_err();
        assert!(matches!(err, DbError::Decode { .. }));
    }
}
