//! Validation of raw input mapping configuration
//!
//! Each options type has a plain validation function that collects every
//! violation it finds. Parsing reports them as a single configuration error.

pub mod file;
pub mod table;
pub mod time;

use serde::{Deserialize, Deserializer};

use crate::error::{InputMappingError, InputMappingResult};

/// Violations collected while validating one configuration entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Ok when nothing was collected, otherwise a configuration error
    /// carrying every message in collection order
    pub fn into_result(self) -> InputMappingResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(InputMappingError::Configuration(self.errors.join("\n")))
        }
    }
}

/// Map a serde failure on a raw configuration into a configuration error
pub(crate) fn invalid_configuration(path: &str, err: serde_json::Error) -> InputMappingError {
    InputMappingError::configuration(format!(
        "Invalid configuration for path \"{}\": {}",
        path, err
    ))
}

fn scalar_to_string<E: serde::de::Error>(value: serde_json::Value) -> Result<String, E> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(E::custom(format!("expected a scalar value, got {}", other))),
    }
}

/// Accept a string, number or boolean and keep it as a string
pub(crate) fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value).map(Some),
    }
}

/// Accept a list of scalars and keep them as strings
pub(crate) fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Vec<serde_json::Value>>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(values) => values.into_iter().map(scalar_to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "optional_scalar")]
        value: Option<String>,
        #[serde(default, deserialize_with = "scalar_list")]
        values: Vec<String>,
    }

    #[test]
    fn test_scalars_become_strings() {
        let sample: Sample =
            serde_json::from_value(serde_json::json!({"value": 12, "values": ["a", 1, true]}))
                .unwrap();
        assert_eq!(sample.value.as_deref(), Some("12"));
        assert_eq!(sample.values, vec!["a", "1", "true"]);
    }

    #[test]
    fn test_null_scalar_is_none() {
        let sample: Sample =
            serde_json::from_value(serde_json::json!({"value": null, "values": null})).unwrap();
        assert!(sample.value.is_none());
        assert!(sample.values.is_empty());
    }

    #[test]
    fn test_nested_values_rejected() {
        let result: Result<Sample, _> =
            serde_json::from_value(serde_json::json!({"values": [["nested"]]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_errors_join_in_order() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());
        errors.push("first");
        errors.push("second");
        assert_eq!(errors.errors().len(), 2);
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.to_string(), "first\nsecond");
    }
}
