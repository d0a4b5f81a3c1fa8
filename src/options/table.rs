//! Table mapping options
//!
//! An [`InputTableOptions`] is built once from a raw configuration
//! dictionary and is immutable afterwards, except for the source rewrite
//! performed by the definition resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InputMappingError, InputMappingResult};
use crate::state::InputTableStateList;
use crate::validation::{self, ValidationErrors, table as rules, time};

/// `changed_since` value that resolves against the previous run's state
pub const ADAPTIVE_INPUT_MAPPING_VALUE: &str = "adaptive";

/// Comparison used by a where filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhereOperator {
    #[default]
    Eq,
    Ne,
}

impl std::str::FromStr for WhereOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(WhereOperator::Eq),
            "ne" => Ok(WhereOperator::Ne),
            _ => Err(format!("Invalid operator in where_operator \"{}\".", s)),
        }
    }
}

impl std::fmt::Display for WhereOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhereOperator::Eq => write!(f, "eq"),
            WhereOperator::Ne => write!(f, "ne"),
        }
    }
}

/// Metadata search used instead of a literal source id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSearch {
    pub key: String,
    pub value: String,
}

/// Column selection with optional typing for workspace loads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnType {
    pub source: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(
        default,
        deserialize_with = "validation::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_empty_values_to_null: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl ColumnType {
    /// Column selected by name only
    pub fn plain(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// True when the entry only names the column
    pub fn is_plain(&self) -> bool {
        self.data_type.is_none()
            && self.destination.is_none()
            && self.length.is_none()
            && self.nullable.is_none()
            && self.convert_empty_values_to_null.is_none()
            && self.compression.is_none()
    }
}

/// Column definition as sent with a workspace load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadColumn {
    pub source: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_empty_values_to_null: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl From<&ColumnType> for LoadColumn {
    fn from(column: &ColumnType) -> Self {
        Self {
            source: column.source.clone(),
            data_type: column.data_type.clone(),
            destination: column.destination.clone(),
            length: column.length.clone(),
            nullable: column.nullable,
            convert_empty_values_to_null: column.convert_empty_values_to_null,
            compression: column.compression.clone(),
        }
    }
}

impl LoadColumn {
    /// Column loaded as is, without renaming or typing
    pub fn is_plain(&self) -> bool {
        self.data_type.is_none()
            && self.destination.as_deref().is_none_or(|d| d == self.source)
            && self.length.is_none()
            && self.nullable.is_none()
            && self.convert_empty_values_to_null.is_none()
            && self.compression.is_none()
    }
}

/// Options for exporting a table into files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_column: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_operator: Option<WhereOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_branch_id: Option<String>,
}

/// Options for loading a table into a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<LoadColumn>,
    /// Only rows changed in the last `seconds`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_column: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_operator: Option<WhereOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
}

impl LoadOptions {
    /// Row filters that make a load differ from the source table
    pub fn has_row_filters(&self) -> bool {
        self.seconds.is_some() || self.where_column.is_some() || self.rows.is_some()
    }
}

/// Raw table mapping as found in job configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawTableOptions {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "validation::optional_scalar")]
    pub source_branch_id: Option<String>,
    #[serde(default)]
    pub source_search: Option<SourceSearch>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub changed_since: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub column_types: Vec<ColumnType>,
    #[serde(default)]
    pub where_column: Option<String>,
    #[serde(default, deserialize_with = "validation::scalar_list")]
    pub where_values: Vec<String>,
    #[serde(default)]
    pub where_operator: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub use_view: bool,
    #[serde(default)]
    pub keep_internal_timestamp_column: Option<bool>,
}

/// One validated table mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputTableOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_branch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_search: Option<SourceSearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed_since: Option<String>,
    columns: Vec<String>,
    column_types: Vec<ColumnType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    where_column: Option<String>,
    where_values: Vec<String>,
    where_operator: WhereOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    overwrite: bool,
    use_view: bool,
    keep_internal_timestamp_column: bool,
}

impl InputTableOptions {
    /// Parse and validate a raw table mapping
    pub fn parse(config: &Value) -> InputMappingResult<Self> {
        let map = config.as_object().ok_or_else(|| {
            InputMappingError::configuration(
                "Invalid configuration for path \"table\": expected a dictionary.",
            )
        })?;

        let mut errors = ValidationErrors::new();
        rules::validate_time_window(map, &mut errors);
        errors.into_result()?;

        let raw: RawTableOptions = serde_json::from_value(config.clone())
            .map_err(|e| validation::invalid_configuration("table", e))?;

        let mut errors = ValidationErrors::new();
        rules::validate_table_options(&raw, &mut errors);
        errors.into_result()?;

        let (columns, column_types) = rules::reconcile_columns(&raw.columns, &raw.column_types)
            .map_err(InputMappingError::Configuration)?;
        let where_operator = match raw.where_operator.as_deref() {
            None | Some("") => WhereOperator::Eq,
            Some(operator) => operator.parse().map_err(InputMappingError::Configuration)?,
        };

        Ok(Self {
            source: raw.source,
            source_branch_id: raw.source_branch_id,
            source_search: raw.source_search,
            destination: raw.destination.filter(|d| !d.is_empty()),
            days: raw.days,
            changed_since: raw.changed_since.filter(|c| !c.is_empty()),
            columns,
            column_types,
            where_column: raw.where_column.filter(|c| !c.trim().is_empty()),
            where_values: raw.where_values,
            where_operator,
            limit: raw.limit,
            overwrite: raw.overwrite,
            use_view: raw.use_view,
            keep_internal_timestamp_column: raw.keep_internal_timestamp_column.unwrap_or(true),
        })
    }

    /// Normalized configuration with defaults filled in.
    ///
    /// Parsing the definition again yields the same definition.
    pub fn definition(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Source table id; empty until a source search is resolved
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or_default()
    }

    pub fn source_search(&self) -> Option<&SourceSearch> {
        self.source_search.as_ref()
    }

    pub fn source_branch_id(&self) -> Option<&str> {
        self.source_branch_id.as_deref()
    }

    /// Destination name; empty when the mapping does not set one
    pub fn destination(&self) -> &str {
        self.destination.as_deref().unwrap_or_default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn days(&self) -> Option<u32> {
        self.days
    }

    pub fn changed_since(&self) -> Option<&str> {
        self.changed_since.as_deref()
    }

    pub fn is_adaptive(&self) -> bool {
        self.changed_since.as_deref() == Some(ADAPTIVE_INPUT_MAPPING_VALUE)
    }

    pub fn where_column(&self) -> Option<&str> {
        self.where_column.as_deref()
    }

    pub fn where_values(&self) -> &[String] {
        &self.where_values
    }

    pub fn where_operator(&self) -> WhereOperator {
        self.where_operator
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn use_view(&self) -> bool {
        self.use_view
    }

    pub fn keep_internal_timestamp_column(&self) -> bool {
        self.keep_internal_timestamp_column
    }

    /// Replace the source with a concrete table id, dropping any source search
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.source_search = None;
        self
    }

    fn has_where_filter(&self) -> bool {
        self.where_column.is_some() && !self.where_values.is_empty()
    }

    /// Options for a plain export.
    ///
    /// An adaptive mapping with no recorded state exports the whole table.
    pub fn export_options(&self, states: &InputTableStateList) -> ExportOptions {
        let mut options = ExportOptions {
            columns: self.columns.clone(),
            limit: self.limit,
            ..Default::default()
        };
        if let Some(days) = self.days.filter(|d| *d > 0) {
            options.changed_since = Some(format!("-{} days", days));
        }
        if let Some(changed_since) = &self.changed_since {
            if self.is_adaptive() {
                if let Ok(state) = states.get_table(self.source()) {
                    options.changed_since = Some(state.last_import_date.clone());
                }
            } else {
                options.changed_since = Some(changed_since.clone());
            }
        }
        if self.has_where_filter() {
            options.where_column = self.where_column.clone();
            options.where_values = self.where_values.clone();
            options.where_operator = Some(self.where_operator);
        }
        options
    }

    /// Options for a workspace load, with `changed_since` turned into a
    /// number of seconds before `now`
    pub fn load_options(&self, now: DateTime<Utc>) -> InputMappingResult<LoadOptions> {
        let mut options = LoadOptions {
            rows: self.limit,
            ..Default::default()
        };
        if !self.columns.is_empty() {
            options.columns = self.column_types.iter().map(LoadColumn::from).collect();
        }
        if self.days.is_some_and(|d| d > 0) {
            return Err(InputMappingError::configuration(
                "Days option is not supported on workspace, use changed_since instead.",
            ));
        }
        if let Some(changed_since) = &self.changed_since {
            if self.is_adaptive() {
                return Err(InputMappingError::configuration(
                    "Adaptive input mapping is not supported on input mapping to workspace.",
                ));
            }
            let since = time::parse_timestamp(changed_since, now).ok_or_else(|| {
                InputMappingError::configuration(format!(
                    "Error parsing changed_since expression \"{}\".",
                    changed_since
                ))
            })?;
            options.seconds = Some((now - since).num_seconds());
        }
        if self.has_where_filter() {
            options.where_column = self.where_column.clone();
            options.where_values = self.where_values.clone();
            options.where_operator = Some(self.where_operator);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InputTableStateList;
    use chrono::TimeZone;
    use serde_json::json;

    fn parse(config: Value) -> InputMappingResult<InputTableOptions> {
        InputTableOptions::parse(&config)
    }

    fn parse_err(config: Value) -> String {
        parse(config).unwrap_err().to_string()
    }

    #[test]
    fn test_definition_defaults() {
        let options = parse(json!({"source": "test"})).unwrap();
        assert_eq!(
            options.definition(),
            json!({
                "source": "test",
                "columns": [],
                "column_types": [],
                "where_values": [],
                "where_operator": "eq",
                "overwrite": false,
                "use_view": false,
                "keep_internal_timestamp_column": true,
            })
        );
    }

    #[test]
    fn test_definition_is_idempotent() {
        let options = parse(json!({
            "source": "in.c-main.test",
            "destination": "test.csv",
            "columns": ["Id", "Name"],
            "column_types": [{"source": "Name", "type": "VARCHAR"}, {"source": "Id", "length": 10}],
            "where_column": "Id",
            "where_values": [1, "2"],
            "where_operator": "ne",
            "changed_since": "-1 days",
            "limit": 10,
            "overwrite": true,
        }))
        .unwrap();
        let definition = options.definition();
        let reparsed = InputTableOptions::parse(&definition).unwrap();
        assert_eq!(reparsed, options);
        assert_eq!(reparsed.definition(), definition);
        assert_eq!(options.columns(), ["Name", "Id"]);
        assert_eq!(options.where_values(), ["1", "2"]);
    }

    #[test]
    fn test_columns_derive_column_types() {
        let options = parse(json!({"source": "test", "columns": ["a"]})).unwrap();
        assert_eq!(options.definition()["column_types"], json!([{"source": "a"}]));
    }

    #[test]
    fn test_source_or_search_required() {
        assert_eq!(
            parse_err(json!({"destination": "x"})),
            "Either \"source\" or \"source_search\" must be configured."
        );
        assert_eq!(
            parse_err(json!({"source": "a", "source_search": {"key": "k", "value": "v"}})),
            "Only one of \"source\" or \"source_search\" can be configured."
        );
    }

    #[test]
    fn test_empty_source_rejected() {
        assert!(
            parse_err(json!({"source": ""}))
                .contains("\"source\" field cannot contain an empty value")
        );
    }

    #[test]
    fn test_days_and_changed_since() {
        for changed_since in [json!("-1 days"), json!("adaptive"), Value::Null] {
            for days in [0, 1, 30] {
                assert_eq!(
                    parse_err(json!({"source": "t", "days": days, "changed_since": changed_since})),
                    "Cannot set both parameters days and changed_since"
                );
            }
        }
    }

    #[test]
    fn test_where_operator() {
        let options = parse(json!({"source": "t", "where_operator": ""})).unwrap();
        assert_eq!(options.where_operator(), WhereOperator::Eq);
        let options = parse(json!({"source": "t", "where_operator": null})).unwrap();
        assert_eq!(options.where_operator(), WhereOperator::Eq);
        assert_eq!(
            parse_err(json!({"source": "t", "where_operator": "abc"})),
            "Invalid operator in where_operator \"abc\"."
        );
    }

    #[test]
    fn test_where_column_and_values() {
        assert_eq!(
            parse_err(json!({"source": "t", "where_column": "c"})),
            "When \"where_column\" is set, \"where_values\" must be provided."
        );
        assert_eq!(
            parse_err(json!({"source": "t", "where_values": ["a"]})),
            "When \"where_values\" is set, non-empty string in \"where_column\" must be provided."
        );
        assert_eq!(
            parse_err(json!({"source": "t", "where_column": " ", "where_values": ["a"]})),
            "When \"where_values\" is set, non-empty string in \"where_column\" must be provided."
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_err(json!({"source": "t", "foo": "bar"}));
        assert!(err.starts_with("Invalid configuration for path \"table\""));
        assert!(err.contains("foo"));
    }

    #[test]
    fn test_export_options_days() {
        let options = parse(json!({"source": "t", "days": 3, "columns": ["a"]})).unwrap();
        let export = options.export_options(&InputTableStateList::default());
        assert_eq!(export.changed_since.as_deref(), Some("-3 days"));
        assert_eq!(export.columns, ["a"]);
        assert!(export.where_column.is_none());
    }

    #[test]
    fn test_export_options_adaptive() {
        let options =
            parse(json!({"source": "in.c-main.test", "changed_since": "adaptive"})).unwrap();
        let empty = InputTableStateList::default();
        assert!(options.export_options(&empty).changed_since.is_none());

        let states = InputTableStateList::from_value(&json!([
            {"source": "in.c-main.test", "lastImportDate": "2024-01-02T03:04:05+0000"}
        ]))
        .unwrap();
        assert_eq!(
            options.export_options(&states).changed_since.as_deref(),
            Some("2024-01-02T03:04:05+0000")
        );
    }

    #[test]
    fn test_export_options_serialization() {
        let options = parse(json!({
            "source": "t",
            "where_column": "c",
            "where_values": ["v"],
            "limit": 5,
            "changed_since": "2024-01-01"
        }))
        .unwrap();
        let export = options.export_options(&InputTableStateList::default());
        assert_eq!(
            serde_json::to_value(&export).unwrap(),
            json!({
                "changedSince": "2024-01-01",
                "whereColumn": "c",
                "whereValues": ["v"],
                "whereOperator": "eq",
                "limit": 5,
                "overwrite": false,
            })
        );
    }

    #[test]
    fn test_load_options() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let options = parse(json!({
            "source": "t",
            "column_types": [{"source": "a", "type": "INT", "convert_empty_values_to_null": true}],
            "changed_since": "-2 hours",
            "limit": 7,
        }))
        .unwrap();
        let load = options.load_options(now).unwrap();
        assert_eq!(load.seconds, Some(7200));
        assert_eq!(load.rows, Some(7));
        assert_eq!(
            serde_json::to_value(&load.columns).unwrap(),
            json!([{"source": "a", "type": "INT", "convertEmptyValuesToNull": true}])
        );
        assert!(load.has_row_filters());
    }

    #[test]
    fn test_load_options_rejects_days_and_adaptive() {
        let now = Utc::now();
        let days = parse(json!({"source": "t", "days": 2})).unwrap();
        assert_eq!(
            days.load_options(now).unwrap_err().to_string(),
            "Days option is not supported on workspace, use changed_since instead."
        );
        let adaptive = parse(json!({"source": "t", "changed_since": "adaptive"})).unwrap();
        assert_eq!(
            adaptive.load_options(now).unwrap_err().to_string(),
            "Adaptive input mapping is not supported on input mapping to workspace."
        );
        let invalid = parse(json!({"source": "t", "changed_since": "whenever"})).unwrap();
        assert_eq!(
            invalid.load_options(now).unwrap_err().to_string(),
            "Error parsing changed_since expression \"whenever\"."
        );
    }

    #[test]
    fn test_with_source_clears_search() {
        let options = parse(json!({"source_search": {"key": "k", "value": "v"}})).unwrap();
        assert_eq!(options.source(), "");
        let resolved = options.with_source("in.c-main.table");
        assert_eq!(resolved.source(), "in.c-main.table");
        assert!(resolved.source_search().is_none());
    }
}
