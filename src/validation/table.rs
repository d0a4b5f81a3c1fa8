//! Table mapping validation rules

use serde_json::{Map, Value};

use super::ValidationErrors;
use crate::options::table::{ColumnType, RawTableOptions, WhereOperator};

/// `days` and `changed_since` are mutually exclusive.
///
/// Checked on the raw dictionary because a present-but-null `changed_since`
/// still conflicts with a non-null `days`.
pub fn validate_time_window(raw: &Map<String, Value>, errors: &mut ValidationErrors) {
    let has_days = raw.get("days").is_some_and(|days| !days.is_null());
    if has_days && raw.contains_key("changed_since") {
        errors.push("Cannot set both parameters days and changed_since");
    }
}

/// Validate a decoded table mapping
pub(crate) fn validate_table_options(raw: &RawTableOptions, errors: &mut ValidationErrors) {
    match (&raw.source, &raw.source_search) {
        (None, None) => errors.push("Either \"source\" or \"source_search\" must be configured."),
        (Some(_), Some(_)) => {
            errors.push("Only one of \"source\" or \"source_search\" can be configured.")
        }
        _ => {}
    }
    if raw.source.as_deref().is_some_and(str::is_empty) {
        errors.push("The \"source\" field cannot contain an empty value.");
    }
    if let Some(search) = &raw.source_search {
        if search.key.is_empty() {
            errors.push("The \"source_search.key\" field cannot contain an empty value.");
        }
        if search.value.is_empty() {
            errors.push("The \"source_search.value\" field cannot contain an empty value.");
        }
    }

    if let Some(operator) = raw.where_operator.as_deref()
        && !operator.is_empty()
        && operator.parse::<WhereOperator>().is_err()
    {
        errors.push(format!("Invalid operator in where_operator \"{}\".", operator));
    }

    let has_where_column = raw
        .where_column
        .as_deref()
        .is_some_and(|column| !column.trim().is_empty());
    if has_where_column && raw.where_values.is_empty() {
        errors.push("When \"where_column\" is set, \"where_values\" must be provided.");
    }
    if !raw.where_values.is_empty() && !has_where_column {
        errors.push(
            "When \"where_values\" is set, non-empty string in \"where_column\" must be provided.",
        );
    }

    if let Err(message) = reconcile_columns(&raw.columns, &raw.column_types) {
        errors.push(message);
    }
}

/// Derive the effective column list and column types.
///
/// Either side may be derived from the other. When both are given they must
/// name the same set of columns, and the column types' order wins.
pub fn reconcile_columns(
    columns: &[String],
    column_types: &[ColumnType],
) -> Result<(Vec<String>, Vec<ColumnType>), String> {
    if column_types.is_empty() {
        let types = columns.iter().map(ColumnType::plain).collect();
        return Ok((columns.to_vec(), types));
    }

    let typed: Vec<String> = column_types.iter().map(|c| c.source.clone()).collect();
    if !columns.is_empty() {
        let surplus_columns: Vec<&String> = columns.iter().filter(|c| !typed.contains(c)).collect();
        if !surplus_columns.is_empty() {
            return Err(surplus_message("columns", &surplus_columns));
        }
        let surplus_types: Vec<&String> = typed.iter().filter(|c| !columns.contains(c)).collect();
        if !surplus_types.is_empty() {
            return Err(surplus_message("column_types", &surplus_types));
        }
    }
    Ok((typed, column_types.to_vec()))
}

fn surplus_message(field: &str, surplus: &[&String]) -> String {
    let names: Vec<String> = surplus.iter().map(|name| format!("\"{}\"", name)).collect();
    format!(
        "Both \"columns\" and \"column_types\" are specified, \"{}\" field contains surplus columns: {}.",
        field,
        names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(names: &[&str]) -> Vec<ColumnType> {
        names.iter().map(|n| ColumnType::plain(*n)).collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_columns_derived_from_types() {
        let (columns, column_types) = reconcile_columns(&[], &types(&["b", "a"])).unwrap();
        assert_eq!(columns, strings(&["b", "a"]));
        assert_eq!(column_types.len(), 2);
    }

    #[test]
    fn test_types_derived_from_columns() {
        let (columns, column_types) = reconcile_columns(&strings(&["a", "b"]), &[]).unwrap();
        assert_eq!(columns, strings(&["a", "b"]));
        assert_eq!(column_types, types(&["a", "b"]));
    }

    #[test]
    fn test_matching_sets_keep_type_order() {
        let (columns, _) =
            reconcile_columns(&strings(&["a", "b"]), &types(&["b", "a"])).unwrap();
        assert_eq!(columns, strings(&["b", "a"]));
    }

    #[test]
    fn test_surplus_on_columns_side() {
        let err = reconcile_columns(&strings(&["col1", "col2"]), &types(&["col2"])).unwrap_err();
        assert_eq!(
            err,
            "Both \"columns\" and \"column_types\" are specified, \"columns\" field contains surplus columns: \"col1\"."
        );
    }

    #[test]
    fn test_surplus_on_types_side() {
        let err = reconcile_columns(&strings(&["a", "b"]), &types(&["a", "c"])).unwrap_err();
        assert!(err.contains("\"columns\" field contains surplus columns: \"b\""));
        let err = reconcile_columns(&strings(&["a"]), &types(&["a", "c"])).unwrap_err();
        assert!(err.contains("\"column_types\" field contains surplus columns: \"c\""));
    }

    #[test]
    fn test_time_window_conflict_with_null() {
        let mut errors = ValidationErrors::new();
        let raw = serde_json::json!({"days": 3, "changed_since": null});
        validate_time_window(raw.as_object().unwrap(), &mut errors);
        assert_eq!(errors.errors(), ["Cannot set both parameters days and changed_since"]);

        let mut errors = ValidationErrors::new();
        let raw = serde_json::json!({"days": null, "changed_since": "-1 days"});
        validate_time_window(raw.as_object().unwrap(), &mut errors);
        assert!(errors.is_empty());
    }
}
