//! File mapping validation rules

use chrono::Utc;

use super::{ValidationErrors, time};
use crate::options::file::{ADAPTIVE_INPUT_MAPPING_VALUE, RawFileOptions};

fn check_tag_names<'a>(
    field: &str,
    names: impl IntoIterator<Item = &'a str>,
    errors: &mut ValidationErrors,
) {
    if names.into_iter().any(str::is_empty) {
        errors.push(format!(
            "Tag names cannot be empty, found an empty value in \"{}\".",
            field
        ));
    }
}

/// Validate a decoded file mapping.
///
/// Empty `tags`, `source.tags` and `processed_tags` lists and an empty
/// `query` count as not set.
pub(crate) fn validate_file_options(raw: &RawFileOptions, errors: &mut ValidationErrors) {
    let tags = raw.tags.as_deref().unwrap_or_default();
    let source_tags = raw.source.as_ref().map(|s| s.tags.as_slice()).unwrap_or_default();
    check_tag_names("tags", tags.iter().map(String::as_str), errors);
    check_tag_names("source.tags", source_tags.iter().map(|t| t.name.as_str()), errors);
    check_tag_names(
        "processed_tags",
        raw.processed_tags.iter().flatten().map(String::as_str),
        errors,
    );

    let has_query = raw.query.as_deref().is_some_and(|q| !q.is_empty());
    let has_file_ids = raw.file_ids.as_ref().is_some_and(|ids| !ids.is_empty());
    if tags.is_empty() && source_tags.is_empty() && !has_query && !has_file_ids {
        errors.push(
            "At least one of \"tags\", \"source.tags\", \"query\" or \"file_ids\" parameters must be defined.",
        );
    }
    if !tags.is_empty() && !source_tags.is_empty() {
        errors.push("Both \"tags\" and \"source.tags\" cannot be defined.");
    }

    if let Some(changed_since) = raw.changed_since.as_deref().filter(|c| !c.is_empty()) {
        if has_query {
            errors.push("The changed_since parameter is not supported for query configurations");
        } else if changed_since != ADAPTIVE_INPUT_MAPPING_VALUE
            && time::parse_timestamp(changed_since, Utc::now()).is_none()
        {
            errors.push(
                "The value provided for changed_since could not be converted to a timestamp",
            );
        }
    }
}
