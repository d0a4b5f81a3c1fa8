//! File mapping options

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ListFilesOptions;
use crate::error::{InputMappingError, InputMappingResult};
use crate::run_id;
use crate::state::{FileTag, InputFileStateList};
use crate::validation::{self, ValidationErrors, file as rules, time};

pub use super::table::ADAPTIVE_INPUT_MAPPING_VALUE;

/// Whether a source tag must be present on or absent from a file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    #[default]
    Include,
    Exclude,
}

impl TagMatch {
    pub fn is_include(&self) -> bool {
        *self == TagMatch::Include
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceTag {
    pub name: String,
    #[serde(rename = "match", default)]
    pub match_type: TagMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSource {
    #[serde(default)]
    pub tags: Vec<SourceTag>,
}

/// Raw file mapping as found in job configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawFileOptions {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub source: Option<FileSource>,
    #[serde(default)]
    pub processed_tags: Option<Vec<String>>,
    #[serde(default)]
    pub filter_by_run_id: bool,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub changed_since: Option<String>,
    #[serde(default)]
    pub file_ids: Option<Vec<u64>>,
}

/// One validated file mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFileOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<FileSource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processed_tags: Vec<String>,
    filter_by_run_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    overwrite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed_since: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    file_ids: Vec<u64>,
    /// State key kept from before tag rewriting
    #[serde(skip)]
    state_tags: Option<Vec<FileTag>>,
}

impl InputFileOptions {
    /// Parse and validate a raw file mapping
    pub fn parse(config: &Value) -> InputMappingResult<Self> {
        let raw: RawFileOptions = serde_json::from_value(config.clone())
            .map_err(|e| validation::invalid_configuration("file", e))?;

        let mut errors = ValidationErrors::new();
        rules::validate_file_options(&raw, &mut errors);
        errors.into_result()?;

        Ok(Self {
            tags: raw.tags.unwrap_or_default(),
            query: raw.query.filter(|q| !q.is_empty()),
            source: raw.source.filter(|s| !s.tags.is_empty()),
            processed_tags: raw.processed_tags.unwrap_or_default(),
            filter_by_run_id: raw.filter_by_run_id,
            limit: raw.limit,
            overwrite: raw.overwrite.unwrap_or(true),
            changed_since: raw.changed_since.filter(|c| !c.is_empty()),
            file_ids: raw.file_ids.unwrap_or_default(),
            state_tags: None,
        })
    }

    /// Normalized configuration with defaults filled in
    pub fn definition(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn source_tags(&self) -> &[SourceTag] {
        self.source.as_ref().map(|s| s.tags.as_slice()).unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn processed_tags(&self) -> &[String] {
        &self.processed_tags
    }

    pub fn filter_by_run_id(&self) -> bool {
        self.filter_by_run_id
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn changed_since(&self) -> Option<&str> {
        self.changed_since.as_deref()
    }

    pub fn is_adaptive(&self) -> bool {
        self.changed_since.as_deref() == Some(ADAPTIVE_INPUT_MAPPING_VALUE)
    }

    pub fn file_ids(&self) -> &[u64] {
        &self.file_ids
    }

    /// Tag set identifying this mapping in the file state
    pub fn state_key(&self) -> Vec<FileTag> {
        if let Some(tags) = &self.state_tags {
            return tags.clone();
        }
        let tags = if self.source_tags().is_empty() {
            self.tags.iter().map(FileTag::include).collect()
        } else {
            self.source_tags()
                .iter()
                .map(|tag| FileTag {
                    name: tag.name.clone(),
                    match_type: tag.match_type,
                })
                .collect()
        };
        crate::state::file::normalize_tags(tags)
    }

    /// Names of the tags a file must carry
    pub fn included_tags(&self) -> Vec<String> {
        if self.source_tags().is_empty() {
            self.tags.clone()
        } else {
            self.source_tags()
                .iter()
                .filter(|t| t.match_type.is_include())
                .map(|t| t.name.clone())
                .collect()
        }
    }

    fn excluded_tags(&self) -> Vec<String> {
        self.source_tags()
            .iter()
            .filter(|t| !t.match_type.is_include())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Same mapping selecting `<prefix><tag>` instead of each included tag.
    ///
    /// The state key stays the one of the unprefixed mapping.
    pub fn with_tag_prefix(&self, prefix: &str) -> Self {
        let mut rewritten = self.clone();
        rewritten.state_tags = Some(self.state_key());
        rewritten.tags = self.tags.iter().map(|t| format!("{}{}", prefix, t)).collect();
        if let Some(source) = rewritten.source.as_mut() {
            for tag in source.tags.iter_mut().filter(|t| t.match_type.is_include()) {
                tag.name = format!("{}{}", prefix, tag.name);
            }
        }
        rewritten
    }

    /// Build the remote listing query.
    ///
    /// Adaptive mappings continue after the recorded file id; without a
    /// recorded state every matching file is listed.
    pub fn list_options(
        &self,
        states: &InputFileStateList,
        run_id: Option<&str>,
        default_limit: u32,
        now: DateTime<Utc>,
    ) -> InputMappingResult<ListFilesOptions> {
        let mut options = ListFilesOptions {
            tags: self.included_tags(),
            excluded_tags: self.excluded_tags(),
            query: self.query.clone(),
            file_ids: self.file_ids.clone(),
            limit: Some(self.limit.unwrap_or(default_limit)),
            ..Default::default()
        };
        if self.filter_by_run_id {
            options.run_id = run_id
                .map(run_id::root_run_id)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
        }
        if let Some(changed_since) = &self.changed_since {
            if self.is_adaptive() {
                if let Ok(state) = states.get_file(&self.state_key()) {
                    options.since_id = Some(state.last_import_id);
                }
            } else {
                let since = time::parse_timestamp(changed_since, now).ok_or_else(|| {
                    InputMappingError::configuration(
                        "The value provided for changed_since could not be converted to a timestamp",
                    )
                })?;
                options.created_since = Some(since);
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn parse(config: Value) -> InputFileOptions {
        InputFileOptions::parse(&config).unwrap()
    }

    #[test]
    fn test_definition_keeps_configuration() {
        let config = json!({
            "tags": ["tag1", "tag2"],
            "query": "esquery",
            "processed_tags": ["tag3"],
            "filter_by_run_id": true,
            "limit": 1000,
            "overwrite": false,
        });
        assert_eq!(parse(config.clone()).definition(), config);
    }

    #[test]
    fn test_empty_lists_and_query_removed() {
        let options = parse(json!({"tags": [], "query": "q", "processed_tags": []}));
        assert_eq!(
            options.definition(),
            json!({"query": "q", "filter_by_run_id": false, "overwrite": true})
        );
        let options = parse(json!({"tags": ["a"], "query": ""}));
        assert!(options.query().is_none());
    }

    #[test]
    fn test_source_tags_default_to_include() {
        let options = parse(json!({
            "source": {"tags": [{"name": "a"}, {"name": "b", "match": "exclude"}]}
        }));
        assert_eq!(
            options.definition()["source"],
            json!({"tags": [{"name": "a", "match": "include"}, {"name": "b", "match": "exclude"}]})
        );
        assert_eq!(options.included_tags(), ["a"]);
        assert_eq!(options.state_key(), vec![FileTag::include("a"), FileTag::exclude("b")]);
    }

    #[test]
    fn test_both_tag_forms_rejected() {
        let err = InputFileOptions::parse(&json!({
            "tags": ["tag1"],
            "source": {"tags": [{"name": "tag1"}, {"name": "tag2"}]}
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "Both \"tags\" and \"source.tags\" cannot be defined.");
    }

    #[test]
    fn test_state_key_normalized() {
        let options = parse(json!({"tags": ["b", "a", "b"]}));
        assert_eq!(options.state_key(), vec![FileTag::include("a"), FileTag::include("b")]);
    }

    #[test]
    fn test_list_options_adaptive() {
        let options = parse(json!({"tags": ["t"], "changed_since": "adaptive"}));
        let now = Utc::now();
        let listed = options.list_options(&InputFileStateList::default(), None, 100, now).unwrap();
        assert_eq!(listed.since_id, None);
        assert_eq!(listed.limit, Some(100));

        let mut states = InputFileStateList::default();
        states.record(&[FileTag::include("t")], 42);
        let listed = options.list_options(&states, None, 100, now).unwrap();
        assert_eq!(listed.since_id, Some(42));
    }

    #[test]
    fn test_list_options_run_id_and_dates() {
        let options = parse(json!({
            "source": {"tags": [{"name": "a"}, {"name": "skip", "match": "exclude"}]},
            "filter_by_run_id": true,
            "changed_since": "-1 days",
            "limit": 5,
        }));
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let listed = options
            .list_options(&InputFileStateList::default(), Some("123.456.789"), 100, now)
            .unwrap();
        assert_eq!(listed.run_id.as_deref(), Some("123"));
        assert_eq!(listed.tags, ["a"]);
        assert_eq!(listed.excluded_tags, ["skip"]);
        assert_eq!(listed.limit, Some(5));
        assert_eq!(listed.created_since, Some(Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_tag_prefix() {
        let options = parse(json!({
            "source": {"tags": [{"name": "a"}, {"name": "b", "match": "exclude"}]}
        }));
        let rewritten = options.with_tag_prefix("123-");
        assert_eq!(rewritten.included_tags(), ["123-a"]);
        assert_eq!(rewritten.source_tags()[1].name, "b");
        assert_eq!(rewritten.state_key(), options.state_key());
        assert_eq!(rewritten.definition()["source"]["tags"][0]["name"], "123-a");
    }
}
