use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InputMappingError, InputMappingResult};
use crate::options::file::TagMatch;

/// One tag of a file state key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileTag {
    pub name: String,
    /// Serialized only for excluded tags
    #[serde(
        rename = "match",
        default,
        skip_serializing_if = "TagMatch::is_include"
    )]
    pub match_type: TagMatch,
}

impl FileTag {
    pub fn include(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_type: TagMatch::Include,
        }
    }

    pub fn exclude(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_type: TagMatch::Exclude,
        }
    }
}

/// Sort and de-duplicate tags so equal tag sets compare equal
pub fn normalize_tags(mut tags: Vec<FileTag>) -> Vec<FileTag> {
    tags.sort();
    tags.dedup();
    tags
}

/// Biggest file id seen for one tag set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFileState {
    pub tags: Vec<FileTag>,
    pub last_import_id: u64,
}

/// File watermarks in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InputFileStateList {
    files: Vec<InputFileState>,
}

impl InputFileStateList {
    pub fn new(files: Vec<InputFileState>) -> Self {
        let files = files
            .into_iter()
            .map(|state| InputFileState {
                tags: normalize_tags(state.tags),
                last_import_id: state.last_import_id,
            })
            .collect();
        Self { files }
    }

    /// Load the list from a serialized state, e.g.
    /// `[{"tags": [{"name": "tag"}], "lastImportId": 12}]`
    pub fn from_value(value: &Value) -> InputMappingResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let files: Vec<InputFileState> = serde_json::from_value(value.clone()).map_err(|e| {
            InputMappingError::configuration(format!("Invalid file state: {}", e))
        })?;
        Ok(Self::new(files))
    }

    pub fn get_file(&self, tags: &[FileTag]) -> InputMappingResult<&InputFileState> {
        let key = normalize_tags(tags.to_vec());
        self.files
            .iter()
            .find(|state| state.tags == key)
            .ok_or_else(|| {
                let names: Vec<&str> = key.iter().map(|t| t.name.as_str()).collect();
                InputMappingError::NotFound(format!(
                    "State for files defined by \"{}\" not found.",
                    names.join(", ")
                ))
            })
    }

    /// Record `last_import_id` for a tag set.
    ///
    /// An existing entry is replaced only by a bigger id.
    pub fn record(&mut self, tags: &[FileTag], last_import_id: u64) {
        let key = normalize_tags(tags.to_vec());
        match self.files.iter_mut().find(|state| state.tags == key) {
            Some(existing) => {
                if last_import_id > existing.last_import_id {
                    existing.last_import_id = last_import_id;
                }
            }
            None => self.files.push(InputFileState {
                tags: key,
                last_import_id,
            }),
        }
    }

    pub fn files(&self) -> &[InputFileState] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_file_ignores_tag_order() {
        let states = InputFileStateList::from_value(&json!([
            {"tags": [{"name": "b"}, {"name": "a"}], "lastImportId": 5}
        ]))
        .unwrap();
        let found = states
            .get_file(&[FileTag::include("a"), FileTag::include("b"), FileTag::include("a")])
            .unwrap();
        assert_eq!(found.last_import_id, 5);
    }

    #[test]
    fn test_get_missing_file() {
        let err = InputFileStateList::default()
            .get_file(&[FileTag::include("tag")])
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "State for files defined by \"tag\" not found.");
    }

    #[test]
    fn test_exclude_is_part_of_key() {
        let mut states = InputFileStateList::default();
        states.record(&[FileTag::include("a")], 1);
        assert!(states.get_file(&[FileTag::exclude("a")]).is_err());
    }

    #[test]
    fn test_record_never_regresses() {
        let mut states = InputFileStateList::default();
        states.record(&[FileTag::include("t")], 10);
        states.record(&[FileTag::include("t")], 4);
        states.record(&[FileTag::include("t")], 10);
        assert_eq!(states.len(), 1);
        assert_eq!(states.get_file(&[FileTag::include("t")]).unwrap().last_import_id, 10);
        states.record(&[FileTag::include("t")], 12);
        assert_eq!(states.get_file(&[FileTag::include("t")]).unwrap().last_import_id, 12);
    }

    #[test]
    fn test_serialized_shape() {
        let mut states = InputFileStateList::default();
        states.record(&[FileTag::include("x"), FileTag::exclude("y")], 3);
        assert_eq!(
            states.to_value(),
            json!([{"tags": [{"name": "x"}, {"name": "y", "match": "exclude"}], "lastImportId": 3}])
        );
    }
}
