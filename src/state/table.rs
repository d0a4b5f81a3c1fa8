use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InputMappingError, InputMappingResult};

/// Last import date of one source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputTableState {
    pub source: String,
    pub last_import_date: String,
}

/// Table watermarks in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputTableStateList {
    tables: Vec<InputTableState>,
}

impl InputTableStateList {
    pub fn new(tables: Vec<InputTableState>) -> Self {
        Self { tables }
    }

    /// Load the list from a serialized state, e.g.
    /// `[{"source": "in.c-main.test", "lastImportDate": "..."}]`
    pub fn from_value(value: &Value) -> InputMappingResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone()).map_err(|e| {
            InputMappingError::configuration(format!("Invalid table state: {}", e))
        })
    }

    pub fn get_table(&self, source: &str) -> InputMappingResult<&InputTableState> {
        self.tables
            .iter()
            .find(|state| state.source == source)
            .ok_or_else(|| {
                InputMappingError::NotFound(format!("State for table \"{}\" not found.", source))
            })
    }

    pub fn push(&mut self, state: InputTableState) {
        self.tables.push(state);
    }

    pub fn tables(&self) -> &[InputTableState] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
