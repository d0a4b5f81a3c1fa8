use chrono::{DateTime, Utc};

use super::table::{ExportOptions, InputTableOptions, LoadOptions};
use crate::client::TableInfo;
use crate::error::InputMappingResult;
use crate::state::InputTableStateList;

/// Table mapping after branch rewriting, with the table's metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenInputTableOptions {
    options: InputTableOptions,
    source_branch_id: String,
    table_info: TableInfo,
}

impl RewrittenInputTableOptions {
    pub fn new(
        options: InputTableOptions,
        source_branch_id: impl Into<String>,
        table_info: TableInfo,
    ) -> Self {
        Self {
            options,
            source_branch_id: source_branch_id.into(),
            table_info,
        }
    }

    pub fn options(&self) -> &InputTableOptions {
        &self.options
    }

    pub fn source(&self) -> &str {
        self.options.source()
    }

    /// Destination name, falling back to the source id
    pub fn destination(&self) -> &str {
        match self.options.destination() {
            "" => self.options.source(),
            destination => destination,
        }
    }

    pub fn source_branch_id(&self) -> &str {
        &self.source_branch_id
    }

    pub fn table_info(&self) -> &TableInfo {
        &self.table_info
    }

    /// Columns written to the manifest; empty means all table columns
    pub fn column_names(&self) -> &[String] {
        self.options.columns()
    }

    pub fn export_options(&self, states: &InputTableStateList) -> ExportOptions {
        ExportOptions {
            overwrite: self.options.overwrite(),
            source_branch_id: Some(self.source_branch_id.clone()),
            ..self.options.export_options(states)
        }
    }

    pub fn load_options(&self, now: DateTime<Utc>) -> InputMappingResult<LoadOptions> {
        Ok(LoadOptions {
            overwrite: self.options.overwrite(),
            ..self.options.load_options(now)?
        })
    }
}
