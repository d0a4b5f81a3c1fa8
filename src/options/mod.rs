//! Input mapping options
//!
//! Raw configuration dictionaries are parsed into validated option objects:
//! - [`InputTableOptions`] per table mapping, collected in [`InputTableOptionsList`]
//! - [`InputFileOptions`] per file mapping
//! - [`RewrittenInputTableOptions`] after branch rewriting, carrying table metadata
//! - [`ReaderOptions`] for reader-wide switches

pub mod file;
pub mod table;

mod rewritten;

pub use file::{FileSource, InputFileOptions, SourceTag, TagMatch};
pub use rewritten::RewrittenInputTableOptions;
pub use table::{
    ColumnType, ExportOptions, InputTableOptions, LoadColumn, LoadOptions, SourceSearch,
    WhereOperator,
};

use serde_json::Value;

use crate::error::InputMappingResult;

/// Table mappings in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTableOptionsList {
    tables: Vec<InputTableOptions>,
}

impl InputTableOptionsList {
    pub fn new(tables: Vec<InputTableOptions>) -> Self {
        Self { tables }
    }

    /// Parse every raw mapping, failing on the first invalid one
    pub fn parse(configurations: &[Value]) -> InputMappingResult<Self> {
        let tables = configurations
            .iter()
            .map(InputTableOptions::parse)
            .collect::<InputMappingResult<Vec<_>>>()?;
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[InputTableOptions] {
        &self.tables
    }

    pub fn into_tables(self) -> Vec<InputTableOptions> {
        self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Parse raw file mappings, failing on the first invalid one
pub fn parse_file_options(configurations: &[Value]) -> InputMappingResult<Vec<InputFileOptions>> {
    configurations.iter().map(InputFileOptions::parse).collect()
}

/// Reader-wide switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Read production inputs even when running on a development branch
    pub dev_inputs_disabled: bool,
    /// Keep existing workspace tables; when false the first workspace job clears it
    pub preserve_workspace: bool,
    /// Development branches have their own storage
    pub has_protected_default_branch: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            dev_inputs_disabled: false,
            preserve_workspace: true,
            has_protected_default_branch: false,
        }
    }
}

impl ReaderOptions {
    pub fn new(dev_inputs_disabled: bool) -> Self {
        Self {
            dev_inputs_disabled,
            ..Default::default()
        }
    }

    pub fn with_preserve_workspace(mut self, preserve: bool) -> Self {
        self.preserve_workspace = preserve;
        self
    }

    pub fn with_protected_default_branch(mut self, protected: bool) -> Self {
        self.has_protected_default_branch = protected;
        self
    }
}
