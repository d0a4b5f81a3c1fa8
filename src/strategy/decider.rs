//! Load type decision for workspace destinations
//!
//! Pure functions over table metadata and load options. A clone is a
//! zero-copy operation and is only chosen when the workspace table would be
//! identical to the source, even when a view was requested. Views are only
//! available on Synapse and anything else is copied.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::WorkspaceType;
use crate::client::TableInfo;
use crate::error::{InputMappingError, InputMappingResult};
use crate::options::LoadOptions;

/// How a table reaches its staging destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    Clone,
    Copy,
    View,
    Export,
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadType::Clone => write!(f, "clone"),
            LoadType::Copy => write!(f, "copy"),
            LoadType::View => write!(f, "view"),
            LoadType::Export => write!(f, "export"),
        }
    }
}

/// True when the load keeps every column of the table unchanged
fn selects_whole_table(table: &TableInfo, options: &LoadOptions) -> bool {
    if options.columns.is_empty() {
        return true;
    }
    if !options.columns.iter().all(|c| c.is_plain()) {
        return false;
    }
    let selected: BTreeSet<&str> = options.columns.iter().map(|c| c.source.as_str()).collect();
    let available: BTreeSet<&str> = table.columns.iter().map(String::as_str).collect();
    selected.len() == options.columns.len() && selected == available
}

pub fn can_clone(table: &TableInfo, workspace: WorkspaceType, options: &LoadOptions) -> bool {
    !options.has_row_filters()
        && selects_whole_table(table, options)
        && workspace == WorkspaceType::Snowflake
        && table.bucket.backend == workspace.as_str()
}

pub fn can_use_view(workspace: WorkspaceType, use_view: bool) -> bool {
    use_view && workspace == WorkspaceType::Synapse
}

/// Reject load methods the table cannot use.
///
/// Aliases of tables owned by another project can only be cloned.
pub fn check_viable_load_method(
    table: &TableInfo,
    workspace: WorkspaceType,
    options: &LoadOptions,
    project_id: &str,
) -> InputMappingResult<()> {
    let foreign_alias = table.is_alias
        && table
            .source_table
            .as_ref()
            .is_some_and(|source| source.project_id != project_id);
    if foreign_alias && !can_clone(table, workspace, options) {
        return Err(InputMappingError::configuration(format!(
            "Table \"{}\" is an alias of a table from another project and can only be cloned into a \"{}\" workspace.",
            table.id, workspace
        )));
    }
    Ok(())
}

/// Pick clone, view or copy for a workspace destination
pub fn decide(
    table: &TableInfo,
    workspace: WorkspaceType,
    options: &LoadOptions,
    use_view: bool,
    project_id: &str,
) -> InputMappingResult<LoadType> {
    check_viable_load_method(table, workspace, options, project_id)?;
    if can_clone(table, workspace, options) {
        return Ok(LoadType::Clone);
    }
    if use_view {
        if can_use_view(workspace, use_view) {
            return Ok(LoadType::View);
        }
        return Err(InputMappingError::configuration(format!(
            "View load for table \"{}\" using backend \"{}\" can't be used, only Synapse is supported.",
            table.id, workspace
        )));
    }
    Ok(LoadType::Copy)
}
