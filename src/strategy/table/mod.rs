//! Table strategies
//!
//! Tables are staged in two phases: every table is planned first (load
//! type decision, size checks, request construction), then the whole batch
//! is executed with as few remote jobs as possible.

mod local;
mod object_storage;
mod workspace;

pub use local::LocalTableStrategy;
pub use object_storage::ObjectStorageTableStrategy;
pub use workspace::WorkspaceTableStrategy;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{LoadType, StagingBackend};
use crate::client::{CloneInput, JobResult, LoadInput, TableExportRequest};
use crate::error::{InputMappingError, InputMappingResult};
use crate::options::{ExportOptions, RewrittenInputTableOptions};
use crate::result::{Metrics, TablesResult};
use crate::state::{InputTableState, InputTableStateList};

/// Remote request prepared for one table
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedRequest {
    /// Export into a local file
    Export(TableExportRequest),
    /// Export into object storage, referenced from the manifest
    ObjectExport(ExportOptions),
    Clone(CloneInput),
    Load(LoadInput),
}

/// A table with its chosen load type and prepared request
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOperation {
    pub table: RewrittenInputTableOptions,
    pub load_type: LoadType,
    pub request: PlannedRequest,
}

/// Moves tables into one staging backend
#[async_trait]
pub trait TableStrategy: Send + Sync {
    fn backend(&self) -> StagingBackend;

    /// Decide how `table` is staged; no remote calls are made
    fn plan_table(
        &self,
        table: &RewrittenInputTableOptions,
    ) -> InputMappingResult<PlannedOperation>;

    /// Run all planned operations and write their manifests.
    ///
    /// Any failed job aborts the whole batch.
    async fn execute_batch(
        &self,
        operations: &[PlannedOperation],
        preserve_workspace: bool,
    ) -> InputMappingResult<Vec<JobResult>>;

    /// Plan and execute `tables`, collecting their metadata and the next state
    async fn download_tables(
        &self,
        tables: &[RewrittenInputTableOptions],
        preserve_workspace: bool,
    ) -> InputMappingResult<TablesResult> {
        let mut result = TablesResult::default();
        let mut state = InputTableStateList::default();
        let mut operations = Vec::with_capacity(tables.len());
        for table in tables {
            if let Some(last_import_date) = &table.table_info().last_import_date {
                state.push(InputTableState {
                    source: table.source().to_string(),
                    last_import_date: last_import_date.clone(),
                });
            }
            operations.push(self.plan_table(table)?);
            info!("Fetched table {}.", table.source());
            result.add_table(table.table_info());
        }

        let jobs = self.execute_batch(&operations, preserve_workspace).await?;
        result.metrics = Some(Metrics::from(jobs.as_slice()));
        result.state = state;
        info!("All tables were fetched.");
        Ok(result)
    }
}

/// Fail fast on tables too large to export
pub(crate) fn check_export_size(
    table: &RewrittenInputTableOptions,
    limit_bytes: u64,
) -> InputMappingResult<()> {
    let size_bytes = table.table_info().data_size_bytes;
    if size_bytes > limit_bytes {
        return Err(InputMappingError::CapacityExceeded {
            table_id: table.source().to_string(),
            size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// Relative path of a staged table under the destination root.
///
/// Leading separators are dropped so joining the result onto a staging root
/// never escapes it.
pub(crate) fn destination_path(destination: &str, table: &RewrittenInputTableOptions) -> PathBuf {
    let root = destination.trim_matches(['/', '\\']);
    Path::new(root).join(table.destination().trim_start_matches(['/', '\\']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TableInfo;
    use crate::options::InputTableOptions;
    use serde_json::json;

    fn table(config: serde_json::Value, size: u64) -> RewrittenInputTableOptions {
        let options = InputTableOptions::parse(&config).unwrap();
        let info = TableInfo {
            id: options.source().to_string(),
            data_size_bytes: size,
            ..Default::default()
        };
        RewrittenInputTableOptions::new(options, "1", info)
    }

    #[test]
    fn test_export_size_limit() {
        let small = table(json!({"source": "in.c-main.t"}), 10);
        assert!(check_export_size(&small, 10).is_ok());

        let big = table(json!({"source": "in.c-main.t"}), 11);
        let err = check_export_size(&big, 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Table \"in.c-main.t\" with size 11 bytes exceeds the input mapping limit of 10 bytes. Please contact support to raise this limit"
        );
    }

    #[test]
    fn test_destination_path() {
        let plain = table(json!({"source": "in.c-main.t"}), 0);
        assert_eq!(destination_path("in/tables/", &plain), Path::new("in/tables/in.c-main.t"));
        let named = table(json!({"source": "in.c-main.t", "destination": "t.csv"}), 0);
        assert_eq!(destination_path("in/tables", &named), Path::new("in/tables/t.csv"));
    }

    #[test]
    fn test_destination_path_stays_under_root() {
        let plain = table(json!({"source": "in.c-main.t"}), 0);
        assert_eq!(destination_path("", &plain), Path::new("in.c-main.t"));
        assert_eq!(destination_path("/", &plain), Path::new("in.c-main.t"));
        assert_eq!(
            Path::new("/data/staging").join(destination_path("", &plain)),
            Path::new("/data/staging/in.c-main.t")
        );
        let absolute = table(json!({"source": "in.c-main.t", "destination": "/t.csv"}), 0);
        assert_eq!(destination_path("out", &absolute), Path::new("out/t.csv"));
    }
}
