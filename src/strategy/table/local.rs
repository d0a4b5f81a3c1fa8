use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{PlannedOperation, PlannedRequest, TableStrategy, check_export_size, destination_path};
use crate::client::{JobResult, StorageClient, TableExportRequest};
use crate::error::{InputMappingError, InputMappingResult};
use crate::manifest::{ManifestCreator, TableManifest, manifest_path};
use crate::options::RewrittenInputTableOptions;
use crate::staging::FileStaging;
use crate::state::InputTableStateList;
use crate::strategy::{LoadType, StagingBackend};

/// Exports tables as CSV files into a local directory
pub struct LocalTableStrategy {
    client: Arc<dyn StorageClient>,
    data: Arc<dyn FileStaging>,
    metadata: Arc<dyn FileStaging>,
    states: InputTableStateList,
    destination: String,
    manifests: ManifestCreator,
    export_limit: u64,
}

impl LocalTableStrategy {
    pub fn new(
        client: Arc<dyn StorageClient>,
        data: Arc<dyn FileStaging>,
        metadata: Arc<dyn FileStaging>,
        states: InputTableStateList,
        destination: &str,
        manifests: ManifestCreator,
        export_limit: u64,
    ) -> Self {
        Self {
            client,
            data,
            metadata,
            states,
            destination: destination.to_string(),
            manifests,
            export_limit,
        }
    }
}

#[async_trait]
impl TableStrategy for LocalTableStrategy {
    fn backend(&self) -> StagingBackend {
        StagingBackend::Local
    }

    fn plan_table(
        &self,
        table: &RewrittenInputTableOptions,
    ) -> InputMappingResult<PlannedOperation> {
        check_export_size(table, self.export_limit)?;
        let destination = self.data.path().join(destination_path(&self.destination, table));
        Ok(PlannedOperation {
            table: table.clone(),
            load_type: LoadType::Export,
            request: PlannedRequest::Export(TableExportRequest {
                table_id: table.source().to_string(),
                destination,
                export_options: table.export_options(&self.states),
            }),
        })
    }

    async fn execute_batch(
        &self,
        operations: &[PlannedOperation],
        _preserve_workspace: bool,
    ) -> InputMappingResult<Vec<JobResult>> {
        let exports: Vec<TableExportRequest> = operations
            .iter()
            .filter_map(|operation| match &operation.request {
                PlannedRequest::Export(export) => Some(export.clone()),
                _ => None,
            })
            .collect();
        info!("Processing {} local table exports.", exports.len());
        let jobs = if exports.is_empty() {
            Vec::new()
        } else {
            self.client.export_tables(&exports).await.map_err(|e| {
                InputMappingError::remote(format!("Failed to export tables: {}", e), e)
            })?
        };

        for operation in operations {
            let table = &operation.table;
            let path = manifest_path(
                &self.metadata.path().join(destination_path(&self.destination, table)),
            );
            let manifest = TableManifest::new(table.table_info(), table.column_names(), None);
            self.manifests.write_table_manifest(&manifest, &path).await?;
        }
        Ok(jobs)
    }
}
