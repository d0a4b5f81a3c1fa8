use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{PlannedOperation, PlannedRequest, TableStrategy, check_export_size, destination_path};
use crate::client::{JobResult, StorageClient};
use crate::error::{InputMappingError, InputMappingResult};
use crate::manifest::{ManifestCreator, TableManifest, manifest_path};
use crate::options::RewrittenInputTableOptions;
use crate::staging::FileStaging;
use crate::state::InputTableStateList;
use crate::strategy::{LoadType, StagingBackend};

/// Exports tables into the project's file storage (S3 or ABS).
///
/// No data is downloaded; the manifest points at the exported file and
/// carries temporary credentials for reading it.
pub struct ObjectStorageTableStrategy {
    backend: StagingBackend,
    client: Arc<dyn StorageClient>,
    metadata: Arc<dyn FileStaging>,
    states: InputTableStateList,
    destination: String,
    manifests: ManifestCreator,
    export_limit: u64,
}

impl ObjectStorageTableStrategy {
    pub fn new(
        backend: StagingBackend,
        client: Arc<dyn StorageClient>,
        metadata: Arc<dyn FileStaging>,
        states: InputTableStateList,
        destination: &str,
        manifests: ManifestCreator,
        export_limit: u64,
    ) -> Self {
        Self {
            backend,
            client,
            metadata,
            states,
            destination: destination.to_string(),
            manifests,
            export_limit,
        }
    }

    fn label(&self) -> &'static str {
        match self.backend {
            StagingBackend::Abs => "ABS",
            _ => "S3",
        }
    }
}

#[async_trait]
impl TableStrategy for ObjectStorageTableStrategy {
    fn backend(&self) -> StagingBackend {
        self.backend
    }

    fn plan_table(
        &self,
        table: &RewrittenInputTableOptions,
    ) -> InputMappingResult<PlannedOperation> {
        check_export_size(table, self.export_limit)?;
        Ok(PlannedOperation {
            table: table.clone(),
            load_type: LoadType::Export,
            request: PlannedRequest::ObjectExport(table.export_options(&self.states)),
        })
    }

    async fn execute_batch(
        &self,
        operations: &[PlannedOperation],
        _preserve_workspace: bool,
    ) -> InputMappingResult<Vec<JobResult>> {
        let mut job_ids = Vec::with_capacity(operations.len());
        for operation in operations {
            let PlannedRequest::ObjectExport(options) = &operation.request else {
                continue;
            };
            let source = operation.table.source();
            let job_id = self
                .client
                .queue_table_export(source, options)
                .await
                .map_err(|e| {
                    InputMappingError::remote(
                        format!("Failed to export table {}: {}", source, e),
                        e,
                    )
                })?;
            job_ids.push((job_id, &operation.table));
        }
        info!("Processing {} {} table exports.", job_ids.len(), self.label());

        let ids: Vec<String> = job_ids.iter().map(|(id, _)| id.clone()).collect();
        let jobs = if ids.is_empty() {
            Vec::new()
        } else {
            self.client
                .wait_for_jobs(&ids)
                .await
                .map_err(|e| InputMappingError::remote(format!("Table export failed: {}", e), e))?
        };

        for (job_id, table) in &job_ids {
            let file_id = jobs
                .iter()
                .find(|job| &job.id == job_id)
                .and_then(JobResult::exported_file_id)
                .ok_or_else(|| {
                    InputMappingError::remote(
                        format!(
                            "Export job {} of table {} did not produce a file.",
                            job_id,
                            table.source()
                        ),
                        "job results carry no exported file id",
                    )
                })?;
            let exported = self.client.get_file(file_id, true).await.map_err(|e| {
                InputMappingError::remote(
                    format!("Failed to get exported file {}: {}", file_id, e),
                    e,
                )
            })?;
            let path = manifest_path(
                &self.metadata.path().join(destination_path(&self.destination, table)),
            );
            let manifest =
                TableManifest::new(table.table_info(), table.column_names(), Some(&exported));
            self.manifests.write_table_manifest(&manifest, &path).await?;
        }
        Ok(jobs)
    }
}
