use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::{PlannedOperation, PlannedRequest, TableStrategy, destination_path};
use crate::client::{
    ClientError, CloneInput, JobResult, LoadInput, StorageClient, WorkspaceJobRequest,
};
use crate::error::{InputMappingError, InputMappingResult};
use crate::manifest::{ManifestCreator, TableManifest, manifest_path};
use crate::options::RewrittenInputTableOptions;
use crate::staging::{FileStaging, WorkspaceStaging};
use crate::strategy::{LoadType, StagingBackend, WorkspaceType, decider};

/// Clones, copies or creates views of tables in a SQL workspace
pub struct WorkspaceTableStrategy {
    backend: StagingBackend,
    workspace_type: WorkspaceType,
    client: Arc<dyn StorageClient>,
    workspace: Arc<dyn WorkspaceStaging>,
    metadata: Arc<dyn FileStaging>,
    destination: String,
    manifests: ManifestCreator,
    project_id: String,
}

impl WorkspaceTableStrategy {
    /// Fails when `backend` is not a workspace or `workspace` is of another kind
    pub fn new(
        backend: StagingBackend,
        client: Arc<dyn StorageClient>,
        workspace: Arc<dyn WorkspaceStaging>,
        metadata: Arc<dyn FileStaging>,
        destination: &str,
        manifests: ManifestCreator,
        project_id: impl Into<String>,
    ) -> InputMappingResult<Self> {
        let workspace_type = backend.workspace_type().ok_or_else(|| {
            InputMappingError::UnsupportedBackend(format!(
                "Staging \"{}\" is not a workspace.",
                backend
            ))
        })?;
        if workspace.backend() != workspace_type.as_str() {
            return Err(InputMappingError::configuration(format!(
                "Staging \"{}\" requires a \"{}\" workspace, \"{}\" given.",
                backend,
                workspace_type,
                workspace.backend()
            )));
        }
        Ok(Self {
            backend,
            workspace_type,
            client,
            workspace,
            metadata,
            destination: destination.to_string(),
            manifests,
            project_id: project_id.into(),
        })
    }

    async fn run_clones(
        &self,
        workspace_id: &str,
        inputs: Vec<CloneInput>,
        preserve: bool,
    ) -> InputMappingResult<Vec<JobResult>> {
        info!("Cloning {} tables to workspace.", inputs.len());
        let request = WorkspaceJobRequest { input: inputs, preserve };
        let failed = |e: ClientError| {
            InputMappingError::remote(format!("Failed to clone tables to workspace: {}", e), e)
        };
        let job_id = self
            .client
            .queue_workspace_clone(workspace_id, &request)
            .await
            .map_err(failed)?;
        self.client.wait_for_jobs(&[job_id]).await.map_err(failed)
    }

    async fn run_loads(
        &self,
        workspace_id: &str,
        inputs: Vec<LoadInput>,
        preserve: bool,
    ) -> InputMappingResult<Vec<JobResult>> {
        info!("Copying {} tables to workspace.", inputs.len());
        let request = WorkspaceJobRequest { input: inputs, preserve };
        let failed = |e: ClientError| {
            InputMappingError::remote(format!("Failed to copy tables to workspace: {}", e), e)
        };
        let job_id = self
            .client
            .queue_workspace_load(workspace_id, &request)
            .await
            .map_err(failed)?;
        self.client.wait_for_jobs(&[job_id]).await.map_err(failed)
    }
}

#[async_trait]
impl TableStrategy for WorkspaceTableStrategy {
    fn backend(&self) -> StagingBackend {
        self.backend
    }

    fn plan_table(
        &self,
        table: &RewrittenInputTableOptions,
    ) -> InputMappingResult<PlannedOperation> {
        let options = table.load_options(Utc::now())?;
        let load_type = decider::decide(
            table.table_info(),
            self.workspace_type,
            &options,
            table.options().use_view(),
            &self.project_id,
        )?;
        let source_branch_id = Some(table.source_branch_id().to_string());
        let request = match load_type {
            LoadType::Clone => {
                info!("Table \"{}\" will be cloned.", table.source());
                PlannedRequest::Clone(CloneInput {
                    source: table.source().to_string(),
                    destination: table.destination().to_string(),
                    source_branch_id,
                    overwrite: table.options().overwrite(),
                    drop_timestamp_column: !table.options().keep_internal_timestamp_column(),
                })
            }
            _ => {
                if load_type == LoadType::View {
                    info!("Table \"{}\" will be created as view.", table.source());
                } else {
                    info!("Table \"{}\" will be copied.", table.source());
                }
                PlannedRequest::Load(LoadInput {
                    source: table.source().to_string(),
                    destination: table.destination().to_string(),
                    source_branch_id,
                    options,
                    use_view: load_type == LoadType::View,
                })
            }
        };
        Ok(PlannedOperation {
            table: table.clone(),
            load_type,
            request,
        })
    }

    async fn execute_batch(
        &self,
        operations: &[PlannedOperation],
        preserve_workspace: bool,
    ) -> InputMappingResult<Vec<JobResult>> {
        let mut clones = Vec::new();
        let mut loads = Vec::new();
        for operation in operations {
            match &operation.request {
                PlannedRequest::Clone(input) => clones.push(input.clone()),
                PlannedRequest::Load(input) => loads.push(input.clone()),
                PlannedRequest::Export(_) | PlannedRequest::ObjectExport(_) => {}
            }
        }

        let mut jobs = Vec::new();
        let mut cleaned = false;
        if !clones.is_empty() || !loads.is_empty() {
            let workspace_id = self.workspace.workspace_id().await?;
            // clone and copy run as separate jobs; concurrent jobs race on existing destinations
            if !clones.is_empty() {
                jobs.extend(self.run_clones(&workspace_id, clones, preserve_workspace).await?);
                cleaned = !preserve_workspace;
            }
            if !loads.is_empty() {
                let preserve = cleaned || preserve_workspace;
                jobs.extend(self.run_loads(&workspace_id, loads, preserve).await?);
            }
        }
        info!("Processed {} workspace exports.", jobs.len());

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
