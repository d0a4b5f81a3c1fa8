//! Storage service capability surface
//!
//! The staging engine never talks to the storage service directly. Every
//! remote interaction goes through [`StorageClient`]:
//! - token and branch lookups
//! - table metadata lookup and metadata search
//! - batched table exports and asynchronous export jobs
//! - workspace provisioning, clone and load jobs
//! - file listing, download and tagging

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::options::{ExportOptions, LoadOptions};

pub mod memory;

pub use memory::MemoryStorageClient;

/// Error type for storage service calls
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service rejected the request or a job failed
    #[error("{message}")]
    Api { code: String, message: String },

    /// The request never reached the service
    #[error("Transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Result type for storage service calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Where the project keeps its files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStorageProvider {
    #[default]
    Aws,
    Azure,
    Gcp,
}

/// Token owner details relevant for staging decisions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub project_id: String,
    pub file_storage_provider: FileStorageProvider,
    /// Project limit `components.max_export_size_bytes`, when set
    #[serde(default)]
    pub max_export_size_bytes: Option<u64>,
}

/// The branch a client is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchContext {
    pub branch_id: String,
    pub default_branch_id: String,
}

impl BranchContext {
    pub fn default_branch(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            branch_id: id.clone(),
            default_branch_id: id,
        }
    }

    pub fn is_development(&self) -> bool {
        self.branch_id != self.default_branch_id
    }
}

/// One metadata key/value attached to a table or column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub id: String,
    pub backend: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTable {
    pub id: String,
    pub project_id: String,
}

/// Table metadata as reported by the storage service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub distribution_key: Vec<String>,
    pub created: String,
    pub last_change_date: Option<String>,
    pub last_import_date: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default)]
    pub column_metadata: BTreeMap<String, Vec<MetadataEntry>>,
    #[serde(default)]
    pub data_size_bytes: u64,
    #[serde(default)]
    pub rows_count: u64,
    #[serde(default)]
    pub is_alias: bool,
    /// Set for aliases, points at the aliased table
    #[serde(default)]
    pub source_table: Option<SourceTable>,
    pub bucket: BucketInfo,
}

/// File metadata as reported by the storage service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: u64,
    pub name: String,
    pub created: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub is_sliced: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub size_bytes: u64,
    pub run_id: Option<String>,
    /// Present when fetched with a federation token from S3 backed storage
    #[serde(default)]
    pub s3: Option<S3Location>,
    /// Present when fetched with a federation token from ABS backed storage
    #[serde(default)]
    pub abs: Option<AbsLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub is_sliced: bool,
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsLocation {
    pub container: String,
    pub name: String,
    pub is_sliced: bool,
    pub credentials: BTreeMap<String, String>,
}

/// Downloaded file body
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Whole(Vec<u8>),
    /// Named slices of a sliced file, in slice order
    Sliced(Vec<(String, Vec<u8>)>),
}

/// Filters for listing files
///
/// Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesOptions {
    /// Every listed file must carry all of these tags
    pub tags: Vec<String>,
    /// No listed file may carry any of these tags
    pub excluded_tags: Vec<String>,
    pub query: Option<String>,
    /// Only files with an id greater than this
    pub since_id: Option<u64>,
    pub created_since: Option<chrono::DateTime<chrono::Utc>>,
    /// Restrict to files from this run lineage
    pub run_id: Option<String>,
    pub file_ids: Vec<u64>,
    pub limit: Option<u32>,
}

/// New file for upload
#[derive(Debug, Clone, Default)]
pub struct UploadFile {
    pub name: String,
    pub content: Vec<u8>,
    pub tags: Vec<String>,
    pub run_id: Option<String>,
    pub is_public: bool,
}

/// One table of a batched local export
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExportRequest {
    pub table_id: String,
    pub destination: PathBuf,
    pub export_options: ExportOptions,
}

/// One table cloned into a workspace
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneInput {
    pub source: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch_id: Option<String>,
    pub overwrite: bool,
    pub drop_timestamp_column: bool,
}

/// One table copied (or created as a view) into a workspace
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadInput {
    pub source: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch_id: Option<String>,
    #[serde(flatten)]
    pub options: LoadOptions,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_view: bool,
}

/// Workspace job request body; `preserve = false` clears the workspace first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceJobRequest<T> {
    pub input: Vec<T>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetrics {
    pub in_bytes: u64,
    pub out_bytes: u64,
}

/// Finished asynchronous job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub id: String,
    pub operation_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub metrics: JobMetrics,
    /// Operation specific payload, e.g. `{"file": {"id": 1}}` for exports
    #[serde(default)]
    pub results: serde_json::Value,
}

impl JobResult {
    /// Id of the file produced by an export job
    pub fn exported_file_id(&self) -> Option<u64> {
        self.results.get("file")?.get("id")?.as_u64()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub id: String,
    pub backend: String,
}

/// Remote storage service operations used by the staging engine
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Branch this client is bound to
    fn branch(&self) -> BranchContext;

    async fn token_info(&self) -> ClientResult<TokenInfo>;

    /// Get table metadata, failing with [`ClientError::NotFound`] when absent
    async fn get_table(&self, table_id: &str) -> ClientResult<TableInfo>;

    async fn table_exists(&self, table_id: &str) -> ClientResult<bool> {
        match self.get_table(table_id).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Tables carrying metadata `key = value`, in search order
    async fn search_tables(&self, key: &str, value: &str) -> ClientResult<Vec<TableInfo>>;

    /// Export several tables into local files, waiting for all of them
    async fn export_tables(&self, exports: &[TableExportRequest]) -> ClientResult<Vec<JobResult>>;

    /// Queue an export of a table into file storage, returning the job id
    async fn queue_table_export(
        &self,
        table_id: &str,
        options: &ExportOptions,
    ) -> ClientResult<String>;

    /// Block until all jobs finish; fails if any of them failed
    async fn wait_for_jobs(&self, job_ids: &[String]) -> ClientResult<Vec<JobResult>>;

    async fn create_workspace(&self, backend: &str) -> ClientResult<WorkspaceInfo>;

    async fn queue_workspace_clone(
        &self,
        workspace_id: &str,
        request: &WorkspaceJobRequest<CloneInput>,
    ) -> ClientResult<String>;

    async fn queue_workspace_load(
        &self,
        workspace_id: &str,
        request: &WorkspaceJobRequest<LoadInput>,
    ) -> ClientResult<String>;

    async fn list_files(&self, options: &ListFilesOptions) -> ClientResult<Vec<FileInfo>>;

    /// Get file metadata; `federation_token` asks for temporary storage credentials
    async fn get_file(&self, file_id: u64, federation_token: bool) -> ClientResult<FileInfo>;

    async fn download_file(&self, file_id: u64) -> ClientResult<FileContent>;

    async fn add_file_tag(&self, file_id: u64, tag: &str) -> ClientResult<()>;

    async fn upload_file(&self, file: UploadFile) -> ClientResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_context() {
        let branch = BranchContext::default_branch("100");
        assert!(!branch.is_development());
        let dev = BranchContext {
            branch_id: "200".to_string(),
            default_branch_id: "100".to_string(),
        };
        assert!(dev.is_development());
    }

    #[test]
    fn test_exported_file_id() {
        let job = JobResult {
            id: "1".to_string(),
            operation_name: "tableExport".to_string(),
            status: JobStatus::Success,
            metrics: JobMetrics::default(),
            results: serde_json::json!({"file": {"id": 42}}),
        };
        assert_eq!(job.exported_file_id(), Some(42));
    }

    #[test]
    fn test_table_info_camel_case() {
        let info: TableInfo = serde_json::from_value(serde_json::json!({
            "id": "in.c-main.test",
            "uri": "https://connection/v2/storage/tables/in.c-main.test",
            "name": "test",
            "created": "2024-01-01T00:00:00+0000",
            "lastChangeDate": null,
            "lastImportDate": "2024-01-02T00:00:00+0000",
            "columns": ["Id", "Name"],
            "dataSizeBytes": 1024,
            "bucket": {"id": "in.c-main", "backend": "snowflake"}
        }))
        .unwrap();
        assert_eq!(info.data_size_bytes, 1024);
        assert_eq!(info.last_import_date.as_deref(), Some("2024-01-02T00:00:00+0000"));
        assert!(!info.is_alias);
    }
}
