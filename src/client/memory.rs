//! In-memory storage service
//!
//! Implements [`StorageClient`] on top of process memory so the staging
//! engine can be exercised without a live storage service. Jobs run
//! synchronously when queued; [`MemoryStorageClient::fail`] makes a chosen
//! operation fail the way the service would.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    AbsLocation, BranchContext, BucketInfo, ClientError, ClientResult, CloneInput, FileContent,
    FileInfo, FileStorageProvider, JobMetrics, JobResult, JobStatus, ListFilesOptions, LoadInput,
    MetadataEntry, S3Location, StorageClient, TableExportRequest, TableInfo, TokenInfo,
    UploadFile, WorkspaceInfo, WorkspaceJobRequest,
};
use crate::options::{ExportOptions, WhereOperator};
use crate::run_id;

/// Operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    SearchTables,
    ExportTables,
    TableExportJob,
    /// Export jobs succeed without reporting the exported file
    ExportedFile,
    WorkspaceClone,
    WorkspaceLoad,
    ListFiles,
    DownloadFile(u64),
}

/// How a workspace table was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceTableKind {
    Clone,
    Copy,
    View,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceTable {
    pub source: String,
    pub kind: WorkspaceTableKind,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A job as it was submitted
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedJob {
    pub id: String,
    pub operation_name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
struct StoredTable {
    info: TableInfo,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    info: FileInfo,
    content: FileContent,
}

#[derive(Debug)]
struct Workspace {
    backend: String,
    tables: BTreeMap<String, WorkspaceTable>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Vec<StoredTable>,
    files: BTreeMap<u64, StoredFile>,
    next_file_id: u64,
    jobs: HashMap<String, JobResult>,
    job_log: Vec<RecordedJob>,
    workspaces: BTreeMap<String, Workspace>,
    failures: HashMap<FailurePoint, String>,
}

impl MemoryState {
    fn record_job(
        &mut self,
        operation_name: &str,
        payload: serde_json::Value,
        status: JobStatus,
        metrics: JobMetrics,
        results: serde_json::Value,
    ) -> String {
        let id = (self.job_log.len() + 1).to_string();
        self.job_log.push(RecordedJob {
            id: id.clone(),
            operation_name: operation_name.to_string(),
            payload,
        });
        self.jobs.insert(
            id.clone(),
            JobResult {
                id: id.clone(),
                operation_name: operation_name.to_string(),
                status,
                metrics,
                results,
            },
        );
        id
    }

    fn table(&self, table_id: &str) -> ClientResult<&StoredTable> {
        self.tables
            .iter()
            .find(|t| t.info.id == table_id)
            .ok_or_else(|| {
                ClientError::NotFound(format!("The table \"{}\" was not found.", table_id))
            })
    }

    fn check(&self, point: FailurePoint) -> ClientResult<()> {
        match self.failures.get(&point) {
            Some(message) => Err(ClientError::Api {
                code: "storage.error".to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn add_file(&mut self, mut info: FileInfo, content: FileContent) -> u64 {
        self.next_file_id += 1;
        info.id = self.next_file_id;
        self.files.insert(info.id, StoredFile { info, content });
        self.next_file_id
    }
}

/// Build table metadata for a table living in the memory service
pub fn table_info(table_id: &str, backend: &str, columns: &[&str]) -> TableInfo {
    let (bucket, name) = table_id.rsplit_once('.').unwrap_or(("", table_id));
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    TableInfo {
        id: table_id.to_string(),
        uri: format!("memory://tables/{}", table_id),
        name: name.to_string(),
        created: now.clone(),
        last_change_date: Some(now.clone()),
        last_import_date: Some(now),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        bucket: BucketInfo {
            id: bucket.to_string(),
            backend: backend.to_string(),
        },
        ..Default::default()
    }
}

fn csv_line(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "\"\"")))
        .collect();
    quoted.join(",") + "\n"
}

/// Column projection and row filters shared by exports and loads
struct RowSelection<'a> {
    columns: Vec<String>,
    where_column: Option<&'a str>,
    where_values: &'a [String],
    where_operator: WhereOperator,
    limit: Option<u64>,
}

impl RowSelection<'_> {
    fn apply(&self, table: &StoredTable) -> ClientResult<(Vec<String>, Vec<Vec<String>>)> {
        let all = &table.info.columns;
        let columns = if self.columns.is_empty() {
            all.clone()
        } else {
            self.columns.clone()
        };
        let position = |name: &str| {
            all.iter().position(|c| c == name).ok_or_else(|| ClientError::Api {
                code: "storage.tables.columnNotFound".to_string(),
                message: format!("Column \"{}\" not found in table \"{}\".", name, table.info.id),
            })
        };
        let indexes = columns
            .iter()
            .map(|c| position(c.as_str()))
            .collect::<ClientResult<Vec<_>>>()?;
        let filter = match self.where_column {
            Some(column) => Some(position(column)?),
            None => None,
        };

        let mut rows = Vec::new();
        for row in &table.rows {
            if let Some(index) = filter {
                let value = row.get(index).map(String::as_str).unwrap_or_default();
                let listed = self.where_values.iter().any(|v| v == value);
                match self.where_operator {
                    WhereOperator::Eq if !listed => continue,
                    WhereOperator::Ne if listed => continue,
                    _ => {}
                }
            }
            if self.limit.is_some_and(|limit| rows.len() as u64 >= limit) {
                break;
            }
            rows.push(
                indexes
                    .iter()
                    .map(|i| row.get(*i).cloned().unwrap_or_default())
                    .collect(),
            );
        }
        Ok((columns, rows))
    }
}

impl<'a> From<&'a ExportOptions> for RowSelection<'a> {
    fn from(options: &'a ExportOptions) -> Self {
        Self {
            columns: options.columns.clone(),
            where_column: options.where_column.as_deref(),
            where_values: &options.where_values,
            where_operator: options.where_operator.unwrap_or_default(),
            limit: options.limit,
        }
    }
}

impl<'a> From<&'a LoadInput> for RowSelection<'a> {
    fn from(input: &'a LoadInput) -> Self {
        Self {
            columns: input.options.columns.iter().map(|c| c.source.clone()).collect(),
            where_column: input.options.where_column.as_deref(),
            where_values: &input.options.where_values,
            where_operator: input.options.where_operator.unwrap_or_default(),
            limit: input.options.rows,
        }
    }
}

fn to_csv(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut csv = csv_line(columns);
    for row in rows {
        csv.push_str(&csv_line(row));
    }
    csv
}

/// Storage service kept in process memory
#[derive(Debug)]
pub struct MemoryStorageClient {
    branch: BranchContext,
    token: TokenInfo,
    state: Mutex<MemoryState>,
}

impl MemoryStorageClient {
    /// Client on the default branch `"1"` of a project storing files in S3
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            branch: BranchContext::default_branch("1"),
            token: TokenInfo {
                project_id: project_id.into(),
                file_storage_provider: FileStorageProvider::Aws,
                max_export_size_bytes: None,
            },
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_branch(mut self, branch: BranchContext) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_file_storage(mut self, provider: FileStorageProvider) -> Self {
        self.token.file_storage_provider = provider;
        self
    }

    /// Project limit overriding the configured export ceiling
    pub fn with_export_limit(mut self, limit: u64) -> Self {
        self.token.max_export_size_bytes = Some(limit);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a table with its rows; replaces a table with the same id
    pub fn add_table(&self, info: TableInfo, rows: Vec<Vec<String>>) {
        let mut state = self.state();
        state.tables.retain(|t| t.info.id != info.id);
        state.tables.push(StoredTable { info, rows });
    }

    pub fn set_table_metadata(&self, table_id: &str, key: &str, value: &str) {
        let mut state = self.state();
        if let Some(table) = state.tables.iter_mut().find(|t| t.info.id == table_id) {
            table.info.metadata.retain(|m| m.key != key);
            table.info.metadata.push(MetadataEntry {
                key: key.to_string(),
                value: value.to_string(),
                provider: "user".to_string(),
            });
        }
    }

    /// Store a sliced file, returning its id
    pub fn add_sliced_file(
        &self,
        name: &str,
        slices: Vec<(String, Vec<u8>)>,
        tags: &[&str],
    ) -> u64 {
        let size = slices.iter().map(|(_, data)| data.len() as u64).sum();
        let info = FileInfo {
            name: name.to_string(),
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            is_sliced: true,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            size_bytes: size,
            ..Default::default()
        };
        self.state().add_file(info, FileContent::Sliced(slices))
    }

    /// Set the creation time of a stored file
    pub fn set_file_created(&self, file_id: u64, created: chrono::DateTime<Utc>) {
        if let Some(file) = self.state().files.get_mut(&file_id) {
            file.info.created = created.to_rfc3339_opts(SecondsFormat::Secs, true);
        }
    }

    /// Make an operation fail with `message` from now on
    pub fn fail(&self, point: FailurePoint, message: &str) {
        self.state().failures.insert(point, message.to_string());
    }

    /// Jobs in submission order
    pub fn jobs(&self) -> Vec<RecordedJob> {
        self.state().job_log.clone()
    }

    pub fn workspace_ids(&self) -> Vec<String> {
        self.state().workspaces.keys().cloned().collect()
    }

    pub fn workspace_backend(&self, workspace_id: &str) -> Option<String> {
        self.state().workspaces.get(workspace_id).map(|w| w.backend.clone())
    }

    pub fn workspace_table(&self, workspace_id: &str, name: &str) -> Option<WorkspaceTable> {
        self.state()
            .workspaces
            .get(workspace_id)
            .and_then(|w| w.tables.get(name).cloned())
    }

    pub fn workspace_table_names(&self, workspace_id: &str) -> Vec<String> {
        self.state()
            .workspaces
            .get(workspace_id)
            .map(|w| w.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn file_tags(&self, file_id: u64) -> Vec<String> {
        self.state()
            .files
            .get(&file_id)
            .map(|f| f.info.tags.clone())
            .unwrap_or_default()
    }

    fn workspace_job<T: serde::Serialize>(
        &self,
        point: FailurePoint,
        operation_name: &str,
        workspace_id: &str,
        request: &WorkspaceJobRequest<T>,
        load: impl Fn(&MemoryState, &T) -> ClientResult<(String, WorkspaceTable, bool, u64)>,
    ) -> ClientResult<String> {
        let mut state = self.state();
        let payload = json!({"workspaceId": workspace_id, "request": request});
        if !state.workspaces.contains_key(workspace_id) {
            return Err(ClientError::NotFound(format!(
                "Workspace \"{}\" not found.",
                workspace_id
            )));
        }

        let outcome = state.check(point).and_then(|_| {
            request
                .input
                .iter()
                .map(|input| load(&*state, input))
                .collect::<ClientResult<Vec<_>>>()
        });

        let (status, metrics, results) = match outcome {
            Ok(loaded) => {
                let workspace = state
                    .workspaces
                    .get_mut(workspace_id)
                    .ok_or_else(|| ClientError::NotFound(workspace_id.to_string()))?;
                if !request.preserve {
                    workspace.tables.clear();
                }
                let mut failure = None;
                let mut in_bytes = 0;
                for (name, table, overwrite, size) in loaded {
                    if workspace.tables.contains_key(&name) && !overwrite {
                        failure = Some(format!("Table \"{}\" already exists in workspace.", name));
                        break;
                    }
                    in_bytes += size;
                    workspace.tables.insert(name, table);
                }
                match failure {
                    Some(message) => {
                        (JobStatus::Error, JobMetrics::default(), json!({"error": message}))
                    }
                    None => (
                        JobStatus::Success,
                        JobMetrics {
                            in_bytes,
                            out_bytes: 0,
                        },
                        serde_json::Value::Null,
                    ),
                }
            }
            Err(e) => (JobStatus::Error, JobMetrics::default(), json!({"error": e.to_string()})),
        };
        Ok(state.record_job(operation_name, payload, status, metrics, results))
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    fn branch(&self) -> BranchContext {
        self.branch.clone()
    }

    async fn token_info(&self) -> ClientResult<TokenInfo> {
        Ok(self.token.clone())
    }

    async fn get_table(&self, table_id: &str) -> ClientResult<TableInfo> {
        self.state().table(table_id).map(|t| t.info.clone())
    }

    async fn search_tables(&self, key: &str, value: &str) -> ClientResult<Vec<TableInfo>> {
        let state = self.state();
        state.check(FailurePoint::SearchTables)?;
        Ok(state
            .tables
            .iter()
            .filter(|t| t.info.metadata.iter().any(|m| m.key == key && m.value == value))
            .map(|t| t.info.clone())
            .collect())
    }

    async fn export_tables(&self, exports: &[TableExportRequest]) -> ClientResult<Vec<JobResult>> {
        let mut written = Vec::new();
        {
            let state = self.state();
            state.check(FailurePoint::ExportTables)?;
            for export in exports {
                let table = state.table(&export.table_id)?;
                let (columns, rows) = RowSelection::from(&export.export_options).apply(table)?;
                written.push((export, to_csv(&columns, &rows), table.info.data_size_bytes));
            }
        }

        let mut results = Vec::new();
        for (export, csv, size) in written {
            if let Some(parent) = export.destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ClientError::Transport(e.into()))?;
            }
            tokio::fs::write(&export.destination, csv.as_bytes())
                .await
                .map_err(|e| ClientError::Transport(e.into()))?;

            let mut state = self.state();
            let id = state.record_job(
                "tableExport",
                serde_json::to_value(export).unwrap_or_default(),
                JobStatus::Success,
                JobMetrics {
                    in_bytes: size,
                    out_bytes: csv.len() as u64,
                },
                serde_json::Value::Null,
            );
            if let Some(job) = state.jobs.get(&id) {
                results.push(job.clone());
            }
        }
        Ok(results)
    }

    async fn queue_table_export(
        &self,
        table_id: &str,
        options: &ExportOptions,
    ) -> ClientResult<String> {
        let mut state = self.state();
        let payload = json!({"tableId": table_id, "options": options});
        let exported = state.check(FailurePoint::TableExportJob).and_then(|_| {
            let table = state.table(table_id)?;
            let (columns, rows) = RowSelection::from(options).apply(table)?;
            Ok((table.info.name.clone(), to_csv(&columns, &rows), table.info.data_size_bytes))
        });
        let id = match exported {
            Ok((name, csv, size)) => {
                let out_bytes = csv.len() as u64;
                let info = FileInfo {
                    name: format!("{}.csv", name),
                    created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    tags: vec!["table-export".to_string()],
                    size_bytes: out_bytes,
                    ..Default::default()
                };
                let file_id = state.add_file(info, FileContent::Whole(csv.into_bytes()));
                let results = if state.failures.contains_key(&FailurePoint::ExportedFile) {
                    json!({})
                } else {
                    json!({"file": {"id": file_id}})
                };
                state.record_job(
                    "tableExport",
                    payload,
                    JobStatus::Success,
                    JobMetrics {
                        in_bytes: size,
                        out_bytes,
                    },
                    results,
                )
            }
            Err(e) => state.record_job(
                "tableExport",
                payload,
                JobStatus::Error,
                JobMetrics::default(),
                json!({"error": e.to_string()}),
            ),
        };
        Ok(id)
    }

    async fn wait_for_jobs(&self, job_ids: &[String]) -> ClientResult<Vec<JobResult>> {
        let state = self.state();
        let mut results = Vec::new();
        for id in job_ids {
            let job = state
                .jobs
                .get(id)
                .ok_or_else(|| ClientError::NotFound(format!("Job \"{}\" not found.", id)))?;
            if job.status == JobStatus::Error {
                let message = job.results["error"].as_str().unwrap_or("Job failed.");
                return Err(ClientError::Api {
                    code: "job.failed".to_string(),
                    message: message.to_string(),
                });
            }
            results.push(job.clone());
        }
        Ok(results)
    }

    async fn create_workspace(&self, backend: &str) -> ClientResult<WorkspaceInfo> {
        let mut state = self.state();
        let id = format!("ws-{}", state.workspaces.len() + 1);
        state.workspaces.insert(
            id.clone(),
            Workspace {
                backend: backend.to_string(),
                tables: BTreeMap::new(),
            },
        );
        Ok(WorkspaceInfo {
            id,
            backend: backend.to_string(),
        })
    }

    async fn queue_workspace_clone(
        &self,
        workspace_id: &str,
        request: &WorkspaceJobRequest<CloneInput>,
    ) -> ClientResult<String> {
        self.workspace_job(
            FailurePoint::WorkspaceClone,
            "workspaceLoadClone",
            workspace_id,
            request,
            |state, input| {
                let table = state.table(&input.source)?;
                Ok((
                    input.destination.clone(),
                    WorkspaceTable {
                        source: input.source.clone(),
                        kind: WorkspaceTableKind::Clone,
                        columns: table.info.columns.clone(),
                        rows: table.rows.clone(),
                    },
                    input.overwrite,
                    table.info.data_size_bytes,
                ))
            },
        )
    }

    async fn queue_workspace_load(
        &self,
        workspace_id: &str,
        request: &WorkspaceJobRequest<LoadInput>,
    ) -> ClientResult<String> {
        self.workspace_job(
            FailurePoint::WorkspaceLoad,
            "workspaceLoad",
            workspace_id,
            request,
            |state, input| {
                let table = state.table(&input.source)?;
                let (columns, rows) = RowSelection::from(input).apply(table)?;
                let kind = if input.use_view {
                    WorkspaceTableKind::View
                } else {
                    WorkspaceTableKind::Copy
                };
                Ok((
                    input.destination.clone(),
                    WorkspaceTable {
                        source: input.source.clone(),
                        kind,
                        columns,
                        rows,
                    },
                    input.options.overwrite,
                    table.info.data_size_bytes,
                ))
            },
        )
    }

    /// Free-text queries match file names and tags by substring
    async fn list_files(&self, options: &ListFilesOptions) -> ClientResult<Vec<FileInfo>> {
        let state = self.state();
        state.check(FailurePoint::ListFiles)?;
        let mut files: Vec<FileInfo> = state
            .files
            .values()
            .map(|f| &f.info)
            .filter(|f| options.tags.iter().all(|t| f.tags.contains(t)))
            .filter(|f| !options.excluded_tags.iter().any(|t| f.tags.contains(t)))
            .filter(|f| {
                options.query.as_deref().is_none_or(|q| {
                    f.name.contains(q) || f.tags.iter().any(|t| t.contains(q))
                })
            })
            .filter(|f| options.since_id.is_none_or(|since| f.id > since))
            .filter(|f| {
                options.created_since.is_none_or(|since| {
                    chrono::DateTime::parse_from_rfc3339(&f.created)
                        .is_ok_and(|created| created >= since)
                })
            })
            .filter(|f| {
                options.run_id.as_deref().is_none_or(|root| {
                    f.run_id.as_deref().is_some_and(|id| run_id::is_in_lineage(id, root))
                })
            })
            .filter(|f| options.file_ids.is_empty() || options.file_ids.contains(&f.id))
            .cloned()
            .collect();
        files.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = options.limit {
            files.truncate(limit as usize);
        }
        Ok(files)
    }

    async fn get_file(&self, file_id: u64, federation_token: bool) -> ClientResult<FileInfo> {
        let state = self.state();
        let mut info = state
            .files
            .get(&file_id)
            .map(|f| f.info.clone())
            .ok_or_else(|| ClientError::NotFound(format!("File \"{}\" not found.", file_id)))?;
        if federation_token {
            let key = format!("files/{}_{}", info.id, info.name);
            let credentials = BTreeMap::from([
                ("token".to_string(), format!("memory-token-{}", info.id)),
            ]);
            match self.token.file_storage_provider {
                FileStorageProvider::Aws => {
                    info.s3 = Some(S3Location {
                        bucket: "memory-files".to_string(),
                        key,
                        region: "us-east-1".to_string(),
                        is_sliced: info.is_sliced,
                        credentials,
                    })
                }
                FileStorageProvider::Azure => {
                    info.abs = Some(AbsLocation {
                        container: "memory-files".to_string(),
                        name: key,
                        is_sliced: info.is_sliced,
                        credentials,
                    })
                }
                FileStorageProvider::Gcp => {}
            }
        }
        Ok(info)
    }

    async fn download_file(&self, file_id: u64) -> ClientResult<FileContent> {
        let state = self.state();
        state.check(FailurePoint::DownloadFile(file_id))?;
        state
            .files
            .get(&file_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| ClientError::NotFound(format!("File \"{}\" not found.", file_id)))
    }

    async fn add_file_tag(&self, file_id: u64, tag: &str) -> ClientResult<()> {
        let mut state = self.state();
        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| ClientError::NotFound(format!("File \"{}\" not found.", file_id)))?;
        if !file.info.tags.iter().any(|t| t == tag) {
            file.info.tags.push(tag.to_string());
        }
        Ok(())
    }

    async fn upload_file(&self, file: UploadFile) -> ClientResult<u64> {
        let info = FileInfo {
            name: file.name,
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            is_public: file.is_public,
            tags: file.tags,
            size_bytes: file.content.len() as u64,
            run_id: file.run_id,
            ..Default::default()
        };
        Ok(self.state().add_file(info, FileContent::Whole(file.content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_table() -> MemoryStorageClient {
        let client = MemoryStorageClient::new("1");
        client.add_table(
            table_info("in.c-main.people", "snowflake", &["Id", "Name"]),
            vec![
                vec!["1".to_string(), "Ann".to_string()],
                vec!["2".to_string(), "Bob".to_string()],
            ],
        );
        client
    }

    #[tokio::test]
    async fn test_get_missing_table() {
        let client = MemoryStorageClient::new("1");
        let err = client.get_table("in.c-main.none").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert!(!client.table_exists("in.c-main.none").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_tables_in_insertion_order() {
        let client = client_with_table();
        client.add_table(table_info("in.c-main.other", "snowflake", &["Id"]), vec![]);
        client.set_table_metadata("in.c-main.other", "k", "v");
        client.set_table_metadata("in.c-main.people", "k", "v");
        let found = client.search_tables("k", "v").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["in.c-main.people", "in.c-main.other"]);
    }

    #[tokio::test]
    async fn test_export_tables_writes_csv() {
        let client = client_with_table();
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("in/tables/people.csv");
        let results = client
            .export_tables(&[TableExportRequest {
                table_id: "in.c-main.people".to_string(),
                destination: destination.clone(),
                export_options: ExportOptions {
                    columns: vec!["Name".to_string()],
                    where_column: Some("Id".to_string()),
                    where_values: vec!["2".to_string()],
                    where_operator: Some(WhereOperator::Eq),
                    ..Default::default()
                },
            }])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let csv = std::fs::read_to_string(destination).unwrap();
        assert_eq!(csv, "\"Name\"\n\"Bob\"\n");
    }

    #[tokio::test]
    async fn test_failed_job_surfaces_on_wait() {
        let client = client_with_table();
        client.fail(FailurePoint::TableExportJob, "Export failed");
        let job = client
            .queue_table_export("in.c-main.people", &ExportOptions::default())
            .await
            .unwrap();
        let err = client.wait_for_jobs(&[job]).await.unwrap_err();
        assert_eq!(err.to_string(), "Export failed");
    }

    #[tokio::test]
    async fn test_clone_into_existing_table_fails_without_overwrite() {
        let client = client_with_table();
        let workspace = client.create_workspace("snowflake").await.unwrap();
        let request = WorkspaceJobRequest {
            input: vec![CloneInput {
                source: "in.c-main.people".to_string(),
                destination: "people".to_string(),
                source_branch_id: None,
                overwrite: false,
                drop_timestamp_column: false,
            }],
            preserve: true,
        };
        let first = client.queue_workspace_clone(&workspace.id, &request).await.unwrap();
        assert!(client.wait_for_jobs(&[first]).await.is_ok());
        let second = client.queue_workspace_clone(&workspace.id, &request).await.unwrap();
        let err = client.wait_for_jobs(&[second]).await.unwrap_err();
        assert!(err.to_string().contains("already exists in workspace"));

        let cleared = WorkspaceJobRequest {
            preserve: false,
            ..request
        };
        let third = client.queue_workspace_clone(&workspace.id, &cleared).await.unwrap();
        assert!(client.wait_for_jobs(&[third]).await.is_ok());
        assert_eq!(client.workspace_table_names(&workspace.id), ["people"]);
    }

    #[tokio::test]
    async fn test_list_files_newest_first_with_limit() {
        let client = MemoryStorageClient::new("1");
        for name in ["a", "b", "c"] {
            client
                .upload_file(UploadFile {
                    name: name.to_string(),
                    content: b"x".to_vec(),
                    tags: vec!["t".to_string()],
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let files = client
            .list_files(&ListFilesOptions {
                tags: vec!["t".to_string()],
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<u64> = files.iter().map(|f| f.id).collect();
        assert_eq!(ids, [3, 2]);
    }

    #[tokio::test]
    async fn test_list_files_by_run_lineage() {
        let client = MemoryStorageClient::new("1");
        for run_id in ["100.1", "200", "100"] {
            client
                .upload_file(UploadFile {
                    name: format!("run-{}", run_id),
                    content: vec![],
                    tags: vec!["t".to_string()],
                    run_id: Some(run_id.to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let files = client
            .list_files(&ListFilesOptions {
                tags: vec!["t".to_string()],
                run_id: Some("100".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["run-100", "run-100.1"]);
    }

    #[tokio::test]
    async fn test_federation_token_locations() {
        let client = MemoryStorageClient::new("1").with_file_storage(FileStorageProvider::Azure);
        let id = client
            .upload_file(UploadFile {
                name: "data.csv".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let info = client.get_file(id, true).await.unwrap();
        assert!(info.s3.is_none());
        assert_eq!(info.abs.unwrap().name, format!("files/{}_data.csv", id));
    }
}
