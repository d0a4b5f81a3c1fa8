//! Staging locations
//!
//! Each staging backend is served by providers registered per [`Scope`]:
//! table data, table metadata, file data and file metadata. A file staging
//! is a local directory; a workspace staging is a SQL workspace that is
//! created lazily on first use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::client::StorageClient;
use crate::error::{InputMappingError, InputMappingResult};
use crate::strategy::StagingBackend;

/// What a provider is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    TableData,
    TableMetadata,
    FileData,
    FileMetadata,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::TableData => write!(f, "tableData"),
            Scope::TableMetadata => write!(f, "tableMetadata"),
            Scope::FileData => write!(f, "fileData"),
            Scope::FileMetadata => write!(f, "fileMetadata"),
        }
    }
}

/// A local directory
pub trait FileStaging: Send + Sync {
    fn path(&self) -> &Path;
}

/// A SQL workspace
#[async_trait]
pub trait WorkspaceStaging: Send + Sync {
    /// Workspace backend kind, e.g. `snowflake`
    fn backend(&self) -> &str;

    /// Workspace id, creating the workspace if needed
    async fn workspace_id(&self) -> InputMappingResult<String>;
}

/// Local directory staging
#[derive(Debug, Clone)]
pub struct LocalStaging {
    path: PathBuf,
}

impl LocalStaging {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FileStaging for LocalStaging {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// Workspace with a known id
#[derive(Debug, Clone)]
pub struct StaticWorkspace {
    id: String,
    backend: String,
}

impl StaticWorkspace {
    pub fn new(id: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend: backend.into(),
        }
    }
}

#[async_trait]
impl WorkspaceStaging for StaticWorkspace {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn workspace_id(&self) -> InputMappingResult<String> {
        Ok(self.id.clone())
    }
}

/// Workspace created through the storage service on first use
pub struct ManagedWorkspace {
    client: Arc<dyn StorageClient>,
    backend: String,
    id: OnceCell<String>,
}

impl ManagedWorkspace {
    pub fn new(client: Arc<dyn StorageClient>, backend: impl Into<String>) -> Self {
        Self {
            client,
            backend: backend.into(),
            id: OnceCell::new(),
        }
    }
}

#[async_trait]
impl WorkspaceStaging for ManagedWorkspace {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn workspace_id(&self) -> InputMappingResult<String> {
        let id = self
            .id
            .get_or_try_init(|| async {
                let workspace = self.client.create_workspace(&self.backend).await.map_err(|e| {
                    InputMappingError::remote(
                        format!("Failed to create {} workspace: {}", self.backend, e),
                        e,
                    )
                })?;
                tracing::info!("Created {} workspace \"{}\".", self.backend, workspace.id);
                Ok::<_, InputMappingError>(workspace.id)
            })
            .await?;
        Ok(id.clone())
    }
}

/// A registered staging location
#[derive(Clone)]
pub enum StagingProvider {
    File(Arc<dyn FileStaging>),
    Workspace(Arc<dyn WorkspaceStaging>),
}

impl StagingProvider {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        StagingProvider::File(Arc::new(LocalStaging::new(path)))
    }

    pub fn workspace(workspace: impl WorkspaceStaging + 'static) -> Self {
        StagingProvider::Workspace(Arc::new(workspace))
    }
}

/// Providers registered per staging backend and scope
#[derive(Clone, Default)]
pub struct StagingProviders {
    providers: HashMap<(StagingBackend, Scope), StagingProvider>,
}

impl StagingProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for every scope in `scopes`
    pub fn register(
        &mut self,
        backend: StagingBackend,
        scopes: &[Scope],
        provider: StagingProvider,
    ) -> &mut Self {
        for scope in scopes {
            self.providers.insert((backend, *scope), provider.clone());
        }
        self
    }

    /// Local directory for all four scopes of the `local` backend
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let mut providers = Self::new();
        providers.register(
            StagingBackend::Local,
            &[Scope::TableData, Scope::TableMetadata, Scope::FileData, Scope::FileMetadata],
            StagingProvider::local(path),
        );
        providers
    }

    pub fn provider(
        &self,
        backend: StagingBackend,
        scope: Scope,
    ) -> InputMappingResult<&StagingProvider> {
        self.providers.get(&(backend, scope)).ok_or_else(|| {
            InputMappingError::configuration(format!(
                "Staging \"{}\" does not have a provider for \"{}\".",
                backend, scope
            ))
        })
    }

    pub fn file(
        &self,
        backend: StagingBackend,
        scope: Scope,
    ) -> InputMappingResult<Arc<dyn FileStaging>> {
        match self.provider(backend, scope)? {
            StagingProvider::File(staging) => Ok(staging.clone()),
            StagingProvider::Workspace(_) => Err(InputMappingError::configuration(format!(
                "Staging \"{}\" for \"{}\" must be a local directory.",
                backend, scope
            ))),
        }
    }

    pub fn workspace(
        &self,
        backend: StagingBackend,
        scope: Scope,
    ) -> InputMappingResult<Arc<dyn WorkspaceStaging>> {
        match self.provider(backend, scope)? {
            StagingProvider::Workspace(staging) => Ok(staging.clone()),
            StagingProvider::File(_) => Err(InputMappingError::configuration(format!(
                "Staging \"{}\" for \"{}\" must be a workspace.",
                backend, scope
            ))),
        }
    }
}
