//! Staging strategies
//!
//! [`StrategyFactory`] maps a staging backend id to the strategy moving data
//! into it. Table strategies plan one table at a time and execute all planned
//! operations as a batch; the file strategy lists and downloads files.

pub mod decider;
pub mod file;
pub mod table;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::client::{FileStorageProvider, StorageClient};
use crate::config::ReaderConfig;
use crate::error::{InputMappingError, InputMappingResult};
use crate::manifest::ManifestCreator;
use crate::staging::{Scope, StagingProviders};
use crate::state::{InputFileStateList, InputTableStateList};

pub use decider::LoadType;
pub use file::{FileStrategy, LocalFileStrategy};
pub use table::{
    LocalTableStrategy, ObjectStorageTableStrategy, PlannedOperation, PlannedRequest,
    TableStrategy, WorkspaceTableStrategy,
};

/// Physical destination kind for input data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StagingBackend {
    #[serde(rename = "abs")]
    Abs,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "s3")]
    S3,
    #[serde(rename = "workspace-redshift")]
    WorkspaceRedshift,
    #[serde(rename = "workspace-snowflake")]
    WorkspaceSnowflake,
    #[serde(rename = "workspace-synapse")]
    WorkspaceSynapse,
}

impl StagingBackend {
    pub const ALL: [StagingBackend; 6] = [
        StagingBackend::Abs,
        StagingBackend::Local,
        StagingBackend::S3,
        StagingBackend::WorkspaceRedshift,
        StagingBackend::WorkspaceSnowflake,
        StagingBackend::WorkspaceSynapse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StagingBackend::Abs => "abs",
            StagingBackend::Local => "local",
            StagingBackend::S3 => "s3",
            StagingBackend::WorkspaceRedshift => "workspace-redshift",
            StagingBackend::WorkspaceSnowflake => "workspace-snowflake",
            StagingBackend::WorkspaceSynapse => "workspace-synapse",
        }
    }

    /// SQL workspace engine behind a workspace backend
    pub fn workspace_type(&self) -> Option<WorkspaceType> {
        match self {
            StagingBackend::WorkspaceRedshift => Some(WorkspaceType::Redshift),
            StagingBackend::WorkspaceSnowflake => Some(WorkspaceType::Snowflake),
            StagingBackend::WorkspaceSynapse => Some(WorkspaceType::Synapse),
            _ => None,
        }
    }

    fn supported_list() -> String {
        StagingBackend::ALL
            .iter()
            .map(StagingBackend::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::str::FromStr for StagingBackend {
    type Err = InputMappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StagingBackend::ALL
            .into_iter()
            .find(|backend| backend.as_str() == s)
            .ok_or_else(|| {
                InputMappingError::UnsupportedBackend(format!(
                    "Input mapping on type \"{}\" is not supported. Supported types are \"{}\".",
                    s,
                    StagingBackend::supported_list()
                ))
            })
    }
}

impl std::fmt::Display for StagingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// SQL workspace engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceType {
    Redshift,
    Snowflake,
    Synapse,
}

impl WorkspaceType {
    /// Backend name as used by buckets and workspaces
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceType::Redshift => "redshift",
            WorkspaceType::Snowflake => "snowflake",
            WorkspaceType::Synapse => "synapse",
        }
    }
}

impl std::fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps staging backend ids to strategies
pub struct StrategyFactory {
    client: Arc<dyn StorageClient>,
    providers: StagingProviders,
    config: ReaderConfig,
}

impl StrategyFactory {
    pub fn new(
        client: Arc<dyn StorageClient>,
        providers: StagingProviders,
        config: ReaderConfig,
    ) -> Self {
        Self {
            client,
            providers,
            config,
        }
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn manifests(&self) -> ManifestCreator {
        ManifestCreator::new(self.config.manifest_format())
    }

    /// Build the table strategy for `backend`.
    ///
    /// Fails when the id is unknown, when the project lacks the backend's
    /// file storage, or when a required staging provider is not registered.
    pub async fn table_strategy(
        &self,
        backend: &str,
        states: InputTableStateList,
        destination: &str,
    ) -> InputMappingResult<Box<dyn TableStrategy>> {
        let backend: StagingBackend = backend.parse()?;
        let token = self
            .client
            .token_info()
            .await
            .map_err(|e| InputMappingError::remote(format!("Failed to verify token: {}", e), e))?;

        match backend {
            StagingBackend::S3 if token.file_storage_provider != FileStorageProvider::Aws => {
                return Err(InputMappingError::UnsupportedBackend(
                    "This project does not have S3 backend.".to_string(),
                ));
            }
            StagingBackend::Abs if token.file_storage_provider != FileStorageProvider::Azure => {
                return Err(InputMappingError::UnsupportedBackend(
                    "This project does not have ABS backend.".to_string(),
                ));
            }
            _ => {}
        }

        let export_limit = token
            .max_export_size_bytes
            .unwrap_or(self.config.limits.max_export_size_bytes);
        let metadata = self.providers.file(backend, Scope::TableMetadata)?;
        tracing::info!("Using \"{}\" table input staging.", backend);

        let strategy: Box<dyn TableStrategy> = match backend {
            StagingBackend::Local => Box::new(LocalTableStrategy::new(
                self.client.clone(),
                self.providers.file(backend, Scope::TableData)?,
                metadata,
                states,
                destination,
                self.manifests(),
                export_limit,
            )),
            StagingBackend::S3 | StagingBackend::Abs => Box::new(ObjectStorageTableStrategy::new(
                backend,
                self.client.clone(),
                metadata,
                states,
                destination,
                self.manifests(),
                export_limit,
            )),
            StagingBackend::WorkspaceRedshift
            | StagingBackend::WorkspaceSnowflake
            | StagingBackend::WorkspaceSynapse => Box::new(WorkspaceTableStrategy::new(
                backend,
                self.client.clone(),
                self.providers.workspace(backend, Scope::TableData)?,
                metadata,
                destination,
                self.manifests(),
                token.project_id,
            )?),
        };
        Ok(strategy)
    }

    /// Build the file strategy for `backend`; files can only be staged locally
    pub async fn file_strategy(
        &self,
        backend: &str,
        states: InputFileStateList,
    ) -> InputMappingResult<Box<dyn FileStrategy>> {
        let backend: StagingBackend = backend.parse()?;
        if backend != StagingBackend::Local {
            return Err(InputMappingError::UnsupportedBackend(format!(
                "File input mapping on type \"{}\" is not supported. Supported types are \"{}\".",
                backend,
                StagingBackend::Local
            )));
        }
        tracing::info!("Using \"{}\" file input staging.", backend);
        Ok(Box::new(LocalFileStrategy::new(
            self.client.clone(),
            self.providers.file(backend, Scope::FileData)?,
            self.providers.file(backend, Scope::FileMetadata)?,
            states,
            self.manifests(),
            self.config.limits.default_file_limit,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryStorageClient;
    use crate::staging::{StagingProvider, StaticWorkspace};

    fn factory(client: MemoryStorageClient, providers: StagingProviders) -> StrategyFactory {
        StrategyFactory::new(Arc::new(client), providers, ReaderConfig::default())
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("s3".parse::<StagingBackend>().unwrap(), StagingBackend::S3);
        assert_eq!(
            "workspace-synapse".parse::<StagingBackend>().unwrap().workspace_type(),
            Some(WorkspaceType::Synapse)
        );
        let err = "invalid".parse::<StagingBackend>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input mapping on type \"invalid\" is not supported. Supported types are \"abs, local, s3, workspace-redshift, workspace-snowflake, workspace-synapse\"."
        );
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let factory = factory(MemoryStorageClient::new("1"), StagingProviders::local("/tmp"));
        let err = factory
            .table_strategy("invalid", InputTableStateList::default(), "in/tables")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InputMappingError::UnsupportedBackend(_)));
    }

    #[tokio::test]
    async fn test_missing_file_storage_capability() {
        let factory = factory(MemoryStorageClient::new("1"), StagingProviders::local("/tmp"));
        let err = factory
            .table_strategy("abs", InputTableStateList::default(), "in/tables")
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "This project does not have ABS backend.");

        let azure = MemoryStorageClient::new("1").with_file_storage(FileStorageProvider::Azure);
        let factory = self::factory(azure, StagingProviders::local("/tmp"));
        let err = factory
            .table_strategy("s3", InputTableStateList::default(), "in/tables")
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "This project does not have S3 backend.");
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let factory = factory(MemoryStorageClient::new("1"), StagingProviders::local("/tmp"));
        let err = factory
            .table_strategy("workspace-snowflake", InputTableStateList::default(), "in/tables")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InputMappingError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_workspace_strategy() {
        let mut providers = StagingProviders::local("/tmp");
        providers
            .register(
                StagingBackend::WorkspaceSnowflake,
                &[Scope::TableData],
                StagingProvider::workspace(StaticWorkspace::new("1", "snowflake")),
            )
            .register(
                StagingBackend::WorkspaceSnowflake,
                &[Scope::TableMetadata],
                StagingProvider::local("/tmp"),
            );
        let factory = factory(MemoryStorageClient::new("1"), providers);
        let strategy = factory
            .table_strategy("workspace-snowflake", InputTableStateList::default(), "in/tables")
            .await
            .unwrap();
        assert_eq!(strategy.backend(), StagingBackend::WorkspaceSnowflake);
    }

    #[tokio::test]
    async fn test_workspace_kind_must_match_backend() {
        let mut providers = StagingProviders::local("/tmp");
        providers
            .register(
                StagingBackend::WorkspaceSnowflake,
                &[Scope::TableData],
                StagingProvider::workspace(StaticWorkspace::new("1", "redshift")),
            )
            .register(
                StagingBackend::WorkspaceSnowflake,
                &[Scope::TableMetadata],
                StagingProvider::local("/tmp"),
            );
        let factory = factory(MemoryStorageClient::new("1"), providers);
        let err = factory
            .table_strategy("workspace-snowflake", InputTableStateList::default(), "in/tables")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InputMappingError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "Staging \"workspace-snowflake\" requires a \"snowflake\" workspace, \"redshift\" given."
        );
    }

    #[tokio::test]
    async fn test_file_strategy_only_local() {
        let factory = factory(MemoryStorageClient::new("1"), StagingProviders::local("/tmp"));
        assert!(factory.file_strategy("local", InputFileStateList::default()).await.is_ok());
        let err = factory
            .file_strategy("s3", InputFileStateList::default())
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "File input mapping on type \"s3\" is not supported. Supported types are \"local\"."
        );
    }
}
