//! Input mapping - stages remote tables and files for ETL job steps
//!
//! Provides:
//! - Option parsing and validation for table and file mappings
//! - Table definition resolution and development branch rewriting
//! - Staging strategies for local files, object storage and SQL workspaces
//! - Clone/copy/view load type decisions
//! - Manifests and incremental (adaptive) state tracking
//! - An in-memory storage client for tests

pub mod client;
pub mod config;
pub mod error;
pub mod manifest;
pub mod options;
pub mod reader;
pub mod resolver;
pub mod result;
pub mod run_id;
pub mod staging;
pub mod state;
pub mod strategy;
pub mod validation;

// Re-export commonly used types
pub use client::{ClientError, ClientResult, MemoryStorageClient, StorageClient};
pub use config::{ManifestFormat, ReaderConfig};
pub use error::{InputMappingError, InputMappingResult};
pub use manifest::{FileManifest, ManifestCreator, TableManifest};
pub use options::{
    InputFileOptions, InputTableOptions, InputTableOptionsList, ReaderOptions,
    RewrittenInputTableOptions,
};
pub use reader::Reader;
pub use resolver::TableDefinitionResolver;
pub use result::{Metrics, TableSummary, TablesResult};
pub use staging::{
    LocalStaging, ManagedWorkspace, Scope, StagingProvider, StagingProviders, StaticWorkspace,
};
pub use state::{FileTag, InputFileState, InputFileStateList, InputTableState, InputTableStateList};
pub use strategy::{LoadType, StagingBackend, StrategyFactory, WorkspaceType};
