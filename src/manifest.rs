//! Manifest writing
//!
//! Every staged table and file gets a companion `<name>.manifest` document
//! describing the remote object it came from, encoded as JSON or YAML.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::client::{AbsLocation, FileInfo, MetadataEntry, S3Location, TableInfo};
use crate::config::ManifestFormat;
use crate::error::{InputMappingError, InputMappingResult};

pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Table manifest document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableManifest {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub primary_key: Vec<String>,
    pub distribution_key: Vec<String>,
    pub created: String,
    pub last_change_date: Option<String>,
    pub last_import_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abs: Option<AbsLocation>,
    pub columns: Vec<String>,
    pub metadata: Vec<MetadataEntry>,
    pub column_metadata: BTreeMap<String, Vec<MetadataEntry>>,
}

impl TableManifest {
    /// Manifest for `table` listing `columns`, or all table columns when empty.
    ///
    /// `exported` is the file produced by an object storage export.
    pub fn new(table: &TableInfo, columns: &[String], exported: Option<&FileInfo>) -> Self {
        let columns = if columns.is_empty() {
            table.columns.clone()
        } else {
            columns.to_vec()
        };
        let column_metadata = columns
            .iter()
            .map(|column| {
                let entries = table.column_metadata.get(column).cloned().unwrap_or_default();
                (column.clone(), entries)
            })
            .collect();
        Self {
            id: table.id.clone(),
            uri: table.uri.clone(),
            name: table.name.clone(),
            primary_key: table.primary_key.clone(),
            distribution_key: table.distribution_key.clone(),
            created: table.created.clone(),
            last_change_date: table.last_change_date.clone(),
            last_import_date: table.last_import_date.clone(),
            s3: exported.and_then(|file| file.s3.clone()),
            abs: exported.and_then(|file| file.abs.clone()),
            columns,
            metadata: table.metadata.clone(),
            column_metadata,
        }
    }
}

/// File manifest document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileManifest {
    pub id: u64,
    pub name: String,
    pub created: String,
    pub is_public: bool,
    pub is_encrypted: bool,
    pub is_sliced: bool,
    pub tags: Vec<String>,
    pub max_age_days: Option<u32>,
    pub size_bytes: u64,
}

impl From<&FileInfo> for FileManifest {
    fn from(file: &FileInfo) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            created: file.created.clone(),
            is_public: file.is_public,
            is_encrypted: file.is_encrypted,
            is_sliced: file.is_sliced,
            tags: file.tags.clone(),
            max_age_days: file.max_age_days,
            size_bytes: file.size_bytes,
        }
    }
}

/// Path of the manifest belonging to `data_path`
pub fn manifest_path(data_path: &Path) -> PathBuf {
    let mut path = data_path.as_os_str().to_owned();
    path.push(MANIFEST_SUFFIX);
    PathBuf::from(path)
}

/// Writes manifests in the configured format
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestCreator {
    format: ManifestFormat,
}

impl ManifestCreator {
    pub fn new(format: ManifestFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    pub async fn write_table_manifest(
        &self,
        manifest: &TableManifest,
        path: &Path,
    ) -> InputMappingResult<()> {
        let content = self.format.encode(manifest).map_err(|e| {
            InputMappingError::Serialization(format!(
                "Failed to write manifest for table {} - {}: {}",
                manifest.id, manifest.name, e
            ))
        })?;
        write(path, &content).await
    }

    pub async fn write_file_manifest(
        &self,
        manifest: &FileManifest,
        path: &Path,
    ) -> InputMappingResult<()> {
        let content = self.format.encode(manifest).map_err(|e| {
            InputMappingError::Serialization(format!(
                "Failed to write manifest for file {} - {}: {}",
                manifest.id, manifest.name, e
            ))
        })?;
        write(path, &content).await
    }
}

async fn write(path: &Path, content: &str) -> InputMappingResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content.as_bytes()).await?;
    debug!("Written manifest {}", path.display());
    Ok(())
}
