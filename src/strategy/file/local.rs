use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::FileStrategy;
use crate::client::{FileContent, FileInfo, StorageClient};
use crate::error::{BoxedCause, InputMappingError, InputMappingResult};
use crate::manifest::{FileManifest, ManifestCreator, manifest_path};
use crate::options::InputFileOptions;
use crate::resolver::rewrite_file_options;
use crate::staging::FileStaging;
use crate::state::InputFileStateList;

/// Downloads files into a local directory as `<id>_<name>`
pub struct LocalFileStrategy {
    client: Arc<dyn StorageClient>,
    data: Arc<dyn FileStaging>,
    metadata: Arc<dyn FileStaging>,
    states: InputFileStateList,
    manifests: ManifestCreator,
    default_limit: u32,
}

impl LocalFileStrategy {
    pub fn new(
        client: Arc<dyn StorageClient>,
        data: Arc<dyn FileStaging>,
        metadata: Arc<dyn FileStaging>,
        states: InputFileStateList,
        manifests: ManifestCreator,
        default_limit: u32,
    ) -> Self {
        Self {
            client,
            data,
            metadata,
            states,
            manifests,
            default_limit,
        }
    }

    async fn download_file(
        &self,
        file: &FileInfo,
        target: &Path,
        overwrite: bool,
    ) -> Result<(), BoxedCause> {
        if !overwrite && tokio::fs::try_exists(target).await? {
            return Err(format!("File \"{}\" already exists.", target.display()).into());
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = self.client.download_file(file.id).await?;
        remove_existing(target).await?;
        match content {
            FileContent::Whole(content) => tokio::fs::write(target, content).await?,
            FileContent::Sliced(slices) => {
                tokio::fs::create_dir_all(target).await?;
                for (name, content) in slices {
                    tokio::fs::write(target.join(name), content).await?;
                }
            }
        }
        Ok(())
    }
}

/// Remove whatever is at `target`, a sliced directory or a plain file
async fn remove_existing(target: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(target).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(target).await,
        Ok(_) => tokio::fs::remove_file(target).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn file_name(file: &FileInfo) -> String {
    format!("{}_{}", file.id, file.name)
}

#[async_trait]
impl FileStrategy for LocalFileStrategy {
    async fn download_files(
        &self,
        files: &[InputFileOptions],
        destination: &str,
        run_id: Option<&str>,
    ) -> InputMappingResult<InputFileStateList> {
        let mut output = InputFileStateList::default();
        let data_root: PathBuf = self.data.path().join(destination);
        let metadata_root: PathBuf = self.metadata.path().join(destination);

        for mapping in files {
            let rewritten = rewrite_file_options(self.client.as_ref(), mapping).await?;
            let options =
                rewritten.list_options(&self.states, run_id, self.default_limit, Utc::now())?;
            let listed = self
                .client
                .list_files(&options)
                .await
                .map_err(|e| InputMappingError::remote(format!("Failed to list files: {}", e), e))?;

            let key = mapping.state_key();
            if let Ok(previous) = self.states.get_file(&key) {
                output.record(&key, previous.last_import_id);
            }
            for listed_file in &listed {
                let file = self.client.get_file(listed_file.id, true).await.map_err(|e| {
                    InputMappingError::remote(
                        format!(
                            "Failed to download file {} ({}): {}",
                            listed_file.name, listed_file.id, e
                        ),
                        e,
                    )
                })?;
                let name = file_name(&file);
                self.download_file(&file, &data_root.join(&name), mapping.overwrite())
                    .await
                    .map_err(|e| {
                        InputMappingError::remote(
                            format!("Failed to download file {} ({}): {}", file.name, file.id, e),
                            e,
                        )
                    })?;
                let manifest = manifest_path(&metadata_root.join(&name));
                self.manifests
                    .write_file_manifest(&FileManifest::from(&file), &manifest)
                    .await?;
                for tag in mapping.processed_tags() {
                    self.client.add_file_tag(file.id, tag).await.map_err(|e| {
                        InputMappingError::remote(
                            format!("Failed to tag file {} ({}): {}", file.name, file.id, e),
                            e,
                        )
                    })?;
                }
                output.record(&key, file.id);
                info!("Fetched file \"{}\".", name);
            }
        }
        info!("All files were fetched.");
        Ok(output)
    }
}
