//! File strategies

mod local;

pub use local::LocalFileStrategy;

use async_trait::async_trait;

use crate::error::InputMappingResult;
use crate::options::InputFileOptions;
use crate::state::InputFileStateList;

/// Downloads files selected by file mappings
#[async_trait]
pub trait FileStrategy: Send + Sync {
    /// Download every file matched by `files` under `destination`.
    ///
    /// Returns the state for the next run: for each mapping, the largest
    /// file id seen, keyed by the mapping's tag set.
    async fn download_files(
        &self,
        files: &[InputFileOptions],
        destination: &str,
        run_id: Option<&str>,
    ) -> InputMappingResult<InputFileStateList>;
}
