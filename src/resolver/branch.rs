//! Development branch rewriting
//!
//! On a development branch a job reads branch-specific inputs when they
//! exist: table `in.c-main.t` is replaced by `in.c-<branch>-main.t`, and file
//! tags get a `<branch>-` prefix.

use tracing::info;

use crate::client::{ClientError, StorageClient};
use crate::error::{InputMappingError, InputMappingResult};
use crate::options::{
    InputFileOptions, InputTableOptions, ReaderOptions, RewrittenInputTableOptions,
};

/// Branch-specific id of `table_id`, e.g. `in.c-main.t` to `in.c-123-main.t`
pub fn dev_table_id(table_id: &str, branch_id: &str) -> Option<String> {
    let (stage, rest) = table_id.split_once('.')?;
    let bucket = rest.strip_prefix("c-")?;
    Some(format!("{}.c-{}-{}", stage, branch_id, bucket))
}

/// Resolve the branch to read `table` from and fetch its metadata
pub async fn rewrite_table_options(
    client: &dyn StorageClient,
    table: InputTableOptions,
    options: &ReaderOptions,
) -> InputMappingResult<RewrittenInputTableOptions> {
    let branch = client.branch();
    let mut table = table;
    let mut source_branch_id = branch.default_branch_id.clone();

    if branch.is_development() && !options.dev_inputs_disabled {
        if options.has_protected_default_branch {
            source_branch_id = branch.branch_id.clone();
        } else if let Some(dev_id) = dev_table_id(table.source(), &branch.branch_id) {
            let exists = client.table_exists(&dev_id).await.map_err(|e| {
                InputMappingError::remote(format!("Failed to check table {}: {}", dev_id, e), e)
            })?;
            if exists {
                info!("Using dev input \"{}\" instead of \"{}\".", dev_id, table.source());
                table = table.with_source(dev_id);
            }
        }
    }
    if let Some(explicit) = table.source_branch_id() {
        source_branch_id = explicit.to_string();
    }

    let table_info = client.get_table(table.source()).await.map_err(|e| match e {
        ClientError::NotFound(_) => {
            InputMappingError::NotFound(format!("Table \"{}\" not found.", table.source()))
        }
        e => InputMappingError::remote(format!("Failed to get table {}: {}", table.source(), e), e),
    })?;
    Ok(RewrittenInputTableOptions::new(table, source_branch_id, table_info))
}

/// Prefix the mapping's tags with the development branch id when files
/// carrying the prefixed tags exist
pub async fn rewrite_file_options(
    client: &dyn StorageClient,
    file: &InputFileOptions,
) -> InputMappingResult<InputFileOptions> {
    let branch = client.branch();
    if !branch.is_development() || file.included_tags().is_empty() {
        return Ok(file.clone());
    }
    let prefixed = file.with_tag_prefix(&format!("{}-", branch.branch_id));
    let dev_files = crate::client::ListFilesOptions {
        tags: prefixed.included_tags(),
        limit: Some(1),
        ..Default::default()
    };
    let found = client
        .list_files(&dev_files)
        .await
        .map_err(|e| InputMappingError::remote(format!("Failed to list files: {}", e), e))?;
    if found.is_empty() {
        return Ok(file.clone());
    }
    info!(
        "Using dev tags \"{}\" instead of \"{}\".",
        prefixed.included_tags().join(", "),
        file.included_tags().join(", ")
    );
    Ok(prefixed)
}
