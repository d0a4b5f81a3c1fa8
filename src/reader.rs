//! Input mapping reader
//!
//! Entry point used by job runners. [`Reader::download_tables`] resolves,
//! rewrites and stages table mappings; [`Reader::download_files`] stages file
//! mappings. Both return the state to persist for the next run.

use std::sync::Arc;
use tracing::info;

use crate::client::StorageClient;
use crate::config::ReaderConfig;
use crate::error::InputMappingResult;
use crate::options::{InputFileOptions, InputTableOptionsList, ReaderOptions};
use crate::resolver::{TableDefinitionResolver, rewrite_table_options};
use crate::result::TablesResult;
use crate::run_id;
use crate::staging::StagingProviders;
use crate::state::{InputFileStateList, InputTableStateList};
use crate::strategy::StrategyFactory;

pub struct Reader {
    client: Arc<dyn StorageClient>,
    factory: StrategyFactory,
}

impl Reader {
    pub fn new(
        client: Arc<dyn StorageClient>,
        providers: StagingProviders,
        config: ReaderConfig,
    ) -> Self {
        let factory = StrategyFactory::new(client.clone(), providers, config);
        Self { client, factory }
    }

    pub fn factory(&self) -> &StrategyFactory {
        &self.factory
    }

    /// Stage `tables` into `backend` under `destination`.
    ///
    /// `states` is the state returned by the previous run and drives
    /// adaptive mappings.
    pub async fn download_tables(
        &self,
        tables: &InputTableOptionsList,
        states: &InputTableStateList,
        destination: &str,
        backend: &str,
        options: &ReaderOptions,
    ) -> InputMappingResult<TablesResult> {
        let strategy = self
            .factory
            .table_strategy(backend, states.clone(), destination)
            .await?;
        let resolved = TableDefinitionResolver::new(self.client.clone())
            .resolve(tables)
            .await?;

        let mut rewritten = Vec::with_capacity(resolved.len());
        for table in resolved.into_tables() {
            rewritten.push(rewrite_table_options(self.client.as_ref(), table, options).await?);
        }
        info!("Staging {} tables into \"{}\".", rewritten.len(), strategy.backend());
        strategy
            .download_tables(&rewritten, options.preserve_workspace)
            .await
    }

    /// Stage the files selected by `files` into `backend` under `destination`.
    ///
    /// `run_id` is the current run id, used by mappings filtering by run id.
    pub async fn download_files(
        &self,
        files: &[InputFileOptions],
        states: &InputFileStateList,
        destination: &str,
        backend: &str,
        run_id: Option<&str>,
    ) -> InputMappingResult<InputFileStateList> {
        let strategy = self.factory.file_strategy(backend, states.clone()).await?;
        strategy.download_files(files, destination, run_id).await
    }

    /// Parent of a dot separated run id, empty for a top-level run
    pub fn get_parent_run_id(run_id: &str) -> &str {
        run_id::get_parent_run_id(run_id)
    }
}
