//! Table definition resolution
//!
//! Mappings selecting a table by metadata (`source_search`) are turned into
//! mappings with a concrete `source`, and every source is then rewritten for
//! the branch the job runs on (see [`branch`]).

pub mod branch;

pub use branch::{dev_table_id, rewrite_file_options, rewrite_table_options};

use std::sync::Arc;

use crate::client::StorageClient;
use crate::error::{InputMappingError, InputMappingResult};
use crate::options::{InputTableOptions, InputTableOptionsList};

/// Resolves `source_search` mappings through the storage metadata search
pub struct TableDefinitionResolver {
    client: Arc<dyn StorageClient>,
}

impl TableDefinitionResolver {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }

    /// Resolve every mapping, keeping configuration order
    pub async fn resolve(
        &self,
        tables: &InputTableOptionsList,
    ) -> InputMappingResult<InputTableOptionsList> {
        let mut resolved = Vec::with_capacity(tables.len());
        for table in tables.tables() {
            resolved.push(self.resolve_table(table).await?);
        }
        Ok(InputTableOptionsList::new(resolved))
    }

    async fn resolve_table(
        &self,
        table: &InputTableOptions,
    ) -> InputMappingResult<InputTableOptions> {
        let Some(search) = table.source_search() else {
            return Ok(table.clone());
        };
        let found = self
            .client
            .search_tables(&search.key, &search.value)
            .await
            .map_err(|e| {
                InputMappingError::remote(
                    format!(
                        "Failed to search tables by metadata key: \"{}\" and value: \"{}\": {}",
                        search.key, search.value, e
                    ),
                    e,
                )
            })?;
        match found.as_slice() {
            [] => Err(InputMappingError::NotFound(format!(
                "Table with metadata key: \"{}\" and value: \"{}\" was not found.",
                search.key, search.value
            ))),
            [table_info] => {
                tracing::debug!(
                    "Resolved table \"{}\" by metadata key: \"{}\".",
                    table_info.id,
                    search.key
                );
                Ok(table.clone().with_source(table_info.id.clone()))
            }
            _ => Err(InputMappingError::AmbiguousResult(format!(
                "More than one table with metadata key: \"{}\" and value: \"{}\" was found: {}.",
                search.key,
                search.value,
                found.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join(",")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{FailurePoint, table_info};
    use crate::client::MemoryStorageClient;
    use serde_json::json;

    fn client() -> Arc<MemoryStorageClient> {
        let client = MemoryStorageClient::new("1");
        client.add_table(table_info("in.c-main.a", "snowflake", &["Id"]), vec![]);
        client.add_table(table_info("in.c-main.b", "snowflake", &["Id"]), vec![]);
        client.add_table(table_info("in.c-main.c", "snowflake", &["Id"]), vec![]);
        client.set_table_metadata("in.c-main.a", "table.key", "unique");
        client.set_table_metadata("in.c-main.b", "table.key", "shared");
        client.set_table_metadata("in.c-main.c", "table.key", "shared");
        Arc::new(client)
    }

    fn search(value: &str) -> InputTableOptionsList {
        InputTableOptionsList::parse(&[
            json!({"source": "in.c-main.c", "destination": "c.csv"}),
            json!({
                "source_search": {"key": "table.key", "value": value},
                "destination": "found.csv",
            }),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_single_match() {
        let resolver = TableDefinitionResolver::new(client());
        let resolved = resolver.resolve(&search("unique")).await.unwrap();
        assert_eq!(resolved.tables()[0].source(), "in.c-main.c");
        assert_eq!(resolved.tables()[1].source(), "in.c-main.a");
        assert_eq!(resolved.tables()[1].destination(), "found.csv");
        assert!(resolved.tables()[1].source_search().is_none());
    }

    #[tokio::test]
    async fn test_resolve_no_match() {
        let resolver = TableDefinitionResolver::new(client());
        let err = resolver.resolve(&search("missing")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Table with metadata key: \"table.key\" and value: \"missing\" was not found."
        );
    }

    #[tokio::test]
    async fn test_resolve_ambiguous() {
        let resolver = TableDefinitionResolver::new(client());
        let err = resolver.resolve(&search("shared")).await.unwrap_err();
        assert!(matches!(err, InputMappingError::AmbiguousResult(_)));
        assert_eq!(
            err.to_string(),
            "More than one table with metadata key: \"table.key\" and value: \"shared\" was found: in.c-main.b,in.c-main.c."
        );
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let client = client();
        client.fail(FailurePoint::SearchTables, "search backend down");
        let resolver = TableDefinitionResolver::new(client);
        let err = resolver.resolve(&search("unique")).await.unwrap_err();
        assert!(matches!(err, InputMappingError::RemoteOperation { .. }));
    }
}
