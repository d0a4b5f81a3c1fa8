//! Results of a table download

use serde::Serialize;

use crate::client::{JobResult, TableInfo};
use crate::state::InputTableStateList;

/// Summary of one staged table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
    pub last_import_date: Option<String>,
    pub last_change_date: Option<String>,
    pub data_size_bytes: u64,
    pub rows_count: u64,
}

impl From<&TableInfo> for TableSummary {
    fn from(table: &TableInfo) -> Self {
        Self {
            id: table.id.clone(),
            name: table.name.clone(),
            columns: table.columns.clone(),
            last_import_date: table.last_import_date.clone(),
            last_change_date: table.last_change_date.clone(),
            data_size_bytes: table.data_size_bytes,
            rows_count: table.rows_count,
        }
    }
}

/// Totals reported by the remote jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub jobs: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl From<&[JobResult]> for Metrics {
    fn from(jobs: &[JobResult]) -> Self {
        jobs.iter().fold(
            Metrics {
                jobs: jobs.len(),
                ..Default::default()
            },
            |mut metrics, job| {
                metrics.input_bytes += job.metrics.in_bytes;
                metrics.output_bytes += job.metrics.out_bytes;
                metrics
            },
        )
    }
}

/// Outcome of [`crate::reader::Reader::download_tables`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablesResult {
    pub tables: Vec<TableSummary>,
    pub metrics: Option<Metrics>,
    /// State to persist for the next incremental run
    pub state: InputTableStateList,
}

impl TablesResult {
    pub fn add_table(&mut self, table: &TableInfo) {
        self.tables.push(TableSummary::from(table));
    }

    pub fn table(&self, id: &str) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.id == id)
    }
}
