// src/warehouse/mod.rs

pub mod auth;
pub mod bigquery;
pub mod encode;
pub mod rows;

#[cfg(test)]
mod memory;

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::config::TableRef;

pub use bigquery::BigQueryClient;
#[cfg(test)]
pub use memory::MemoryWarehouse;

/// Something the incident table can be read from.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Every row and column of `table`.
    async fn fetch_table(&self, table: &TableRef) -> Result<RecordBatch>;
}

/// Something the incident table can be written back to.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Replace the contents of `table` with `batch`, creating it if needed.
    /// Returns the number of rows written.
    async fn replace_table(&self, table: &TableRef, batch: &RecordBatch) -> Result<u64>;
}
