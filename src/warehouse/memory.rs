use anyhow::{anyhow, bail, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use super::{TableSink, TableSource};
use crate::config::TableRef;

/// In-process stand-in for the warehouse, keyed by `project.dataset.table`.
#[derive(Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, RecordBatch>>,
    writes: Mutex<Vec<(String, u64)>>,
    fail_writes: AtomicBool,
}

impl MemoryWarehouse {
    pub fn put(&self, table: &TableRef, batch: RecordBatch) {
        self.tables.lock().unwrap().insert(table.to_string(), batch);
    }

    pub fn get(&self, table: &TableRef) -> Option<RecordBatch> {
        self.tables.lock().unwrap().get(&table.to_string()).cloned()
    }

    /// `(table, rows)` for every successful replace, oldest first.
    pub fn writes(&self) -> Vec<(String, u64)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableSource for MemoryWarehouse {
    async fn fetch_table(&self, table: &TableRef) -> Result<RecordBatch> {
        self.get(table)
            .ok_or_else(|| anyhow!("Not found: Table {}", table))
    }
}

#[async_trait]
impl TableSink for MemoryWarehouse {
    async fn replace_table(&self, table: &TableRef, batch: &RecordBatch) -> Result<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Access Denied: Table {}", table);
        }
        let rows = batch.num_rows() as u64;
        self.put(table, batch.clone());
        self.writes.lock().unwrap().push((table.to_string(), rows));
        Ok(rows)
    }
}
