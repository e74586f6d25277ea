use anyhow::{Context, Result};
use std::time::Instant;
use tracing::info;

use super::IncidentTable;
use crate::{config::TableRef, warehouse::TableSource};

/// Read the whole source table once and normalize it. No retry: any
/// warehouse or schema error ends startup.
pub async fn load_incidents<S>(source: &S, table: &TableRef) -> Result<IncidentTable>
where
    S: TableSource + ?Sized,
{
    let start = Instant::now();
    info!(table = %table, "loading incidents");

    let batch = source
        .fetch_table(table)
        .await
        .with_context(|| format!("querying {}", table))?;
    let incidents =
        IncidentTable::try_new(batch).with_context(|| format!("normalizing {}", table))?;

    info!(
        table = %table,
        rows = incidents.num_rows(),
        elapsed = ?start.elapsed(),
        "incidents loaded"
    );
    Ok(incidents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidents::test_support::{batch, sample_table};
    use crate::warehouse::MemoryWarehouse;
    use arrow::record_batch::RecordBatch;

    fn source_ref() -> TableRef {
        TableRef {
            project_id: "sid-dev-452700".to_string(),
            dataset_id: "SanJoseServiceRequest".to_string(),
            table_id: "SJSR".to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_normalizes() {
        let wh = MemoryWarehouse::default();
        wh.put(
            &source_ref(),
            batch(&[(
                Some("Pothole"),
                Some("Streets"),
                Some("2024-01-05"),
                Some(37.3),
                Some(-121.9),
            )]),
        );

        let table = load_incidents(&wh, &source_ref()).await.unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(
            table.batch().schema().field_with_name("Date_Created").unwrap().data_type(),
            &crate::incidents::date_created_type()
        );
    }

    #[tokio::test]
    async fn test_missing_table_propagates() {
        let wh = MemoryWarehouse::default();
        let err = load_incidents(&wh, &source_ref()).await.unwrap_err();
        assert!(format!("{err:#}").contains("SJSR"), "{err:#}");
    }

    #[tokio::test]
    async fn test_schema_without_coordinates_fails() {
        let wh = MemoryWarehouse::default();
        let full: RecordBatch = sample_table().batch().clone();
        let idx = full.schema().index_of("Latitude").unwrap();
        let mut trimmed = full.clone();
        trimmed.remove_column(idx);
        wh.put(&source_ref(), trimmed);

        let err = load_incidents(&wh, &source_ref()).await.unwrap_err();
        assert!(format!("{err:#}").contains("Latitude"), "{err:#}");
    }
}
