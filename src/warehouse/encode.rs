use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};

/// Serialize `batch` as an in-memory Snappy Parquet file, the payload of a
/// load job.
pub fn batch_to_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
        .context("creating ArrowWriter for write-back")?;
    writer.write(batch).context("writing write-back batch")?;
    writer.close().context("closing write-back writer")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidents::{test_support::{sample_table, utc_sample_batch}, DATE_CREATED};
    use parquet::{arrow::arrow_reader::ParquetRecordBatchReaderBuilder, basic::LogicalType};
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn test_parquet_keeps_every_row() {
        let table = sample_table();
        let bytes = batch_to_parquet(table.batch()).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, table.num_rows());
    }

    #[test]
    fn test_utc_timestamp_stays_utc() {
        let batch = utc_sample_batch();
        let bytes = batch_to_parquet(&batch).unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let idx = batch.schema().index_of(DATE_CREATED).unwrap();
        assert!(matches!(
            builder.parquet_schema().column(idx).logical_type(),
            Some(LogicalType::Timestamp {
                is_adjusted_to_u_t_c: true,
                ..
            })
        ));
        assert_eq!(
            builder.schema().field(idx).data_type(),
            batch.schema().field(idx).data_type()
        );
    }
}
