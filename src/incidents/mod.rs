// src/incidents/mod.rs

pub mod aggregate;
pub mod date_parser;
pub mod filter;
pub mod loader;

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray},
    compute::cast,
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::{collections::HashSet, sync::Arc};

pub use aggregate::{count_by_category, count_by_month, CategoryCount, MonthlyCount};
pub use filter::{FilteredView, Selection};
pub use loader::load_incidents;

pub const CATEGORY: &str = "Category";
pub const SERVICE_TYPE: &str = "Service_Type";
pub const DATE_CREATED: &str = "Date_Created";
pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";

/// Arrow type a zone-less `Date_Created` column (text, dates, naive
/// timestamps) is normalized to. Zoned timestamps keep their zone.
pub fn date_created_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

/// The full incident table, loaded once and shared read-only.
///
/// Holds every column the warehouse returned. The five columns the dashboard
/// reads are normalized on construction: `Category`/`Service_Type` to Utf8,
/// `Date_Created` to a microsecond timestamp, coordinates to Float64.
#[derive(Debug, Clone)]
pub struct IncidentTable {
    batch: RecordBatch,
}

impl IncidentTable {
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        let batch = normalize_column(batch, CATEGORY, &DataType::Utf8)?;
        let batch = normalize_column(batch, SERVICE_TYPE, &DataType::Utf8)?;
        let batch = normalize_column(batch, LATITUDE, &DataType::Float64)?;
        let batch = normalize_column(batch, LONGITUDE, &DataType::Float64)?;
        let batch = normalize_date_created(batch)?;
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn latitudes(&self) -> Result<&Float64Array> {
        float_column(&self.batch, LATITUDE)
    }

    pub fn longitudes(&self) -> Result<&Float64Array> {
        float_column(&self.batch, LONGITUDE)
    }

    /// Distinct non-null values of a text column, in first-seen order.
    pub fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        let values = string_column(&self.batch, column)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for v in values.iter().flatten() {
            if seen.insert(v) {
                out.push(v.to_string());
            }
        }
        Ok(out)
    }
}

pub(crate) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column `{}`", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column `{}` is not Utf8", name))
}

pub(crate) fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column `{}`", name))?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| anyhow!("column `{}` is not Float64", name))
}

pub(crate) fn timestamp_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a TimestampMicrosecondArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column `{}`", name))?
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .ok_or_else(|| anyhow!("column `{}` is not a microsecond timestamp", name))
}

/// Swap column `idx` (and its schema field) for `array`.
fn replace_column(batch: RecordBatch, idx: usize, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[idx] = Field::new(fields[idx].name(), array.data_type().clone(), true);

    let mut columns = batch.columns().to_vec();
    columns[idx] = array;

    let new_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(new_schema, columns).context("rebuilding incident batch")
}

fn normalize_column(batch: RecordBatch, name: &str, target: &DataType) -> Result<RecordBatch> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow!("required column `{}` not found", name))?;
    let column = batch.column(idx);
    if column.data_type() == target {
        return Ok(batch);
    }
    let converted = cast(column, target)
        .with_context(|| format!("casting column `{}` to {}", name, target))?;
    replace_column(batch, idx, converted)
}

/// Coerce `Date_Created` to a µs timestamp. A zoned timestamp keeps its
/// zone. Text is parsed value by value; any non-null value that does not
/// parse fails the whole load.
fn normalize_date_created(batch: RecordBatch) -> Result<RecordBatch> {
    let idx = batch
        .schema()
        .index_of(DATE_CREATED)
        .map_err(|_| anyhow!("required column `{}` not found", DATE_CREATED))?;
    let column = batch.column(idx).clone();
    let target = date_created_type();

    let converted: ArrayRef = match column.data_type() {
        dt if *dt == target => return Ok(batch),
        DataType::Timestamp(TimeUnit::Microsecond, Some(_)) => return Ok(batch),
        DataType::Timestamp(_, Some(tz)) => {
            let zoned = DataType::Timestamp(TimeUnit::Microsecond, Some(tz.clone()));
            cast(&column, &zoned)
                .with_context(|| format!("casting `{}` to a timestamp", DATE_CREATED))?
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text = cast(&column, &DataType::Utf8)?;
            let text = text
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow!("`{}` did not cast to Utf8", DATE_CREATED))?;
            let mut parsed = Vec::with_capacity(text.len());
            for (row, value) in text.iter().enumerate() {
                match value {
                    None => parsed.push(None),
                    Some(s) => match date_parser::parse_timestamp_micros(s) {
                        Some(micros) => parsed.push(Some(micros)),
                        None => bail!(
                            "row {}: cannot parse `{}` value {:?} as a date",
                            row,
                            DATE_CREATED,
                            s
                        ),
                    },
                }
            }
            Arc::new(TimestampMicrosecondArray::from(parsed))
        }
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => cast(&column, &target)
            .with_context(|| format!("casting `{}` to a timestamp", DATE_CREATED))?,
        other => bail!("`{}` has unsupported type {}", DATE_CREATED, other),
    };
    replace_column(batch, idx, converted)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use arrow::array::{Int64Array, StringArray};

    /// One incident row: category, service type, date, lat, lon.
    pub type Row<'a> = (
        Option<&'a str>,
        Option<&'a str>,
        Option<&'a str>,
        Option<f64>,
        Option<f64>,
    );

    pub fn batch(rows: &[Row]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Incident_ID", DataType::Int64, true),
            Field::new(CATEGORY, DataType::Utf8, true),
            Field::new(SERVICE_TYPE, DataType::Utf8, true),
            Field::new(DATE_CREATED, DataType::Utf8, true),
            Field::new(LATITUDE, DataType::Float64, true),
            Field::new(LONGITUDE, DataType::Float64, true),
        ]));
        let ids: Int64Array = (0..rows.len() as i64).map(Some).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(ids),
                Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
                Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
                Arc::new(StringArray::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.4).collect::<Vec<_>>())),
            ],
        )
        .unwrap()
    }

    pub fn table(rows: &[Row]) -> IncidentTable {
        IncidentTable::try_new(batch(rows)).unwrap()
    }

    /// `sample_table`'s batch with `Date_Created` as a UTC timestamp, the
    /// way a BigQuery TIMESTAMP column arrives.
    pub fn utc_sample_batch() -> RecordBatch {
        let batch = sample_table().batch().clone();
        let idx = batch.schema().index_of(DATE_CREATED).unwrap();
        let utc = DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC")));
        let dates = cast(batch.column(idx), &utc).unwrap();
        replace_column(batch, idx, dates).unwrap()
    }

    /// The three-row pothole/graffiti table used across the pipeline tests.
    pub fn sample_table() -> IncidentTable {
        table(&[
            (
                Some("Pothole"),
                Some("Streets"),
                Some("2024-01-05"),
                Some(37.30),
                Some(-121.90),
            ),
            (
                Some("Pothole"),
                Some("Streets"),
                Some("2024-02-10"),
                Some(37.34),
                Some(-121.88),
            ),
            (
                Some("Graffiti"),
                Some("Parks"),
                Some("2024-01-20"),
                Some(37.38),
                Some(-121.86),
            ),
        ])
    }
}
