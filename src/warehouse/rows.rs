// src/warehouse/rows.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{
        ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
        TimestampMicrosecondArray,
    },
    datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, sync::Arc};

use crate::incidents::date_parser::parse_timestamp_micros;

static NULL: Value = Value::Null;

/// `schema` object of a BigQuery query response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// One row in the `{"f": [{"v": ...}]}` wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

/// Map a BigQuery column type + mode onto an Arrow DataType.
///
/// - STRING, BYTES, GEOGRAPHY, JSON, TIME → Utf8
/// - INTEGER, INT64                        → Int64
/// - FLOAT, FLOAT64, NUMERIC, BIGNUMERIC   → Float64
/// - BOOLEAN, BOOL                         → Boolean
/// - TIMESTAMP                             → Timestamp(µs, UTC)
/// - DATETIME                              → Timestamp(µs)
/// - DATE                                  → Date32
/// - REPEATED fields, RECORD/STRUCT        → Utf8 (raw JSON)
pub fn map_to_arrow_type(field: &TableFieldSchema) -> DataType {
    if field.mode.as_deref() == Some("REPEATED") {
        return DataType::Utf8;
    }
    match field.field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => DataType::Int64,
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => DataType::Float64,
        "BOOLEAN" | "BOOL" => DataType::Boolean,
        "TIMESTAMP" => DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC"))),
        "DATETIME" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "DATE" => DataType::Date32,
        _ => DataType::Utf8,
    }
}

pub fn build_arrow_schema(schema: &TableSchema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields
        .iter()
        .map(|f| Field::new(&f.name, map_to_arrow_type(f), /* nullable = */ true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Materialize query rows into one RecordBatch. Any cell that does not fit
/// its declared type is an error.
pub fn rows_to_batch(schema: &TableSchema, rows: &[TableRow]) -> Result<RecordBatch> {
    let arrow_schema = build_arrow_schema(schema);

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields.len());
    for (col, field) in arrow_schema.fields().iter().enumerate() {
        let name = field.name();
        let array: ArrayRef = match field.data_type() {
            DataType::Int64 => Arc::new(Int64Array::from(parse_cells(rows, col, name, |s| {
                s.parse::<i64>().ok()
            })?)),
            DataType::Float64 => Arc::new(Float64Array::from(parse_cells(
                rows,
                col,
                name,
                |s| s.parse::<f64>().ok(),
            )?)),
            DataType::Boolean => Arc::new(BooleanArray::from(parse_cells(
                rows,
                col,
                name,
                |s| match s.to_ascii_lowercase().as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                },
            )?)),
            DataType::Timestamp(_, Some(tz)) => Arc::new(
                TimestampMicrosecondArray::from(parse_cells(rows, col, name, parse_bq_timestamp)?)
                    .with_timezone(tz.clone()),
            ),
            DataType::Timestamp(_, None) => Arc::new(TimestampMicrosecondArray::from(
                parse_cells(rows, col, name, parse_timestamp_micros)?,
            )),
            DataType::Date32 => Arc::new(Date32Array::from(parse_cells(
                rows,
                col,
                name,
                parse_days_since_epoch,
            )?)),
            _ => Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| text(cell(r, col)).map(Cow::into_owned))
                    .collect::<Vec<Option<String>>>(),
            )),
        };
        columns.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    RecordBatch::try_new_with_options(arrow_schema, columns, &options)
        .context("assembling query rows into a RecordBatch")
}

fn cell(row: &TableRow, col: usize) -> &Value {
    row.f.get(col).map(|c| &c.v).unwrap_or(&NULL)
}

fn text(v: &Value) -> Option<Cow<'_, str>> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

fn parse_cells<T, F>(rows: &[TableRow], col: usize, name: &str, parse: F) -> Result<Vec<Option<T>>>
where
    F: Fn(&str) -> Option<T>,
{
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        match text(cell(row, col)) {
            None => out.push(None),
            Some(s) => {
                let v = parse(&s)
                    .ok_or_else(|| anyhow!("row {}: column `{}`: cannot parse {:?}", i, name, s))?;
                out.push(Some(v));
            }
        }
    }
    Ok(out)
}

/// TIMESTAMP cells arrive as int64 micros (`useInt64Timestamp`) or, from
/// older endpoints, as float epoch seconds like `"1.7044128E9"`.
fn parse_bq_timestamp(s: &str) -> Option<i64> {
    if let Ok(micros) = s.parse::<i64>() {
        return Some(micros);
    }
    let secs = s.parse::<f64>().ok()?;
    Some((secs * 1_000_000.0).round() as i64)
}

fn parse_days_since_epoch(s: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    i32::try_from((date - epoch).num_days()).ok()
}
