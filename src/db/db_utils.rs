use arrow::json::writer::{JsonArray, WriterBuilder};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use duckdb::types::{ToSql, ToSqlOutput, Value};
use serde::Serialize;
use serde_json::Map;

/// One JSON object per result row, keyed by column name.
pub type Row = Map<String, serde_json::Value>;

/// A value bound to a positional `$n` marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlParam::Text(text) => Value::Text(text.clone()),
            SqlParam::Int(int) => Value::BigInt(*int),
            SqlParam::Float(float) => Value::Double(*float),
            // DuckDB casts the ISO text to the DATE type the statement expects.
            SqlParam::Date(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(value: NaiveDate) -> Self {
        SqlParam::Date(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

/// Converts Arrow record batches to JSON rows. Null cells are kept as
/// explicit `null` so every row carries every column.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, String> {
    if batches.iter().all(|batch| batch.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());

    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .map_err(|e| format!("Failed to encode rows: {}", e))?;
    writer
        .finish()
        .map_err(|e| format!("Failed to encode rows: {}", e))?;

    let buffer = writer.into_inner();
    if buffer.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&buffer).map_err(|e| format!("Failed to decode rows: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn nulls_are_kept_as_explicit_keys() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("qty", DataType::Int32, true),
            Field::new("price", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("Doliprane"), None])),
                Arc::new(Int32Array::from(vec![Some(3), None])),
                Arc::new(Float64Array::from(vec![Some(2.5), Some(1.0)])),
            ],
        )
        .expect("valid batch");

        let rows = batches_to_rows(&[batch]).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Doliprane");
        assert_eq!(rows[0]["qty"], 3);
        assert!(rows[1]["name"].is_null());
        assert!(rows[1].contains_key("qty"));
    }

    #[test]
    fn no_batches_means_no_rows() {
        assert!(batches_to_rows(&[]).expect("rows").is_empty());
    }

    #[test]
    fn dates_bind_as_iso_text() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        let param = SqlParam::Date(date);
        let output = param.to_sql().expect("to_sql");
        match output {
            ToSqlOutput::Owned(Value::Text(text)) => assert_eq!(text, "2024-03-09"),
            other => panic!("unexpected binding {other:?}"),
        }
    }
}
