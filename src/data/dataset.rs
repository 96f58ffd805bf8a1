//! Named numeric columns over a row-major matrix

use ndarray::{concatenate, Array1, Array2, Axis};
use polars::prelude::*;
use serde_json::{Map, Value};

use crate::error::{CrashcastError, Result};

/// An ordered set of named f64 columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(CrashcastError::Shape {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        Ok(Self { columns, values })
    }

    /// Build a dataset from a DataFrame, dropping any row with a missing
    /// or non-numeric cell. Returns the dataset and the dropped row count.
    pub fn from_frame_dropping_missing(df: &DataFrame) -> Result<(Self, usize)> {
        let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

        let col_data: Vec<Vec<Option<f64>>> = df
            .get_columns()
            .iter()
            .map(|column| -> Result<Vec<Option<f64>>> {
                let as_f64 = column.cast(&DataType::Float64)?;
                let values = as_f64
                    .f64()?
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()))
                    .collect();
                Ok(values)
            })
            .collect::<Result<_>>()?;

        let kept: Vec<usize> = (0..df.height())
            .filter(|&row| col_data.iter().all(|col| col[row].is_some()))
            .collect();
        let dropped = df.height() - kept.len();

        let values = Array2::from_shape_fn((kept.len(), columns.len()), |(r, c)| {
            col_data[c][kept[r]].unwrap_or(0.0)
        });

        Ok((Self { columns, values }, dropped))
    }

    /// Build a dataset from JSON records. Columns are the union of keys in
    /// first-appearance order; absent keys and non-numeric values become 0.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let values = Array2::from_shape_fn((records.len(), columns.len()), |(r, c)| {
            records[r].get(&columns[c]).map(coerce_numeric).unwrap_or(0.0)
        });

        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<Array1<f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| CrashcastError::FeatureNotFound(name.to_string()))?;
        Ok(self.values.column(idx).to_owned())
    }

    /// Rows at the given indices, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// Remove a column and return its values.
    pub fn pop_column(&mut self, name: &str) -> Result<Array1<f64>> {
        let popped = self.column(name)?;
        self.drop_column(name);
        Ok(popped)
    }

    /// Remove a column if present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        let keep: Vec<usize> = (0..self.columns.len()).filter(|&c| c != idx).collect();
        self.values = self.values.select(Axis(1), &keep);
        self.columns.remove(idx);
        true
    }

    /// Append a column at the end.
    pub fn push_column(&mut self, name: impl Into<String>, values: Array1<f64>) -> Result<()> {
        if values.len() != self.n_rows() {
            return Err(CrashcastError::Shape {
                expected: format!("{} rows", self.n_rows()),
                actual: format!("{} rows", values.len()),
            });
        }
        let column = values.insert_axis(Axis(1));
        self.values = concatenate(Axis(1), &[self.values.view(), column.view()])?;
        self.columns.push(name.into());
        Ok(())
    }

    /// Apply `f` to every value in place.
    pub fn map_values_inplace(&mut self, f: impl Fn(f64) -> f64) {
        self.values.mapv_inplace(f);
    }

    pub fn into_parts(self) -> (Vec<String>, Array2<f64>) {
        (self.columns, self.values)
    }
}

/// Convert a DataFrame into JSON records, one per row, keyed by column name.
///
/// Cells are cast to numbers; missing or unparsable cells become `null`.
pub fn frame_to_records(df: &DataFrame) -> Result<Vec<Map<String, Value>>> {
    let mut records = vec![Map::new(); df.height()];
    for column in df.get_columns() {
        let name = column.name().to_string();
        let as_f64 = column.cast(&DataType::Float64)?;
        for (record, cell) in records.iter_mut().zip(as_f64.f64()?.into_iter()) {
            let value = cell
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number);
            record.insert(name.clone(), value);
        }
    }
    Ok(records)
}

/// Lenient numeric coercion for request values.
///
/// Numbers pass through, numeric strings are parsed, booleans map to 1/0,
/// everything else (including NaN) becomes 0.
pub fn coerce_numeric(value: &Value) -> f64 {
    let v = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
    };
    if v.is_nan() {
        0.0
    } else {
        v
    }
}
