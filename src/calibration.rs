use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::debug;

use crate::error::{CompileError, ErrorKind, Result};

/// Calibrated values of generated identifiers, used to evaluate conditions.
/// `None` marks a value that is not available.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibration {
    values: HashMap<String, Option<f64>>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.values.insert(name.into(), value);
    }

    /// Looks `name` up as written, then in upper case. `Some(None)` means the
    /// identifier is known but has no value.
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.values
            .get(name)
            .or_else(|| self.values.get(&name.to_uppercase()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads a CSV table whose first record holds identifiers and whose
    /// record `value_row` holds their values. `NA` and empty cells are not
    /// available.
    pub fn from_csv<R: Read>(reader: R, value_row: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let records = reader
            .records()
            .take(value_row + 1)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| calibration_error(e.to_string()))?;
        let names = records
            .first()
            .ok_or_else(|| calibration_error("missing header record".to_string()))?;
        let values = records
            .get(value_row)
            .ok_or_else(|| calibration_error(format!("missing value record {}", value_row)))?;
        let mut calibration = Calibration::new();
        for (name, cell) in names.iter().zip(values.iter()) {
            let cell = cell.trim();
            let value = if cell.is_empty() || cell == "NA" {
                None
            } else {
                Some(cell.parse::<f64>().map_err(|_| {
                    calibration_error(format!("value `{}` of `{}` is not a number", cell, name))
                })?)
            };
            calibration.insert(name.trim(), value);
        }
        debug!("loaded {} calibration values", calibration.len());
        Ok(calibration)
    }

    pub fn from_csv_path(path: &Path, value_row: usize) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            CompileError::from(ErrorKind::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })?;
        Self::from_csv(file, value_row)
    }
}

fn calibration_error(message: String) -> CompileError {
    ErrorKind::Calibration(message).into()
}

impl<S: Into<String>> FromIterator<(S, f64)> for Calibration {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), Some(value)))
                .collect(),
        }
    }
}
