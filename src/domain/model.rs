use crate::utils::error::{AnalysisError, Result};
use serde::Serialize;
use std::collections::BTreeSet;

/// Rows of string cells exactly as read from a CSV source.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!("Parsed CSV with {} columns and {} rows", headers.len(), rows.len());
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| {
                AnalysisError::data(format!(
                    "column '{}' not found (available: {})",
                    name,
                    self.headers.join(", ")
                ))
            })
    }

    pub fn text_column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row[idx].parse::<f64>().map_err(|_| {
                    AnalysisError::data(format!(
                        "column '{}' row {}: '{}' is not numeric",
                        name,
                        i + 1,
                        row[idx]
                    ))
                })
            })
            .collect()
    }

    /// True when every non-blank cell of the column parses as a number and
    /// at least one cell is filled. Blank cells count as missing values.
    pub fn is_numeric(&self, name: &str) -> bool {
        self.column_index(name)
            .map(|idx| {
                let mut filled = self
                    .rows
                    .iter()
                    .map(|row| row[idx].as_str())
                    .filter(|cell| !cell.is_empty())
                    .peekable();
                filled.peek().is_some() && filled.all(|cell| cell.parse::<f64>().is_ok())
            })
            .unwrap_or(false)
    }

    /// Distinct values of a column in sorted order.
    pub fn levels(&self, name: &str) -> Result<Vec<String>> {
        let idx = self.column_index(name)?;
        let set: BTreeSet<&str> = self.rows.iter().map(|row| row[idx].as_str()).collect();
        Ok(set.into_iter().map(str::to_string).collect())
    }

    /// Removes rows with a blank cell in any of `columns`; returns how many were dropped.
    pub fn drop_incomplete(&mut self, columns: &[String]) -> Result<usize> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;

        let before = self.rows.len();
        self.rows
            .retain(|row| indices.iter().all(|&i| !row[i].is_empty()));
        Ok(before - self.rows.len())
    }
}

/// A named output file produced by an analysis.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn text(file_name: &str, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.to_string(),
            bytes: content.into().into_bytes(),
        }
    }
}

/// One row of a coefficient table, shared by the logit and conjoint models.
#[derive(Debug, Clone, Serialize)]
pub struct CoefficientRow {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_value: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub name: String,
    /// Human-readable diagnostics printed to stdout.
    pub summary: String,
    pub json: serde_json::Value,
    pub artifacts: Vec<Artifact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "id,tenure,Contract,TotalCharges\n\
                       1,12,Month-to-month,100.5\n\
                       2,24,Two year, \n\
                       3,1,One year,20\n";

    #[test]
    fn test_from_csv_bytes_trims_cells() {
        let table = Table::from_csv_bytes(CSV.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["id", "tenure", "Contract", "TotalCharges"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[1][3], "");
    }

    #[test]
    fn test_numeric_column_reports_bad_cell() {
        let table = Table::from_csv_bytes(CSV.as_bytes()).unwrap();
        assert_eq!(table.numeric_column("tenure").unwrap(), vec![12.0, 24.0, 1.0]);

        let err = table.numeric_column("TotalCharges").unwrap_err();
        assert!(err.to_string().contains("row 2"));
        assert!(table.is_numeric("tenure"));
        assert!(!table.is_numeric("Contract"));
    }

    #[test]
    fn test_blank_cells_do_not_make_a_column_text() {
        let table = Table::from_csv_bytes(CSV.as_bytes()).unwrap();
        assert!(table.is_numeric("TotalCharges"));

        let empty = Table::from_csv_bytes(b"a,b\n,1\n,2\n").unwrap();
        assert!(!empty.is_numeric("a"));
        assert!(empty.is_numeric("b"));

        let mixed = Table::from_csv_bytes(b"a\n1\n\nfoo\n").unwrap();
        assert!(!mixed.is_numeric("a"));
    }

    #[test]
    fn test_drop_incomplete() {
        let mut table = Table::from_csv_bytes(CSV.as_bytes()).unwrap();
        let dropped = table.drop_incomplete(&["TotalCharges".to_string()]).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric_column("TotalCharges").unwrap(), vec![100.5, 20.0]);
    }

    #[test]
    fn test_levels_are_sorted() {
        let table = Table::from_csv_bytes(CSV.as_bytes()).unwrap();
        assert_eq!(
            table.levels("Contract").unwrap(),
            vec!["Month-to-month", "One year", "Two year"]
        );
        assert!(table.levels("missing").is_err());
    }
}
