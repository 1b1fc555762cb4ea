//! Model matrices from tabular data, with treatment (dummy) coding of
//! categorical columns relative to a reference level.

use crate::domain::model::Table;
use crate::utils::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Numeric(String),
    Categorical {
        column: String,
        #[serde(default)]
        reference: Option<String>,
    },
}

impl Term {
    pub fn column(&self) -> &str {
        match self {
            Term::Numeric(column) => column,
            Term::Categorical { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone)]
enum EncodedTerm {
    Numeric {
        column: String,
    },
    Categorical {
        column: String,
        reference: String,
        /// Non-reference levels, one dummy column each.
        levels: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Design {
    pub names: Vec<String>,
    pub x: Array2<f64>,
}

/// Remembers the level sets found at fit time so new profiles encode the same way.
#[derive(Debug, Clone)]
pub struct Encoder {
    intercept: bool,
    terms: Vec<EncodedTerm>,
    names: Vec<String>,
}

impl Encoder {
    pub fn fit(table: &Table, terms: &[Term], intercept: bool) -> Result<Self> {
        let mut encoded = Vec::with_capacity(terms.len());
        let mut names = Vec::new();
        if intercept {
            names.push("Intercept".to_string());
        }

        for term in terms {
            match term {
                Term::Numeric(column) => {
                    table.column_index(column)?;
                    names.push(column.clone());
                    encoded.push(EncodedTerm::Numeric {
                        column: column.clone(),
                    });
                }
                Term::Categorical { column, reference } => {
                    let all_levels = table.levels(column)?;
                    let reference = match reference {
                        Some(r) if all_levels.contains(r) => r.clone(),
                        Some(r) => {
                            return Err(AnalysisError::data(format!(
                                "reference level '{}' does not occur in column '{}' (levels: {})",
                                r,
                                column,
                                all_levels.join(", ")
                            )))
                        }
                        None => all_levels.first().cloned().ok_or_else(|| {
                            AnalysisError::data(format!("column '{}' has no values", column))
                        })?,
                    };
                    let levels: Vec<String> = all_levels
                        .into_iter()
                        .filter(|level| *level != reference)
                        .collect();
                    if levels.is_empty() {
                        tracing::warn!(
                            "Column '{}' has a single level '{}' and contributes no dummies",
                            column,
                            reference
                        );
                    }
                    names.extend(levels.iter().map(|l| dummy_name(column, l)));
                    encoded.push(EncodedTerm::Categorical {
                        column: column.clone(),
                        reference,
                        levels,
                    });
                }
            }
        }

        Ok(Self {
            intercept,
            terms: encoded,
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of a numeric term's column in the design.
    pub fn numeric_position(&self, column: &str) -> Option<usize> {
        let mut position = usize::from(self.intercept);
        for term in &self.terms {
            match term {
                EncodedTerm::Numeric { column: c } if c == column => return Some(position),
                EncodedTerm::Numeric { .. } => position += 1,
                EncodedTerm::Categorical { levels, .. } => position += levels.len(),
            }
        }
        None
    }

    /// (column, reference level) for every categorical term.
    pub fn references(&self) -> Vec<(&str, &str)> {
        self.terms
            .iter()
            .filter_map(|t| match t {
                EncodedTerm::Categorical {
                    column, reference, ..
                } => Some((column.as_str(), reference.as_str())),
                EncodedTerm::Numeric { .. } => None,
            })
            .collect()
    }

    pub fn transform(&self, table: &Table) -> Result<Design> {
        let n = table.len();
        let p = self.names.len();
        let mut x = Array2::<f64>::zeros((n, p));
        let mut offset = 0;

        if self.intercept {
            x.column_mut(0).fill(1.0);
            offset = 1;
        }

        for term in &self.terms {
            match term {
                EncodedTerm::Numeric { column } => {
                    let values = table.numeric_column(column)?;
                    x.column_mut(offset).assign(&Array1::from(values));
                    offset += 1;
                }
                EncodedTerm::Categorical { column, levels, .. } => {
                    let cells = table.text_column(column)?;
                    for (i, cell) in cells.iter().enumerate() {
                        if let Some(k) = levels.iter().position(|l| l == cell) {
                            x[[i, offset + k]] = 1.0;
                        }
                    }
                    offset += levels.len();
                }
            }
        }

        Ok(Design {
            names: self.names.clone(),
            x,
        })
    }

    /// Encodes a single attribute profile such as a simulated product.
    pub fn encode_profile(&self, profile: &HashMap<String, String>) -> Result<Array1<f64>> {
        let mut row = Array1::<f64>::zeros(self.names.len());
        let mut offset = 0;

        if self.intercept {
            row[0] = 1.0;
            offset = 1;
        }

        for term in &self.terms {
            match term {
                EncodedTerm::Numeric { column } => {
                    let raw = lookup(profile, column)?;
                    row[offset] = raw.trim().parse::<f64>().map_err(|_| {
                        AnalysisError::data(format!(
                            "profile value '{}' for '{}' is not numeric",
                            raw, column
                        ))
                    })?;
                    offset += 1;
                }
                EncodedTerm::Categorical {
                    column,
                    reference,
                    levels,
                } => {
                    let raw = lookup(profile, column)?;
                    let value = raw.trim();
                    if let Some(k) = levels.iter().position(|l| l == value) {
                        row[offset + k] = 1.0;
                    } else if value != reference {
                        return Err(AnalysisError::data(format!(
                            "profile level '{}' is unknown for '{}'",
                            value, column
                        )));
                    }
                    offset += levels.len();
                }
            }
        }

        Ok(row)
    }
}

fn lookup<'a>(profile: &'a HashMap<String, String>, column: &str) -> Result<&'a str> {
    profile
        .get(column)
        .map(String::as_str)
        .ok_or_else(|| AnalysisError::data(format!("profile is missing attribute '{}'", column)))
}

pub fn dummy_name(column: &str, level: &str) -> String {
    format!("{}[T.{}]", column, level)
}

/// 0/1 response vector. With a positive label, cells equal to it are 1;
/// otherwise cells must already be 0 or 1.
pub fn binary_response(
    table: &Table,
    column: &str,
    positive_label: Option<&str>,
) -> Result<Array1<f64>> {
    let cells = table.text_column(column)?;
    let values = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| match positive_label {
            Some(label) => Ok(if *cell == label { 1.0 } else { 0.0 }),
            None => match cell.parse::<f64>() {
                Ok(v) if v == 0.0 || v == 1.0 => Ok(v),
                _ => Err(AnalysisError::data(format!(
                    "column '{}' row {}: '{}' is not 0/1",
                    column,
                    i + 1,
                    cell
                ))),
            },
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Array1::from(values))
}
