//! Choice-based conjoint: conditional (multinomial) logit over choice sets,
//! partworths, willingness to pay and share simulation.

use crate::core::design::{Design, Encoder};
use crate::core::inference::wald_table;
use crate::core::linalg::{invert_spd, solve_spd};
use crate::domain::model::CoefficientRow;
use crate::utils::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-9;
// A step that grows |beta| this much while the log-likelihood stays flat
// means the estimate is running off to infinity.
const STALL_GAIN: f64 = 1e-10;
const STALL_GROWTH: f64 = 0.5;

fn separation_error(iterations: usize, beta: &Array1<f64>) -> AnalysisError {
    AnalysisError::model(format!(
        "conditional logit diverged after {} iterations (|beta| = {:.2}): likely perfect or quasi-separation of the choices",
        iterations,
        norm(beta)
    ))
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// Row ranges of one choice set in the design and the chosen row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceSet {
    pub rows: Vec<usize>,
    pub chosen: usize,
}

/// Groups rows by their choice-set key, preserving first-seen order.
pub fn group_choice_sets<K: Eq + Hash + Debug>(
    keys: &[K],
    chosen: &[f64],
) -> Result<Vec<ChoiceSet>> {
    let mut order: Vec<&K> = Vec::new();
    let mut members: HashMap<&K, Vec<usize>> = HashMap::new();
    for (row, key) in keys.iter().enumerate() {
        members
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    order
        .into_iter()
        .map(|key| {
            let rows = members.remove(key).unwrap_or_default();
            if rows.len() < 2 {
                return Err(AnalysisError::data(format!(
                    "choice set {:?} has fewer than two alternatives",
                    key
                )));
            }
            let picked: Vec<usize> = rows.iter().copied().filter(|&r| chosen[r] > 0.5).collect();
            match picked.as_slice() {
                [single] => Ok(ChoiceSet {
                    chosen: *single,
                    rows,
                }),
                _ => Err(AnalysisError::data(format!(
                    "choice set {:?} must have exactly one chosen alternative, found {}",
                    key,
                    picked.len()
                ))),
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChoiceModel {
    pub names: Vec<String>,
    pub beta: Array1<f64>,
    pub covariance: Array2<f64>,
    pub coefficients: Vec<CoefficientRow>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub n_sets: usize,
    pub n_alternatives: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceStatistics {
    pub n_sets: usize,
    pub n_alternatives: usize,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub pseudo_r_squared: f64,
    pub aic: f64,
    pub iterations: usize,
}

/// Log-likelihood, gradient and information matrix at `beta`.
fn evaluate(
    x: &Array2<f64>,
    sets: &[ChoiceSet],
    beta: &Array1<f64>,
) -> (f64, Array1<f64>, Array2<f64>) {
    let k = beta.len();
    let utility = x.dot(beta);
    let mut ll = 0.0;
    let mut gradient = Array1::<f64>::zeros(k);
    let mut information = Array2::<f64>::zeros((k, k));

    for set in sets {
        let max_u = set
            .rows
            .iter()
            .map(|&r| utility[r])
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = set.rows.iter().map(|&r| (utility[r] - max_u).exp()).collect();
        let denom: f64 = weights.iter().sum();
        ll += utility[set.chosen] - max_u - denom.ln();

        let mut mean = Array1::<f64>::zeros(k);
        for (&r, &w) in set.rows.iter().zip(weights.iter()) {
            mean.scaled_add(w / denom, &x.row(r));
        }
        gradient += &(&x.row(set.chosen) - &mean);

        for (&r, &w) in set.rows.iter().zip(weights.iter()) {
            let d = &x.row(r) - &mean;
            let prob = w / denom;
            for a in 0..k {
                for b in 0..k {
                    information[[a, b]] += prob * d[a] * d[b];
                }
            }
        }
    }

    (ll, gradient, information)
}

/// Newton–Raphson with step halving on the conditional-logit likelihood.
pub fn fit(design: &Design, sets: &[ChoiceSet]) -> Result<ChoiceModel> {
    let x = &design.x;
    let k = x.ncols();
    if sets.is_empty() {
        return Err(AnalysisError::data("no choice sets to fit"));
    }
    if k == 0 {
        return Err(AnalysisError::data("choice model has no attribute terms"));
    }

    let mut beta = Array1::<f64>::zeros(k);
    let (mut ll, mut gradient, mut information) = evaluate(x, sets, &beta);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let step = match solve_spd(&information, &gradient) {
            Ok(step) => step,
            Err(_) if iterations > 1 => return Err(separation_error(iterations, &beta)),
            Err(e) => return Err(e),
        };

        let mut scale = 1.0;
        let (mut next_beta, mut next) = loop {
            let candidate = &beta + &(&step * scale);
            let evaluated = evaluate(x, sets, &candidate);
            if evaluated.0 >= ll - 1e-12 || scale < 1e-6 {
                break (candidate, evaluated);
            }
            scale *= 0.5;
        };
        std::mem::swap(&mut beta, &mut next_beta);
        let max_step = (&beta - &next_beta)
            .iter()
            .fold(0.0_f64, |acc, s| acc.max(s.abs()));
        tracing::debug!(
            "conditional logit iteration {}: log-likelihood {:.6}, step scale {}",
            iterations,
            next.0,
            scale
        );

        let gain = next.0 - ll;
        let growth = norm(&beta) - norm(&next_beta);
        ll = next.0;
        std::mem::swap(&mut gradient, &mut next.1);
        std::mem::swap(&mut information, &mut next.2);

        if max_step < TOLERANCE {
            converged = true;
            break;
        }
        if gain.abs() < STALL_GAIN && growth > STALL_GROWTH {
            return Err(separation_error(iterations, &beta));
        }
    }

    if !converged {
        return Err(AnalysisError::model(format!(
            "conditional logit did not converge in {} iterations (possible separation of the choices)",
            MAX_ITERATIONS
        )));
    }

    let covariance = invert_spd(&information)?;
    let coefficients = wald_table(&design.names, &beta, &covariance)?;
    let null_log_likelihood = sets.iter().map(|s| -(s.rows.len() as f64).ln()).sum();

    tracing::info!(
        "Conditional logit converged after {} iterations over {} choice sets",
        iterations,
        sets.len()
    );

    Ok(ChoiceModel {
        names: design.names.clone(),
        beta,
        covariance,
        coefficients,
        log_likelihood: ll,
        null_log_likelihood,
        n_sets: sets.len(),
        n_alternatives: x.nrows(),
        iterations,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct WillingnessToPay {
    pub term: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductShare {
    pub name: String,
    pub utility: f64,
    pub share: f64,
}

impl ChoiceModel {
    pub fn statistics(&self) -> ChoiceStatistics {
        ChoiceStatistics {
            n_sets: self.n_sets,
            n_alternatives: self.n_alternatives,
            log_likelihood: self.log_likelihood,
            null_log_likelihood: self.null_log_likelihood,
            pseudo_r_squared: 1.0 - self.log_likelihood / self.null_log_likelihood,
            aic: 2.0 * self.beta.len() as f64 - 2.0 * self.log_likelihood,
            iterations: self.iterations,
        }
    }

    /// Partworths grouped by attribute; reference levels carry zero utility.
    pub fn partworths(&self, encoder: &Encoder) -> BTreeMap<String, Vec<(String, f64)>> {
        let mut grouped: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for (column, reference) in encoder.references() {
            grouped
                .entry(column.to_string())
                .or_default()
                .push((reference.to_string(), 0.0));
        }
        for (name, &b) in self.names.iter().zip(self.beta.iter()) {
            match name.split_once("[T.") {
                Some((column, rest)) => {
                    let level = rest.trim_end_matches(']');
                    grouped
                        .entry(column.to_string())
                        .or_default()
                        .push((level.to_string(), b));
                }
                None => grouped.entry(name.clone()).or_default().push((name.clone(), b)),
            }
        }
        grouped
    }

    /// Dollar value of each attribute coefficient: `-beta_k / beta_price`.
    pub fn willingness_to_pay(&self, price_term: &str) -> Result<Vec<WillingnessToPay>> {
        let idx = self
            .names
            .iter()
            .position(|n| n == price_term)
            .ok_or_else(|| {
                AnalysisError::data(format!(
                    "price term '{}' is not a numeric term of the choice model",
                    price_term
                ))
            })?;
        let price = self.beta[idx];
        if price == 0.0 || !price.is_finite() {
            return Err(AnalysisError::model(
                "price coefficient is zero; willingness to pay is undefined",
            ));
        }
        if price > 0.0 {
            tracing::warn!(
                "Price coefficient is positive ({:.4}); willingness-to-pay signs are inverted",
                price
            );
        }

        Ok(self
            .names
            .iter()
            .zip(self.beta.iter())
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, (name, &b))| WillingnessToPay {
                term: name.clone(),
                value: -b / price,
            })
            .collect())
    }

    /// Logit shares of a set of competing product profiles.
    pub fn simulate_shares(
        &self,
        encoder: &Encoder,
        products: &[(String, HashMap<String, String>)],
    ) -> Result<Vec<ProductShare>> {
        if products.is_empty() {
            return Err(AnalysisError::data("market simulation needs at least one product"));
        }
        let utilities = products
            .iter()
            .map(|(_, profile)| encoder.encode_profile(profile).map(|row| row.dot(&self.beta)))
            .collect::<Result<Vec<f64>>>()?;

        Ok(products
            .iter()
            .map(|(name, _)| name.clone())
            .zip(utilities.iter().copied())
            .zip(softmax(&utilities))
            .map(|((name, utility), share)| ProductShare {
                name,
                utility,
                share,
            })
            .collect())
    }
}

pub fn softmax(utilities: &[f64]) -> Vec<f64> {
    let max_u = utilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = utilities.iter().map(|u| (u - max_u).exp()).collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}
