//! Binary logistic regression (binomial GLM with logit link).

use crate::core::design::Design;
use crate::core::inference::{llr_p_value, wald_table};
use crate::core::linalg::{invert_spd, solve_spd};
use crate::domain::model::CoefficientRow;
use crate::utils::error::{AnalysisError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogitFit {
    pub names: Vec<String>,
    pub beta: Array1<f64>,
    pub covariance: Array2<f64>,
    pub coefficients: Vec<CoefficientRow>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub n_obs: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitStatistics {
    pub n_obs: usize,
    pub n_params: usize,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub pseudo_r_squared: f64,
    pub llr_p_value: f64,
    pub aic: f64,
    pub bic: f64,
    pub iterations: usize,
}

pub fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

fn log_likelihood(y: &Array1<f64>, eta: &Array1<f64>) -> f64 {
    // log(1 + e^eta) evaluated without overflow
    y.iter()
        .zip(eta.iter())
        .map(|(&yi, &e)| {
            let softplus = if e > 0.0 {
                e + (-e).exp().ln_1p()
            } else {
                e.exp().ln_1p()
            };
            yi * e - softplus
        })
        .sum()
}

fn bernoulli_log_likelihood(y: &Array1<f64>) -> f64 {
    let n = y.len() as f64;
    let p = y.sum() / n;
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    let positives = y.sum();
    positives * p.ln() + (n - positives) * (1.0 - p).ln()
}

/// Maximum-likelihood fit by Newton–Raphson, which coincides with IRLS for
/// the canonical link.
pub fn fit(design: &Design, y: &Array1<f64>, options: FitOptions) -> Result<LogitFit> {
    let x = &design.x;
    let (n, k) = x.dim();
    if n != y.len() {
        return Err(AnalysisError::data(format!(
            "design has {} rows but response has {}",
            n,
            y.len()
        )));
    }
    if n <= k {
        return Err(AnalysisError::data(format!(
            "need more observations ({}) than parameters ({})",
            n, k
        )));
    }
    let positives = y.sum();
    if positives == 0.0 || positives == n as f64 {
        return Err(AnalysisError::model(
            "response has a single outcome class; nothing to fit",
        ));
    }

    let mut beta = Array1::<f64>::zeros(k);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;
        let eta = x.dot(&beta);
        let p = eta.mapv(sigmoid);
        let w = p.mapv(|pi| pi * (1.0 - pi));

        let gradient = x.t().dot(&(y - &p));
        let weighted = x * &w.view().insert_axis(Axis(1));
        let information = x.t().dot(&weighted);

        let step = match solve_spd(&information, &gradient) {
            Ok(step) => step,
            Err(_) if iterations > 1 => {
                return Err(AnalysisError::model(format!(
                    "information matrix became singular after {} iterations (possible perfect separation)",
                    iterations
                )))
            }
            Err(e) => return Err(e),
        };
        beta += &step;

        let max_step = step.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
        tracing::debug!(
            "logit iteration {}: max |step| = {:.3e}, log-likelihood = {:.6}",
            iterations,
            max_step,
            log_likelihood(y, &x.dot(&beta))
        );
        if !max_step.is_finite() {
            break;
        }
        if max_step < options.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(AnalysisError::model(format!(
            "logistic regression did not converge in {} iterations (possible perfect separation)",
            options.max_iterations
        )));
    }

    // Information at the final estimate for the covariance
    let p = x.dot(&beta).mapv(sigmoid);
    let w = p.mapv(|pi| pi * (1.0 - pi));
    let weighted = x * &w.view().insert_axis(Axis(1));
    let information = x.t().dot(&weighted);
    let covariance = invert_spd(&information)?;

    let coefficients = wald_table(&design.names, &beta, &covariance)?;
    let ll = log_likelihood(y, &x.dot(&beta));

    tracing::info!(
        "Logistic regression converged after {} iterations (log-likelihood {:.4})",
        iterations,
        ll
    );

    Ok(LogitFit {
        names: design.names.clone(),
        beta,
        covariance,
        coefficients,
        log_likelihood: ll,
        null_log_likelihood: bernoulli_log_likelihood(y),
        n_obs: n,
        iterations,
    })
}

impl LogitFit {
    pub fn linear_predictor(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.beta)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        self.linear_predictor(x).mapv(sigmoid)
    }

    pub fn odds_ratios(&self) -> Vec<(String, f64)> {
        self.names
            .iter()
            .cloned()
            .zip(self.beta.iter().map(|b| b.exp()))
            .collect()
    }

    pub fn statistics(&self) -> Result<FitStatistics> {
        let k = self.beta.len();
        let n = self.n_obs as f64;
        Ok(FitStatistics {
            n_obs: self.n_obs,
            n_params: k,
            log_likelihood: self.log_likelihood,
            null_log_likelihood: self.null_log_likelihood,
            pseudo_r_squared: 1.0 - self.log_likelihood / self.null_log_likelihood,
            llr_p_value: llr_p_value(
                self.log_likelihood,
                self.null_log_likelihood,
                k.saturating_sub(1),
            )?,
            aic: 2.0 * k as f64 - 2.0 * self.log_likelihood,
            bic: k as f64 * n.ln() - 2.0 * self.log_likelihood,
            iterations: self.iterations,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    pub threshold: f64,
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    /// Classifies an observation as positive when `p >= threshold`.
    pub fn at_threshold(y: &Array1<f64>, p: &Array1<f64>, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AnalysisError::InvalidConfigValueError {
                field: "threshold".to_string(),
                value: threshold.to_string(),
                reason: "Threshold must lie in [0, 1]".to_string(),
            });
        }
        if y.len() != p.len() {
            return Err(AnalysisError::data("outcomes and probabilities differ in length"));
        }

        let mut cm = Self {
            threshold,
            true_positive: 0,
            false_positive: 0,
            true_negative: 0,
            false_negative: 0,
        };
        for (&actual, &prob) in y.iter().zip(p.iter()) {
            match (actual > 0.5, prob >= threshold) {
                (true, true) => cm.true_positive += 1,
                (false, true) => cm.false_positive += 1,
                (false, false) => cm.true_negative += 1,
                (true, false) => cm.false_negative += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn design(x: Array2<f64>, names: &[&str]) -> Design {
        Design {
            names: names.iter().map(|s| s.to_string()).collect(),
            x,
        }
    }

    #[test]
    fn test_fit_recovers_closed_form_estimates() {
        let ln2 = 2.0_f64.ln();
        let x = array![[1.0, 0.0], [1.0, 0.0], [1.0, ln2], [1.0, ln2], [1.0, ln2]];
        let y = array![1.0, 0.0, 1.0, 1.0, 0.0];
        let fit = fit(&design(x, &["Intercept", "x"]), &y, FitOptions::default()).unwrap();

        assert_abs_diff_eq!(fit.beta, array![0.0, 1.0], epsilon = 1e-8);
        assert_abs_diff_eq!(fit.odds_ratios()[1].1, std::f64::consts::E, epsilon = 1e-7);
        assert_eq!(fit.odds_ratios()[1].0, "x");
    }

    #[test]
    fn test_mean_prediction_matches_base_rate() {
        let x = array![
            [1.0, 1.0],
            [1.0, 2.0],
            [1.0, 3.0],
            [1.0, 4.0],
            [1.0, 5.0],
            [1.0, 6.0],
            [1.0, 7.0],
            [1.0, 8.0]
        ];
        let y = array![1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let fit = fit(&design(x.clone(), &["Intercept", "tenure"]), &y, FitOptions::default())
            .unwrap();

        let p = fit.predict_proba(&x);
        assert_abs_diff_eq!(p.mean().unwrap(), 0.5, epsilon = 1e-9);
        assert!(fit.beta[1] < 0.0);

        let stats = fit.statistics().unwrap();
        assert_abs_diff_eq!(stats.null_log_likelihood, 8.0 * 0.5_f64.ln(), epsilon = 1e-12);
        assert!(stats.log_likelihood > stats.null_log_likelihood);
        assert!(stats.pseudo_r_squared > 0.0 && stats.pseudo_r_squared < 1.0);
        assert_abs_diff_eq!(stats.aic, 4.0 - 2.0 * stats.log_likelihood, epsilon = 1e-12);
    }

    #[test]
    fn test_perfect_separation_does_not_converge() {
        let x = array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let err = fit(&design(x, &["Intercept", "x"]), &y, FitOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelError { .. }));
        assert!(err.to_string().contains("separation"));
    }

    #[test]
    fn test_single_class_response_is_rejected() {
        let x = array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![0.0, 0.0, 0.0];
        assert!(fit(&design(x, &["Intercept", "x"]), &y, FitOptions::default()).is_err());
    }

    #[test]
    fn test_confusion_matrix() {
        let y = array![1.0, 0.0, 1.0, 0.0, 1.0];
        let p = array![0.9, 0.6, 0.4, 0.1, 0.5];
        let cm = ConfusionMatrix::at_threshold(&y, &p, 0.5).unwrap();

        assert_eq!(cm.true_positive, 2);
        assert_eq!(cm.false_positive, 1);
        assert_eq!(cm.true_negative, 1);
        assert_eq!(cm.false_negative, 1);
        assert_abs_diff_eq!(cm.accuracy(), 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(cm.sensitivity(), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cm.specificity(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(cm.precision(), 2.0 / 3.0, epsilon = 1e-12);

        assert!(ConfusionMatrix::at_threshold(&y, &p, 1.5).is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-15);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
    }
}
