//! Customer lifetime value and the price-multiplier profit scenario.

use crate::core::logit::{sigmoid, LogitFit};
use crate::core::optimize::minimize_bounded;
use crate::utils::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use serde::Serialize;

/// `CLV(m, c, γ) = m / (1 − γ(1 − c))` for margin `m`, per-period churn
/// probability `c` and discount factor `γ`.
pub fn clv(margin: f64, churn: f64, discount: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&churn) {
        return Err(AnalysisError::data(format!(
            "churn probability {} is outside [0, 1]",
            churn
        )));
    }
    if !(0.0..=1.0).contains(&discount) {
        return Err(AnalysisError::data(format!(
            "discount factor {} is outside [0, 1]",
            discount
        )));
    }

    let denominator = 1.0 - discount * (1.0 - churn);
    if denominator <= 0.0 {
        return Err(AnalysisError::data(
            "lifetime value diverges: discount factor 1 with zero churn",
        ));
    }
    Ok(margin / denominator)
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceOptimum {
    pub baseline_profit: f64,
    pub multiplier: f64,
    pub profit: f64,
    pub uplift: f64,
    pub mean_churn_baseline: f64,
    pub mean_churn_optimal: f64,
    pub evaluations: usize,
}

/// Total CLV of a customer base when every price is scaled by a multiplier
/// `k`; churn responds through the price coefficient of the fitted model.
#[derive(Debug, Clone)]
pub struct PriceScenario {
    eta: Array1<f64>,
    prices: Array1<f64>,
    price_coefficient: f64,
    margin_rate: f64,
    discount: f64,
}

impl PriceScenario {
    pub fn new(
        fit: &LogitFit,
        x: &Array2<f64>,
        price_position: usize,
        margin_rate: f64,
        discount: f64,
    ) -> Result<Self> {
        if price_position >= fit.beta.len() || x.ncols() != fit.beta.len() {
            return Err(AnalysisError::data(
                "price column is not part of the fitted churn model",
            ));
        }
        if !(margin_rate > 0.0) {
            return Err(AnalysisError::InvalidConfigValueError {
                field: "churn.clv.margin_rate".to_string(),
                value: margin_rate.to_string(),
                reason: "Margin rate must be positive".to_string(),
            });
        }
        // Validates the discount factor once up front
        clv(0.0, 0.5, discount)?;

        Ok(Self {
            eta: fit.linear_predictor(x),
            prices: x.column(price_position).to_owned(),
            price_coefficient: fit.beta[price_position],
            margin_rate,
            discount,
        })
    }

    pub fn churn_at(&self, multiplier: f64) -> Array1<f64> {
        let shift = self.price_coefficient * (multiplier - 1.0);
        self.eta
            .iter()
            .zip(self.prices.iter())
            .map(|(&eta, &price)| sigmoid(eta + shift * price))
            .collect()
    }

    pub fn profit(&self, multiplier: f64) -> Result<f64> {
        self.churn_at(multiplier)
            .iter()
            .zip(self.prices.iter())
            .map(|(&churn, &price)| {
                clv(multiplier * price * self.margin_rate, churn, self.discount)
            })
            .sum()
    }

    pub fn optimize(&self, lower: f64, upper: f64) -> Result<PriceOptimum> {
        let baseline_profit = self.profit(1.0)?;

        let minimum = minimize_bounded(
            |k| match self.profit(k) {
                Ok(p) => -p,
                Err(_) => f64::INFINITY,
            },
            lower,
            upper,
            1e-6,
        )?;
        let profit = -minimum.value;

        tracing::info!(
            "Optimal price multiplier {:.4} raises total CLV from {:.2} to {:.2}",
            minimum.x,
            baseline_profit,
            profit
        );

        Ok(PriceOptimum {
            baseline_profit,
            multiplier: minimum.x,
            profit,
            uplift: profit - baseline_profit,
            mean_churn_baseline: self.churn_at(1.0).mean().unwrap_or(f64::NAN),
            mean_churn_optimal: self.churn_at(minimum.x).mean().unwrap_or(f64::NAN),
            evaluations: minimum.evaluations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CoefficientRow;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn fitted(beta: Array1<f64>) -> LogitFit {
        let k = beta.len();
        LogitFit {
            names: (0..k).map(|i| format!("b{}", i)).collect(),
            beta,
            covariance: Array2::eye(k),
            coefficients: Vec::<CoefficientRow>::new(),
            log_likelihood: -1.0,
            null_log_likelihood: -2.0,
            n_obs: 10,
            iterations: 1,
        }
    }

    #[test]
    fn test_clv_formula() {
        assert_abs_diff_eq!(clv(100.0, 0.2, 0.9).unwrap(), 357.142_857_142_857, epsilon = 1e-9);
        assert_abs_diff_eq!(clv(50.0, 1.0, 0.9).unwrap(), 50.0, epsilon = 1e-12);
        assert_abs_diff_eq!(clv(50.0, 0.3, 0.0).unwrap(), 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clv_rejects_invalid_inputs() {
        assert!(clv(100.0, 1.2, 0.9).is_err());
        assert!(clv(100.0, 0.2, -0.1).is_err());
        assert!(clv(100.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_price_insensitive_churn_pushes_to_upper_bound() {
        let fit = fitted(array![-1.0, 0.0]);
        let x = array![[1.0, 50.0], [1.0, 80.0]];
        let scenario = PriceScenario::new(&fit, &x, 1, 1.0, 0.9).unwrap();

        let optimum = scenario.optimize(0.5, 2.0).unwrap();
        assert_abs_diff_eq!(optimum.multiplier, 2.0, epsilon = 1e-4);
        assert!(optimum.uplift > 0.0);
        assert_abs_diff_eq!(optimum.mean_churn_baseline, optimum.mean_churn_optimal, epsilon = 1e-12);
    }

    #[test]
    fn test_price_sensitive_churn_has_interior_optimum() {
        let fit = fitted(array![-6.0, 4.0]);
        let x = array![[1.0, 1.0]];
        let scenario = PriceScenario::new(&fit, &x, 1, 1.0, 0.99).unwrap();

        let optimum = scenario.optimize(0.2, 2.0).unwrap();
        assert!(optimum.multiplier > 0.35 && optimum.multiplier < 0.55);
        assert!(optimum.mean_churn_optimal < optimum.mean_churn_baseline);
        assert!(optimum.uplift > 0.0);

        // stationary point: neighbours are not better
        let h = 1e-3;
        let best = scenario.profit(optimum.multiplier).unwrap();
        assert!(best >= scenario.profit(optimum.multiplier - h).unwrap() - 1e-6);
        assert!(best >= scenario.profit(optimum.multiplier + h).unwrap() - 1e-6);
    }

    #[test]
    fn test_baseline_profit_matches_clv_sum() {
        let fit = fitted(array![0.0, 0.0]);
        let x = array![[1.0, 10.0], [1.0, 30.0]];
        let scenario = PriceScenario::new(&fit, &x, 1, 0.5, 0.8).unwrap();
        // churn = 0.5 for everyone
        let expected = clv(5.0, 0.5, 0.8).unwrap() + clv(15.0, 0.5, 0.8).unwrap();
        assert_abs_diff_eq!(scenario.profit(1.0).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_price_position_out_of_range() {
        let fit = fitted(array![0.0, 0.0]);
        let x = array![[1.0, 10.0]];
        assert!(PriceScenario::new(&fit, &x, 2, 1.0, 0.9).is_err());
    }
}
