use crate::domain::model::CoefficientRow;
use crate::utils::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use std::fmt::Write;

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.959_963_984_540_054;

/// Wald statistics for each coefficient from its covariance matrix.
pub fn wald_table(
    names: &[String],
    beta: &Array1<f64>,
    covariance: &Array2<f64>,
) -> Result<Vec<CoefficientRow>> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::model(e.to_string()))?;

    Ok(names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let estimate = beta[i];
            let std_error = covariance[[i, i]].max(0.0).sqrt();
            let z_value = estimate / std_error;
            let p_value = 2.0 * (1.0 - normal.cdf(z_value.abs()));
            CoefficientRow {
                term: name.clone(),
                estimate,
                std_error,
                z_value,
                p_value,
                ci_lower: estimate - Z_95 * std_error,
                ci_upper: estimate + Z_95 * std_error,
            }
        })
        .collect())
}

/// Upper-tail p-value of the likelihood-ratio statistic.
pub fn llr_p_value(log_likelihood: f64, null_log_likelihood: f64, df: usize) -> Result<f64> {
    if df == 0 {
        return Ok(f64::NAN);
    }
    let chi = ChiSquared::new(df as f64).map_err(|e| AnalysisError::model(e.to_string()))?;
    let statistic = (2.0 * (log_likelihood - null_log_likelihood)).max(0.0);
    Ok(1.0 - chi.cdf(statistic))
}

pub fn render_table(rows: &[CoefficientRow]) -> String {
    let width = rows
        .iter()
        .map(|r| r.term.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$} {:>10} {:>10} {:>8} {:>8} {:>10} {:>10}",
        "term", "coef", "std err", "z", "P>|z|", "[0.025", "0.975]",
        width = width
    );
    let _ = writeln!(out, "{}", "-".repeat(width + 63));
    for r in rows {
        let _ = writeln!(
            out,
            "{:<width$} {:>10.4} {:>10.4} {:>8.3} {:>8.3} {:>10.4} {:>10.4}",
            r.term,
            r.estimate,
            r.std_error,
            r.z_value,
            r.p_value,
            r.ci_lower,
            r.ci_upper,
            width = width
        );
    }
    out
}

pub fn coefficients_csv(rows: &[CoefficientRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AnalysisError::IoError(std::io::Error::other(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| AnalysisError::data(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_wald_table() {
        let names = vec!["Intercept".to_string(), "tenure".to_string()];
        let beta = array![0.5, -0.04];
        let covariance = array![[0.01, 0.0], [0.0, 0.0004]];
        let rows = wald_table(&names, &beta, &covariance).unwrap();

        assert_abs_diff_eq!(rows[0].std_error, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].z_value, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[1].z_value, -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[1].p_value, 0.0455, epsilon = 1e-4);
        assert_abs_diff_eq!(rows[1].ci_upper, -0.04 + Z_95 * 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_llr_p_value() {
        // 2 * 1.92 ~= 3.84, the 95% quantile of chi-squared(1)
        let p = llr_p_value(-10.0, -11.920_729, 1).unwrap();
        assert_abs_diff_eq!(p, 0.05, epsilon = 1e-4);
        assert!(llr_p_value(-10.0, -10.0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_coefficients_csv_has_header() {
        let names = vec!["price".to_string()];
        let rows = wald_table(&names, &array![-1.0], &array![[0.25]]).unwrap();
        let csv = coefficients_csv(&rows).unwrap();
        assert!(csv.starts_with("term,estimate,std_error,z_value,p_value,ci_lower,ci_upper"));
        assert!(csv.contains("price,-1"));
    }
}
