//! Principal-component factor extraction with varimax rotation.

use crate::core::linalg::{correlation, invert_spd, standardize, symmetric_eigen};
use crate::utils::error::{AnalysisError, Result};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

const VARIMAX_MAX_SWEEPS: usize = 500;
const VARIMAX_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    None,
    Varimax,
}

#[derive(Debug, Clone, Serialize)]
pub struct Eigenvalue {
    pub component: usize,
    pub eigenvalue: f64,
    pub proportion: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone)]
pub struct FactorSolution {
    pub variables: Vec<String>,
    pub correlation: Array2<f64>,
    pub eigenvalues: Vec<Eigenvalue>,
    pub n_factors: usize,
    pub rotation: Rotation,
    /// variables x factors
    pub loadings: Array2<f64>,
    pub communalities: Array1<f64>,
    /// observations x factors
    pub scores: Array2<f64>,
}

impl FactorSolution {
    pub fn uniquenesses(&self) -> Array1<f64> {
        self.communalities.mapv(|h| 1.0 - h)
    }

    /// Sum of squared loadings per factor.
    pub fn variance_explained(&self) -> Array1<f64> {
        self.loadings.mapv(|l| l * l).sum_axis(Axis(0))
    }
}

/// Number of eigenvalues above one, but at least one factor.
pub fn kaiser_count(eigenvalues: &Array1<f64>) -> usize {
    eigenvalues.iter().filter(|&&v| v > 1.0).count().max(1)
}

pub fn extract(
    variables: Vec<String>,
    data: &Array2<f64>,
    n_factors: Option<usize>,
    rotation: Rotation,
) -> Result<FactorSolution> {
    let p = data.ncols();
    if p < 2 {
        return Err(AnalysisError::ConfigValidationError {
            field: "factor.columns".to_string(),
            message: format!("factor analysis needs at least two variables, got {}", p),
        });
    }
    if data.nrows() <= p {
        return Err(AnalysisError::data(format!(
            "need more observations ({}) than variables ({})",
            data.nrows(),
            p
        )));
    }

    let r = correlation(data)?;
    let (values, vectors) = symmetric_eigen(&r)?;

    let total = values.sum();
    let mut cumulative = 0.0;
    let eigenvalues = values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            cumulative += v / total;
            Eigenvalue {
                component: i + 1,
                eigenvalue: v,
                proportion: v / total,
                cumulative,
            }
        })
        .collect();

    let k = match n_factors {
        Some(k) if k == 0 || k > p => {
            return Err(AnalysisError::InvalidConfigValueError {
                field: "factor.n_factors".to_string(),
                value: k.to_string(),
                reason: format!("Must be between 1 and the number of variables ({})", p),
            })
        }
        Some(k) => k,
        None => {
            let k = kaiser_count(&values);
            tracing::info!("Kaiser criterion retains {} factor(s)", k);
            k
        }
    };

    let mut loadings = vectors.slice(s![.., ..k]).to_owned();
    for (j, mut column) in loadings.axis_iter_mut(Axis(1)).enumerate() {
        let scale = values[j].max(0.0).sqrt();
        column.mapv_inplace(|v| v * scale);
    }

    if rotation == Rotation::Varimax && k > 1 {
        loadings = varimax(&loadings)?;
    }
    orient_factors(&mut loadings);

    let communalities = loadings.mapv(|l| l * l).sum_axis(Axis(1));

    // regression (Thurstone) scores
    let z = standardize(data)?;
    let scores = z.dot(&invert_spd(&r)?).dot(&loadings);

    Ok(FactorSolution {
        variables,
        correlation: r,
        eigenvalues,
        n_factors: k,
        rotation,
        loadings,
        communalities,
        scores,
    })
}

/// Flips each factor so its loadings sum to a non-negative value.
fn orient_factors(loadings: &mut Array2<f64>) {
    for mut column in loadings.axis_iter_mut(Axis(1)) {
        if column.sum() < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}

/// Kaiser's varimax with row normalization, by successive planar rotations
/// of factor pairs.
pub fn varimax(loadings: &Array2<f64>) -> Result<Array2<f64>> {
    let (p, k) = loadings.dim();
    let h: Array1<f64> = loadings
        .mapv(|l| l * l)
        .sum_axis(Axis(1))
        .mapv(f64::sqrt);
    if h.iter().any(|&v| !(v > 0.0)) {
        return Err(AnalysisError::model(
            "a variable has zero communality; varimax normalization is undefined",
        ));
    }

    let mut a = loadings / &h.view().insert_axis(Axis(1));
    let n = p as f64;

    for sweep in 0..VARIMAX_MAX_SWEEPS {
        let mut largest_angle: f64 = 0.0;

        for i in 0..k {
            for j in (i + 1)..k {
                let (mut sum_u, mut sum_v, mut sum_uu_vv, mut sum_uv) = (0.0, 0.0, 0.0, 0.0);
                for r in 0..p {
                    let x = a[[r, i]];
                    let y = a[[r, j]];
                    let u = x * x - y * y;
                    let v = 2.0 * x * y;
                    sum_u += u;
                    sum_v += v;
                    sum_uu_vv += u * u - v * v;
                    sum_uv += u * v;
                }
                let numerator = 2.0 * sum_uv - 2.0 * sum_u * sum_v / n;
                let denominator = sum_uu_vv - (sum_u * sum_u - sum_v * sum_v) / n;
                let phi = 0.25 * numerator.atan2(denominator);
                largest_angle = largest_angle.max(phi.abs());

                let (sin, cos) = phi.sin_cos();
                for r in 0..p {
                    let x = a[[r, i]];
                    let y = a[[r, j]];
                    a[[r, i]] = x * cos + y * sin;
                    a[[r, j]] = -x * sin + y * cos;
                }
            }
        }

        if largest_angle < VARIMAX_TOLERANCE {
            tracing::debug!("Varimax converged after {} sweeps", sweep + 1);
            return Ok(a * &h.view().insert_axis(Axis(1)));
        }
    }

    Err(AnalysisError::model(format!(
        "varimax rotation did not converge in {} sweeps",
        VARIMAX_MAX_SWEEPS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn varimax_criterion(l: &Array2<f64>) -> f64 {
        let h = l.mapv(|v| v * v).sum_axis(Axis(1)).mapv(f64::sqrt);
        let a = l / &h.view().insert_axis(Axis(1));
        let sq = a.mapv(|v| v * v);
        let p = a.nrows() as f64;
        sq.axis_iter(Axis(1))
            .map(|c| c.mapv(|v| v * v).sum() - c.sum().powi(2) / p)
            .sum()
    }

    #[test]
    fn test_varimax_recovers_simple_structure() {
        let simple = array![[0.9, 0.0], [0.8, 0.0], [0.7, 0.0], [0.0, 0.85], [0.0, 0.75], [0.0, 0.6]];
        let angle = 0.5_f64;
        let rotation = array![[angle.cos(), -angle.sin()], [angle.sin(), angle.cos()]];
        let mixed = simple.dot(&rotation);

        let mut rotated = varimax(&mixed).unwrap();
        orient_factors(&mut rotated);

        // columns may come back in either order
        let recovered = if rotated[[0, 0]].abs() > rotated[[0, 1]].abs() {
            rotated
        } else {
            rotated.select(Axis(1), &[1, 0])
        };
        assert_abs_diff_eq!(recovered, simple, epsilon = 1e-5);
    }

    #[test]
    fn test_varimax_preserves_communalities_and_improves_criterion() {
        let l = array![[0.7, 0.4], [0.6, 0.5], [0.5, -0.5], [0.4, -0.6], [0.6, 0.1]];
        let rotated = varimax(&l).unwrap();

        let before = l.mapv(|v| v * v).sum_axis(Axis(1));
        let after = rotated.mapv(|v| v * v).sum_axis(Axis(1));
        assert_abs_diff_eq!(before, after, epsilon = 1e-10);
        assert!(varimax_criterion(&rotated) >= varimax_criterion(&l) - 1e-12);
    }

    fn two_factor_data() -> Array2<f64> {
        // deterministic pseudo-random latent scores
        let mut state: u64 = 42;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
        };
        let n = 200;
        let mut data = Array2::<f64>::zeros((n, 4));
        for i in 0..n {
            let (f1, f2) = (next(), next());
            data[[i, 0]] = f1 + 0.2 * next();
            data[[i, 1]] = f1 + 0.2 * next();
            data[[i, 2]] = f2 + 0.2 * next();
            data[[i, 3]] = f2 + 0.2 * next();
        }
        data
    }

    #[test]
    fn test_extract_two_factor_structure() {
        let names = ["math", "science", "reading", "writing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let solution = extract(names, &two_factor_data(), None, Rotation::Varimax).unwrap();

        assert_eq!(solution.n_factors, 2);
        let total: f64 = solution.eigenvalues.iter().map(|e| e.eigenvalue).sum();
        assert_abs_diff_eq!(total, 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.eigenvalues[3].cumulative, 1.0, epsilon = 1e-9);

        // math and science load on one factor, reading and writing on the other
        let l = &solution.loadings;
        let math_factor = if l[[0, 0]].abs() > l[[0, 1]].abs() { 0 } else { 1 };
        let verbal_factor = 1 - math_factor;
        assert!(l[[0, math_factor]] > 0.8 && l[[1, math_factor]] > 0.8);
        assert!(l[[2, verbal_factor]] > 0.8 && l[[3, verbal_factor]] > 0.8);
        assert!(l[[2, math_factor]].abs() < 0.3);

        assert_eq!(solution.scores.dim(), (200, 2));
        assert!(solution.uniquenesses().iter().all(|&u| (0.0..1.0).contains(&u)));
        assert_abs_diff_eq!(
            solution.variance_explained().sum(),
            solution.communalities.sum(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_full_rank_scores_are_standardized_components() {
        let names = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let data = two_factor_data();
        let solution = extract(names, &data, Some(4), Rotation::None).unwrap();

        // with every factor kept, Z R^-1 L reduces to Z V Λ^(-1/2)
        let (values, vectors) = symmetric_eigen(&solution.correlation).unwrap();
        let scale = Array2::from_diag(&values.mapv(|v| 1.0 / v.sqrt()));
        let expected = standardize(&data).unwrap().dot(&vectors).dot(&scale);
        for j in 0..4 {
            let sign = solution.scores.column(j).dot(&expected.column(j)).signum();
            assert_abs_diff_eq!(
                solution.scores.column(j),
                expected.column(j).mapv(|v| sign * v),
                epsilon = 1e-8
            );
        }

        // unit variance, uncorrelated
        let n = (data.nrows() - 1) as f64;
        let covariance = solution.scores.t().dot(&solution.scores) / n;
        assert_abs_diff_eq!(covariance, Array2::<f64>::eye(4), epsilon = 1e-8);
        assert_abs_diff_eq!(
            solution.scores.mean_axis(Axis(0)).unwrap(),
            Array1::<f64>::zeros(4),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_extract_rejects_bad_factor_count() {
        let names = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let err = extract(names, &two_factor_data(), Some(5), Rotation::None).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfigValueError { .. }));
    }

    #[test]
    fn test_kaiser_count_keeps_at_least_one() {
        assert_eq!(kaiser_count(&array![2.1, 1.3, 0.4, 0.2]), 2);
        assert_eq!(kaiser_count(&array![0.9, 0.6]), 1);
    }
}
