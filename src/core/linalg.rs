//! Bridges between the `ndarray` matrices the estimators work with and the
//! `faer` decompositions that do the heavy lifting.

use crate::utils::error::{AnalysisError, Result};
use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, Side};
use ndarray::{Array1, Array2, Axis};

fn to_faer(a: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_faer(m: &Mat<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn square(a: &Array2<f64>, what: &str) -> Result<()> {
    if a.nrows() != a.ncols() {
        return Err(AnalysisError::model(format!(
            "{} needs a square matrix, got {}x{}",
            what,
            a.nrows(),
            a.ncols()
        )));
    }
    Ok(())
}

/// Cholesky factorization `a = L Lᵀ` of a symmetric positive definite matrix.
pub fn cholesky(a: &Array2<f64>) -> Result<Llt<f64>> {
    square(a, "Cholesky")?;
    to_faer(a).as_ref().llt(Side::Lower).map_err(|e| {
        AnalysisError::model(format!(
            "matrix is singular or not positive definite ({:?})",
            e
        ))
    })
}

/// Solves `a x = b` for symmetric positive definite `a`.
pub fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let llt = cholesky(a)?;
    let rhs = Mat::from_fn(b.len(), 1, |i, _| b[i]);
    let x = llt.solve(rhs.as_ref());
    Ok(Array1::from_shape_fn(b.len(), |i| x[(i, 0)]))
}

/// Inverse of a symmetric positive definite matrix.
pub fn invert_spd(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let llt = cholesky(a)?;
    let identity = Mat::<f64>::identity(n, n);
    Ok(from_faer(&llt.solve(identity.as_ref())))
}

/// Eigen decomposition of a symmetric matrix.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// columns. Each eigenvector is oriented so its largest-magnitude entry is
/// positive, which makes results reproducible across runs.
pub fn symmetric_eigen(a: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    square(a, "eigen decomposition")?;
    let n = a.nrows();
    let matrix = to_faer(a);
    let evd = matrix
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| AnalysisError::model(format!("eigen decomposition failed ({:?})", e)))?;
    let s = evd.S().column_vector().to_owned();
    let u = evd.U();

    // faer returns ascending eigenvalues
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| s[j].total_cmp(&s[i]));

    let values = Array1::from_iter(order.iter().map(|&i| s[i]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        let mut column = Array1::from_shape_fn(n, |k| u[(k, src)]);
        let dominant = column
            .iter()
            .copied()
            .fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
        if dominant < 0.0 {
            column.mapv_inplace(|x| -x);
        }
        vectors.column_mut(dst).assign(&column);
    }
    tracing::debug!("Eigen decomposition of {}x{} matrix", n, n);

    Ok((values, vectors))
}

/// Column-wise z-scores using the sample standard deviation (n − 1).
pub fn standardize(x: &Array2<f64>) -> Result<Array2<f64>> {
    if x.nrows() < 2 {
        return Err(AnalysisError::data("need at least two rows to standardize"));
    }
    let means = x
        .mean_axis(Axis(0))
        .ok_or_else(|| AnalysisError::data("cannot standardize an empty matrix"))?;
    let stds = x.std_axis(Axis(0), 1.0);
    if let Some(j) = stds.iter().position(|s| !(*s > 0.0)) {
        return Err(AnalysisError::data(format!(
            "column {} has zero variance",
            j + 1
        )));
    }
    Ok((x - &means) / &stds)
}

/// Pearson correlation matrix of the columns of `x`.
pub fn correlation(x: &Array2<f64>) -> Result<Array2<f64>> {
    let z = standardize(x)?;
    let n = (x.nrows() - 1) as f64;
    Ok(z.t().dot(&z) / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_solve_spd() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_spd(&a, &b).unwrap();
        assert_abs_diff_eq!(a.dot(&x), b, epsilon = 1e-12);
    }

    #[test]
    fn test_invert_spd() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 3.0, 0.4], [0.6, 0.4, 1.0]];
        let inverse = invert_spd(&a).unwrap();
        assert_abs_diff_eq!(a.dot(&inverse), Array2::<f64>::eye(3), epsilon = 1e-10);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let err = cholesky(&a).err().unwrap();
        assert!(matches!(err, AnalysisError::ModelError { .. }));
    }

    #[test]
    fn test_non_square_matrix_is_rejected() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(symmetric_eigen(&a).is_err());
        assert!(invert_spd(&a).is_err());
    }

    #[test]
    fn test_symmetric_eigen_two_by_two() {
        let a = array![[2.0, 1.0], [1.0, 2.0]];
        let (values, vectors) = symmetric_eigen(&a).unwrap();
        assert_abs_diff_eq!(values, array![3.0, 1.0], epsilon = 1e-10);

        let s = 1.0 / 2.0_f64.sqrt();
        assert_abs_diff_eq!(vectors[[0, 0]], s, epsilon = 1e-10);
        assert_abs_diff_eq!(vectors[[1, 0]], s, epsilon = 1e-10);
        assert_abs_diff_eq!(vectors[[0, 1]].abs(), s, epsilon = 1e-10);
    }

    #[test]
    fn test_symmetric_eigen_reconstructs_matrix() {
        let a = array![
            [1.0, 0.6, 0.3, 0.1],
            [0.6, 1.0, 0.2, 0.4],
            [0.3, 0.2, 1.0, 0.5],
            [0.1, 0.4, 0.5, 1.0]
        ];
        let (values, vectors) = symmetric_eigen(&a).unwrap();
        let rebuilt = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        assert_abs_diff_eq!(rebuilt, a, epsilon = 1e-10);
        assert_abs_diff_eq!(vectors.t().dot(&vectors), Array2::<f64>::eye(4), epsilon = 1e-10);
        assert_abs_diff_eq!(values.sum(), 4.0, epsilon = 1e-10);
        assert!(values.windows(2).into_iter().all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_correlation_has_unit_diagonal() {
        let x = array![[1.0, 2.0], [2.0, 4.5], [3.0, 5.5], [4.0, 8.0]];
        let r = correlation(&x).unwrap();
        assert_abs_diff_eq!(r[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[[1, 1]], 1.0, epsilon = 1e-12);
        assert!(r[[0, 1]] > 0.95);
    }

    #[test]
    fn test_standardize_rejects_constant_column() {
        let x = array![[1.0, 3.0], [2.0, 3.0], [3.0, 3.0]];
        assert!(standardize(&x).is_err());
    }
}
