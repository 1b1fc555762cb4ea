//! Bounded scalar minimization.

use crate::utils::error::{AnalysisError, Result};
use crate::utils::validation::validate_bounds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub evaluations: usize,
}

const GOLDEN: f64 = 0.381_966_011_250_105_1; // (3 - sqrt(5)) / 2

/// Brent's method on `[lower, upper]`: parabolic interpolation with
/// golden-section steps as fallback.
pub fn minimize_bounded<F>(mut f: F, lower: f64, upper: f64, tolerance: f64) -> Result<Minimum>
where
    F: FnMut(f64) -> f64,
{
    validate_bounds("bounds", lower, upper)?;
    if !(tolerance > 0.0) {
        return Err(AnalysisError::InvalidConfigValueError {
            field: "tolerance".to_string(),
            value: tolerance.to_string(),
            reason: "Tolerance must be positive".to_string(),
        });
    }

    let max_evaluations = 500;
    let sqrt_eps = f64::EPSILON.sqrt();

    let (mut a, mut b) = (lower, upper);
    let mut x = a + GOLDEN * (b - a);
    let (mut w, mut v) = (x, x);
    let mut fx = f(x);
    let (mut fw, mut fv) = (fx, fx);
    let mut evaluations = 1;
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    while evaluations < max_evaluations {
        let mid = 0.5 * (a + b);
        let tol1 = sqrt_eps * x.abs() + tolerance / 3.0;
        let tol2 = 2.0 * tol1;

        if (x - mid).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }

        let mut golden_step = true;
        if e.abs() > tol1 {
            // try a parabola through x, w, v
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let previous = e;
            e = d;

            if p.abs() < (0.5 * q * previous).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if (u - a) < tol2 || (b - u) < tol2 {
                    d = if mid >= x { tol1 } else { -tol1 };
                }
                golden_step = false;
            }
        }

        if golden_step {
            e = if x >= mid { a - x } else { b - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);
        evaluations += 1;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    if !fx.is_finite() {
        return Err(AnalysisError::model(format!(
            "objective is not finite at the reported minimum x = {}",
            x
        )));
    }

    tracing::debug!(
        "Bounded minimization finished at x = {:.6} after {} evaluations",
        x,
        evaluations
    );

    Ok(Minimum {
        x,
        value: fx,
        evaluations,
    })
}
