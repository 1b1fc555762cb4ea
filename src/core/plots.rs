//! SVG charts rendered with Plotters into in-memory strings.

use crate::core::conjoint::ProductShare;
use crate::core::factor::Eigenvalue;
use crate::domain::model::Artifact;
use crate::utils::error::{AnalysisError, Result};
use plotters::prelude::*;

const PALETTE: [RGBColor; 5] = [BLUE, RED, GREEN, MAGENTA, CYAN];

fn padded(min: f64, max: f64) -> std::ops::Range<f64> {
    let span = (max - min).abs().max(1e-9);
    (min - 0.1 * span)..(max + 0.1 * span)
}

/// Wraps a rendered chart as an artifact. Charts are extras: a rendering
/// failure is logged and the chart left out of the report.
pub fn chart_artifact(file_name: &str, rendered: Result<String>) -> Option<Artifact> {
    match rendered {
        Ok(svg) => Some(Artifact::text(file_name, svg)),
        Err(e) => {
            tracing::warn!("⚠️ Skipping {}: {}", file_name, e);
            None
        }
    }
}

/// Eigenvalues against component number, with the Kaiser line at 1.
pub fn scree_plot(eigenvalues: &[Eigenvalue]) -> Result<String> {
    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, (800, 500)).into_drawing_area();
        root.fill(&WHITE).map_err(AnalysisError::plot)?;

        let n = eigenvalues.len() as f64;
        let top = eigenvalues
            .iter()
            .map(|e| e.eigenvalue)
            .fold(1.0_f64, f64::max)
            * 1.1;

        let mut chart = ChartBuilder::on(&root)
            .caption("Scree Plot", ("sans-serif", 28))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.5..(n + 0.5), 0.0..top)
            .map_err(AnalysisError::plot)?;

        chart
            .configure_mesh()
            .x_desc("Component")
            .y_desc("Eigenvalue")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(AnalysisError::plot)?;

        let points: Vec<(f64, f64)> = eigenvalues
            .iter()
            .map(|e| (e.component as f64, e.eigenvalue))
            .collect();

        chart
            .draw_series(LineSeries::new(points.clone(), &BLUE))
            .map_err(AnalysisError::plot)?;
        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, 4, BLUE.filled())))
            .map_err(AnalysisError::plot)?;
        chart
            .draw_series(LineSeries::new(vec![(0.5, 1.0), (n + 0.5, 1.0)], &RED))
            .map_err(AnalysisError::plot)?
            .label("Kaiser criterion")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED));

        chart
            .configure_series_labels()
            .border_style(BLACK)
            .draw()
            .map_err(AnalysisError::plot)?;
        root.present().map_err(AnalysisError::plot)?;
    }
    Ok(buffer)
}

/// Observations on the first two factors, with attribute loading vectors.
pub fn perceptual_map(
    scores: &[(f64, f64)],
    labels: &[String],
    loadings: &[(String, f64, f64)],
    axis_names: (&str, &str),
) -> Result<String> {
    let xs = scores
        .iter()
        .map(|s| s.0)
        .chain(loadings.iter().map(|l| l.1))
        .chain(std::iter::once(0.0));
    let ys = scores
        .iter()
        .map(|s| s.1)
        .chain(loadings.iter().map(|l| l.2))
        .chain(std::iter::once(0.0));
    let (x_min, x_max) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (y_min, y_max) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, (900, 700)).into_drawing_area();
        root.fill(&WHITE).map_err(AnalysisError::plot)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Perceptual Map", ("sans-serif", 28))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(padded(x_min, x_max), padded(y_min, y_max))
            .map_err(AnalysisError::plot)?;

        chart
            .configure_mesh()
            .x_desc(axis_names.0)
            .y_desc(axis_names.1)
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(AnalysisError::plot)?;

        chart
            .draw_series(
                scores
                    .iter()
                    .map(|&p| Circle::new(p, 3, BLUE.mix(0.5).filled())),
            )
            .map_err(AnalysisError::plot)?;

        if !labels.is_empty() {
            chart
                .draw_series(scores.iter().zip(labels.iter()).map(|(&p, label)| {
                    Text::new(label.clone(), p, ("sans-serif", 11).into_font())
                }))
                .map_err(AnalysisError::plot)?;
        }

        for (name, lx, ly) in loadings {
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(0.0, 0.0), (*lx, *ly)],
                    RED.stroke_width(2),
                )))
                .map_err(AnalysisError::plot)?;
            chart
                .draw_series(std::iter::once(Text::new(
                    name.clone(),
                    (*lx, *ly),
                    ("sans-serif", 14).into_font().color(&RED),
                )))
                .map_err(AnalysisError::plot)?;
        }

        root.present().map_err(AnalysisError::plot)?;
    }
    Ok(buffer)
}

/// Histogram of predicted churn probabilities with the decision threshold.
pub fn probability_histogram(probabilities: &[f64], threshold: f64) -> Result<String> {
    const BINS: usize = 20;
    let mut counts = [0usize; BINS];
    for &p in probabilities {
        let bin = ((p * BINS as f64) as usize).min(BINS - 1);
        counts[bin] += 1;
    }
    let top = counts.iter().copied().max().unwrap_or(1).max(1) as f64 * 1.1;

    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, (800, 500)).into_drawing_area();
        root.fill(&WHITE).map_err(AnalysisError::plot)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Predicted Churn Probability", ("sans-serif", 28))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..1.0, 0.0..top)
            .map_err(AnalysisError::plot)?;

        chart
            .configure_mesh()
            .x_desc("Probability")
            .y_desc("Customers")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(AnalysisError::plot)?;

        let width = 1.0 / BINS as f64;
        chart
            .draw_series(counts.iter().enumerate().map(|(i, &c)| {
                let x0 = i as f64 * width;
                Rectangle::new([(x0, 0.0), (x0 + width, c as f64)], BLUE.mix(0.6).filled())
            }))
            .map_err(AnalysisError::plot)?;

        chart
            .draw_series(LineSeries::new(
                vec![(threshold, 0.0), (threshold, top)],
                RED.stroke_width(2),
            ))
            .map_err(AnalysisError::plot)?;

        root.present().map_err(AnalysisError::plot)?;
    }
    Ok(buffer)
}

/// Bar chart of simulated market shares.
pub fn share_chart(shares: &[ProductShare]) -> Result<String> {
    let n = shares.len() as f64;

    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, (800, 500)).into_drawing_area();
        root.fill(&WHITE).map_err(AnalysisError::plot)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Simulated Market Shares", ("sans-serif", 28))
            .margin(10)
            .x_label_area_size(20)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..n, 0.0..1.05)
            .map_err(AnalysisError::plot)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_x_axis()
            .y_desc("Share")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(AnalysisError::plot)?;

        chart
            .draw_series(shares.iter().enumerate().map(|(i, s)| {
                let color = PALETTE[i % PALETTE.len()];
                Rectangle::new(
                    [(i as f64 + 0.15, 0.0), (i as f64 + 0.85, s.share)],
                    color.filled(),
                )
            }))
            .map_err(AnalysisError::plot)?;

        chart
            .draw_series(shares.iter().enumerate().map(|(i, s)| {
                Text::new(
                    format!("{} ({:.1}%)", s.name, s.share * 100.0),
                    (i as f64 + 0.15, s.share + 0.03),
                    ("sans-serif", 13).into_font(),
                )
            }))
            .map_err(AnalysisError::plot)?;

        root.present().map_err(AnalysisError::plot)?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scree_plot_renders_svg() {
        let eigenvalues = vec![
            Eigenvalue { component: 1, eigenvalue: 2.4, proportion: 0.6, cumulative: 0.6 },
            Eigenvalue { component: 2, eigenvalue: 1.1, proportion: 0.275, cumulative: 0.875 },
            Eigenvalue { component: 3, eigenvalue: 0.5, proportion: 0.125, cumulative: 1.0 },
        ];
        let svg = scree_plot(&eigenvalues).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Scree Plot"));
    }

    #[test]
    fn test_perceptual_map_renders_labels() {
        let scores = vec![(0.5, -0.2), (-1.0, 0.8)];
        let labels = vec!["Alice".to_string(), "Bob".to_string()];
        let loadings = vec![("math".to_string(), 0.9, 0.1)];
        let svg = perceptual_map(&scores, &labels, &loadings, ("Factor 1", "Factor 2")).unwrap();
        assert!(svg.contains("Alice"));
        assert!(svg.contains("math"));
    }

    #[test]
    fn test_probability_histogram_and_share_chart() {
        let svg = probability_histogram(&[0.1, 0.2, 0.8, 1.0], 0.5).unwrap();
        assert!(svg.contains("</svg>"));

        let shares = vec![
            ProductShare { name: "A".to_string(), utility: 1.0, share: 0.7 },
            ProductShare { name: "B".to_string(), utility: 0.2, share: 0.3 },
        ];
        let svg = share_chart(&shares).unwrap();
        assert!(svg.contains("70.0%"));
    }

    #[test]
    fn test_failed_chart_is_left_out() {
        let failed = chart_artifact("scree_plot.svg", Err(AnalysisError::plot("no backend")));
        assert!(failed.is_none());

        let rendered = chart_artifact("scree_plot.svg", Ok("<svg/>".to_string())).unwrap();
        assert_eq!(rendered.file_name, "scree_plot.svg");
        assert_eq!(rendered.bytes, b"<svg/>");
    }
}
