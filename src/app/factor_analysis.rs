use crate::config::toml_config::FactorConfig;
use crate::core::factor::{self, FactorSolution};
use crate::core::plots;
use crate::core::source::DataSource;
use crate::core::{Analysis, AnalysisReport, Artifact, Table};
use crate::utils::error::{AnalysisError, Result};
use async_trait::async_trait;
use ndarray::Array2;
use reqwest::Client;
use std::fmt::Write;

/// Principal-component factor analysis of attribute ratings with an
/// optional varimax rotation and a two-factor perceptual map.
pub struct FactorAnalysis {
    config: FactorConfig,
    source: DataSource,
    client: Client,
    plots: bool,
}

impl FactorAnalysis {
    pub fn new(config: FactorConfig, plots: bool) -> Result<Self> {
        let source = DataSource::parse(&config.source)?;
        Ok(Self {
            config,
            source,
            client: Client::new(),
            plots,
        })
    }

    /// Configured columns, or every numeric column (blanks allowed) that is
    /// neither excluded nor the label column.
    fn select_columns(&self, table: &Table) -> Result<Vec<String>> {
        if let Some(columns) = &self.config.columns {
            for column in columns {
                table.column_index(column)?;
            }
            return Ok(columns.clone());
        }

        let exclude = self.config.exclude.as_deref().unwrap_or(&[]);
        let columns: Vec<String> = table
            .headers
            .iter()
            .filter(|h| !exclude.contains(*h))
            .filter(|h| self.config.label_column.as_ref() != Some(*h))
            .filter(|h| table.is_numeric(h))
            .cloned()
            .collect();
        tracing::info!("Using numeric columns: {}", columns.join(", "));
        Ok(columns)
    }

    fn data_matrix(table: &Table, columns: &[String]) -> Result<Array2<f64>> {
        let mut data = Array2::zeros((table.len(), columns.len()));
        for (j, column) in columns.iter().enumerate() {
            for (i, value) in table.numeric_column(column)?.into_iter().enumerate() {
                data[[i, j]] = value;
            }
        }
        Ok(data)
    }

    fn loadings_csv(solution: &FactorSolution) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec!["variable".to_string()];
        header.extend((1..=solution.n_factors).map(|j| format!("Factor{}", j)));
        header.push("communality".to_string());
        header.push("uniqueness".to_string());
        writer.write_record(&header)?;

        let uniquenesses = solution.uniquenesses();
        for (i, variable) in solution.variables.iter().enumerate() {
            let mut record = vec![variable.clone()];
            record.extend(solution.loadings.row(i).iter().map(|l| format!("{:.6}", l)));
            record.push(format!("{:.6}", solution.communalities[i]));
            record.push(format!("{:.6}", uniquenesses[i]));
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AnalysisError::IoError(std::io::Error::other(e.to_string())))?;
        String::from_utf8(bytes).map_err(|e| AnalysisError::data(e.to_string()))
    }

    fn render_summary(&self, solution: &FactorSolution, n_obs: usize, dropped: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Factor Analysis ({})", self.source);
        let _ = writeln!(
            out,
            "Variables: {}  Observations: {}  Dropped rows: {}",
            solution.variables.len(),
            n_obs,
            dropped
        );
        let _ = writeln!(
            out,
            "Factors retained: {}  Rotation: {:?}",
            solution.n_factors, solution.rotation
        );

        let _ = writeln!(out, "\nEigenvalues:");
        let _ = writeln!(out, "  {:>9} {:>12} {:>12} {:>12}", "component", "eigenvalue", "proportion", "cumulative");
        for e in &solution.eigenvalues {
            let _ = writeln!(
                out,
                "  {:>9} {:>12.4} {:>12.4} {:>12.4}",
                e.component, e.eigenvalue, e.proportion, e.cumulative
            );
        }

        let width = solution
            .variables
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(8)
            .max(8);
        let _ = writeln!(out, "\nLoadings:");
        let _ = write!(out, "  {:<width$}", "variable", width = width);
        for j in 1..=solution.n_factors {
            let _ = write!(out, " {:>9}", format!("Factor{}", j));
        }
        let _ = writeln!(out, " {:>11} {:>10}", "communality", "uniqueness");
        let uniquenesses = solution.uniquenesses();
        for (i, variable) in solution.variables.iter().enumerate() {
            let _ = write!(out, "  {:<width$}", variable, width = width);
            for l in solution.loadings.row(i) {
                let _ = write!(out, " {:>9.4}", l);
            }
            let _ = writeln!(
                out,
                " {:>11.4} {:>10.4}",
                solution.communalities[i], uniquenesses[i]
            );
        }

        let _ = write!(out, "  {:<width$}", "SS loadings", width = width);
        for v in solution.variance_explained().iter() {
            let _ = write!(out, " {:>9.4}", v);
        }
        let _ = writeln!(out);
        out
    }
}

#[async_trait]
impl Analysis for FactorAnalysis {
    fn name(&self) -> &str {
        "factor"
    }

    async fn extract(&self) -> Result<Table> {
        self.source.load_table(&self.client).await
    }

    async fn analyze(&self, mut table: Table) -> Result<AnalysisReport> {
        let columns = self.select_columns(&table)?;
        let mut required = columns.clone();
        if let Some(label) = &self.config.label_column {
            required.push(label.clone());
        }
        let dropped = table.drop_incomplete(&required)?;
        if dropped > 0 {
            tracing::warn!("Dropped {} rows with blank factor columns", dropped);
        }

        let data = Self::data_matrix(&table, &columns)?;
        let solution = factor::extract(
            columns.clone(),
            &data,
            self.config.n_factors,
            self.config.rotation(),
        )?;

        let summary = self.render_summary(&solution, table.len(), dropped);

        let loadings_json: Vec<serde_json::Value> = solution
            .variables
            .iter()
            .enumerate()
            .map(|(i, variable)| {
                serde_json::json!({
                    "variable": variable,
                    "loadings": solution.loadings.row(i).to_vec(),
                    "communality": solution.communalities[i],
                })
            })
            .collect();
        let json = serde_json::json!({
            "analysis": "factor",
            "source": self.source.to_string(),
            "observations": table.len(),
            "dropped_rows": dropped,
            "n_factors": solution.n_factors,
            "rotation": solution.rotation,
            "eigenvalues": solution.eigenvalues,
            "loadings": loadings_json,
            "variance_explained": solution.variance_explained().to_vec(),
        });

        let mut artifacts = vec![Artifact::text("loadings.csv", Self::loadings_csv(&solution)?)];

        let mut scores = String::from("row");
        for j in 1..=solution.n_factors {
            let _ = write!(scores, ",Factor{}", j);
        }
        scores.push('\n');
        for (i, row) in solution.scores.rows().into_iter().enumerate() {
            let _ = write!(scores, "{}", i + 1);
            for v in row {
                let _ = write!(scores, ",{:.6}", v);
            }
            scores.push('\n');
        }
        artifacts.push(Artifact::text("scores.csv", scores));

        if self.plots {
            artifacts.extend(plots::chart_artifact(
                "scree_plot.svg",
                plots::scree_plot(&solution.eigenvalues),
            ));

            if solution.n_factors >= 2 {
                let points: Vec<(f64, f64)> = solution
                    .scores
                    .rows()
                    .into_iter()
                    .map(|r| (r[0], r[1]))
                    .collect();
                let labels: Vec<String> = match &self.config.label_column {
                    Some(label) => table
                        .text_column(label)?
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    None => Vec::new(),
                };
                let vectors: Vec<(String, f64, f64)> = solution
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), solution.loadings[[i, 0]], solution.loadings[[i, 1]]))
                    .collect();
                artifacts.extend(plots::chart_artifact(
                    "perceptual_map.svg",
                    plots::perceptual_map(&points, &labels, &vectors, ("Factor 1", "Factor 2")),
                ));
            } else {
                tracing::info!("Only one factor retained, skipping perceptual map");
            }
        }

        Ok(AnalysisReport {
            name: "factor".to_string(),
            summary,
            json,
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two latent traits behind four ratings, plus a name column.
    fn table() -> Table {
        let mut csv = String::from("name,math,physics,reading,writing\n");
        let mut state: u64 = 7;
        let mut noise = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        };
        for i in 0..40 {
            let quant = noise() * 4.0;
            let verbal = noise() * 4.0;
            csv.push_str(&format!(
                "s{},{:.4},{:.4},{:.4},{:.4}\n",
                i,
                quant + noise() * 0.5,
                quant + noise() * 0.5,
                verbal + noise() * 0.5,
                verbal + noise() * 0.5
            ));
        }
        csv.push_str("blank,,1,2,3\n");
        Table::from_csv_bytes(csv.as_bytes()).unwrap()
    }

    fn config(columns: Option<Vec<&str>>) -> FactorConfig {
        FactorConfig {
            source: "ratings.csv".to_string(),
            columns: columns.map(|c| c.into_iter().map(str::to_string).collect()),
            exclude: None,
            n_factors: Some(2),
            rotation: None,
            label_column: Some("name".to_string()),
        }
    }

    #[test]
    fn test_select_columns_skips_label_and_text() {
        let analysis = FactorAnalysis::new(config(None), false).unwrap();
        let columns = analysis.select_columns(&table()).unwrap();
        assert_eq!(columns, vec!["math", "physics", "reading", "writing"]);
    }

    #[tokio::test]
    async fn test_automatic_columns_keep_column_with_blank_cell() {
        let analysis = FactorAnalysis::new(config(None), false).unwrap();
        let report = analysis.analyze(table()).await.unwrap();

        assert_eq!(report.json["dropped_rows"], 1);
        assert_eq!(report.json["observations"], 40);
        let variables: Vec<&str> = report.json["loadings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["variable"].as_str().unwrap())
            .collect();
        assert_eq!(variables, vec!["math", "physics", "reading", "writing"]);
    }

    #[tokio::test]
    async fn test_analyze_produces_two_factor_solution() {
        let analysis = FactorAnalysis::new(
            config(Some(vec!["math", "physics", "reading", "writing"])),
            true,
        )
        .unwrap();
        let report = analysis.analyze(table()).await.unwrap();

        assert_eq!(report.json["n_factors"], 2);
        assert_eq!(report.json["dropped_rows"], 1);
        assert_eq!(report.json["rotation"], "varimax");
        assert!(report.summary.contains("Eigenvalues"));

        let names: Vec<&str> = report.artifacts.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["loadings.csv", "scores.csv", "scree_plot.svg", "perceptual_map.svg"]
        );

        let map = String::from_utf8(report.artifacts[3].bytes.clone()).unwrap();
        assert!(map.contains("s0"));
        assert!(map.contains("reading"));
    }

    #[tokio::test]
    async fn test_analyze_rejects_single_column() {
        let analysis = FactorAnalysis::new(config(Some(vec!["math"])), false).unwrap();
        let err = analysis.analyze(table()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigValidationError { .. }));
    }
}
