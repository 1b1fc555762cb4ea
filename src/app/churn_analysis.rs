use crate::config::toml_config::ChurnConfig;
use crate::core::clv::{PriceOptimum, PriceScenario};
use crate::core::design::{binary_response, Encoder};
use crate::core::inference::{coefficients_csv, render_table};
use crate::core::logit::{self, ConfusionMatrix, FitOptions};
use crate::core::plots;
use crate::core::source::DataSource;
use crate::core::{Analysis, AnalysisReport, Artifact, Table};
use crate::utils::error::{AnalysisError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt::Write;

/// Logistic churn model, confusion matrix at the configured threshold and,
/// when `[churn.clv]` is present, the profit-maximizing price multiplier.
pub struct ChurnAnalysis {
    config: ChurnConfig,
    source: DataSource,
    client: Client,
    plots: bool,
}

impl ChurnAnalysis {
    pub fn new(config: ChurnConfig, plots: bool) -> Result<Self> {
        let source = DataSource::parse(&config.source)?;
        Ok(Self {
            config,
            source,
            client: Client::new(),
            plots,
        })
    }

    fn optimize_price(
        &self,
        encoder: &Encoder,
        fit: &logit::LogitFit,
        x: &ndarray::Array2<f64>,
    ) -> Result<Option<PriceOptimum>> {
        let Some(clv) = &self.config.clv else {
            return Ok(None);
        };
        let position = encoder.numeric_position(&clv.price_column).ok_or_else(|| {
            AnalysisError::InvalidConfigValueError {
                field: "churn.clv.price_column".to_string(),
                value: clv.price_column.clone(),
                reason: "Price column must be a numeric term of the churn model".to_string(),
            }
        })?;
        let scenario = PriceScenario::new(fit, x, position, clv.margin_rate(), clv.discount)?;
        let (lower, upper) = clv.bounds();
        Ok(Some(scenario.optimize(lower, upper)?))
    }
}

#[async_trait]
impl Analysis for ChurnAnalysis {
    fn name(&self) -> &str {
        "churn"
    }

    async fn extract(&self) -> Result<Table> {
        self.source.load_table(&self.client).await
    }

    async fn analyze(&self, mut table: Table) -> Result<AnalysisReport> {
        let dropped = table.drop_incomplete(&self.config.model_columns())?;
        if dropped > 0 {
            tracing::warn!("Dropped {} rows with blank model columns", dropped);
        }

        let encoder = Encoder::fit(&table, &self.config.terms, self.config.intercept())?;
        let design = encoder.transform(&table)?;
        let y = binary_response(
            &table,
            &self.config.response,
            self.config.positive_label.as_deref(),
        )?;
        tracing::debug!(
            "Design matrix {} x {}, churn rate {:.4}",
            design.x.nrows(),
            design.x.ncols(),
            y.mean().unwrap_or(0.0)
        );

        let fit = logit::fit(&design, &y, FitOptions::default())?;
        let stats = fit.statistics()?;
        let probabilities = fit.predict_proba(&design.x);
        let confusion = ConfusionMatrix::at_threshold(&y, &probabilities, self.config.threshold())?;
        let optimum = self.optimize_price(&encoder, &fit, &design.x)?;

        let mut summary = String::new();
        let _ = writeln!(summary, "Logit Regression Results ({})", self.source);
        let _ = writeln!(
            summary,
            "Dep. variable: {}  No. observations: {}  Dropped rows: {}",
            self.config.response, stats.n_obs, dropped
        );
        let _ = writeln!(
            summary,
            "Log-likelihood: {:.3}  LL-null: {:.3}  Pseudo R-squ.: {:.4}  LLR p-value: {:.4e}",
            stats.log_likelihood, stats.null_log_likelihood, stats.pseudo_r_squared, stats.llr_p_value
        );
        let _ = writeln!(
            summary,
            "AIC: {:.3}  BIC: {:.3}  Iterations: {}",
            stats.aic, stats.bic, stats.iterations
        );
        let _ = writeln!(summary);
        summary.push_str(&render_table(&fit.coefficients));

        let _ = writeln!(summary, "\nOdds ratios:");
        for (term, ratio) in fit.odds_ratios() {
            let _ = writeln!(summary, "  {:<30} {:>10.4}", term, ratio);
        }

        let _ = writeln!(summary, "\nConfusion matrix at threshold {:.2}:", confusion.threshold);
        let _ = writeln!(summary, "               predicted 0  predicted 1");
        let _ = writeln!(
            summary,
            "  actual 0     {:>11}  {:>11}",
            confusion.true_negative, confusion.false_positive
        );
        let _ = writeln!(
            summary,
            "  actual 1     {:>11}  {:>11}",
            confusion.false_negative, confusion.true_positive
        );
        let _ = writeln!(
            summary,
            "  accuracy {:.4}  sensitivity {:.4}  specificity {:.4}  precision {:.4}",
            confusion.accuracy(),
            confusion.sensitivity(),
            confusion.specificity(),
            confusion.precision()
        );

        if let Some(opt) = &optimum {
            let _ = writeln!(summary, "\nPrice optimization:");
            let _ = writeln!(
                summary,
                "  baseline profit (k = 1): {:.2}  mean churn {:.4}",
                opt.baseline_profit, opt.mean_churn_baseline
            );
            let _ = writeln!(
                summary,
                "  optimal multiplier k = {:.4}: profit {:.2}  mean churn {:.4}  uplift {:.2}",
                opt.multiplier, opt.profit, opt.mean_churn_optimal, opt.uplift
            );
        }

        let json = serde_json::json!({
            "analysis": "churn",
            "source": self.source.to_string(),
            "response": self.config.response,
            "dropped_rows": dropped,
            "statistics": stats,
            "coefficients": fit.coefficients,
            "odds_ratios": fit.odds_ratios().into_iter().collect::<std::collections::BTreeMap<_, _>>(),
            "confusion_matrix": {
                "threshold": confusion.threshold,
                "true_positive": confusion.true_positive,
                "false_positive": confusion.false_positive,
                "true_negative": confusion.true_negative,
                "false_negative": confusion.false_negative,
                "accuracy": confusion.accuracy(),
                "sensitivity": confusion.sensitivity(),
                "specificity": confusion.specificity(),
                "precision": confusion.precision(),
            },
            "price_optimization": optimum,
        });

        let mut predictions = String::from("row,actual,probability,predicted\n");
        for (i, (&actual, &p)) in y.iter().zip(probabilities.iter()).enumerate() {
            let _ = writeln!(
                predictions,
                "{},{},{:.6},{}",
                i + 1,
                actual,
                p,
                u8::from(p >= confusion.threshold)
            );
        }

        let mut artifacts = vec![
            Artifact::text("coefficients.csv", coefficients_csv(&fit.coefficients)?),
            Artifact::text("predictions.csv", predictions),
        ];
        if self.plots {
            let probabilities: Vec<f64> = probabilities.to_vec();
            artifacts.extend(plots::chart_artifact(
                "churn_probability.svg",
                plots::probability_histogram(&probabilities, confusion.threshold),
            ));
        }

        Ok(AnalysisReport {
            name: "churn".to_string(),
            summary,
            json,
            artifacts,
        })
    }
}
