use crate::config::toml_config::ConjointConfig;
use crate::core::conjoint::{self, group_choice_sets, ProductShare, WillingnessToPay};
use crate::core::design::Encoder;
use crate::core::inference::{coefficients_csv, render_table};
use crate::core::plots;
use crate::core::source::DataSource;
use crate::core::{Analysis, AnalysisReport, Artifact, Table};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt::Write;

/// Choice-based conjoint on long-format data: one row per alternative,
/// a 0/1 choice column and one or more columns identifying the choice set.
pub struct ConjointAnalysis {
    config: ConjointConfig,
    source: DataSource,
    client: Client,
    plots: bool,
}

impl ConjointAnalysis {
    pub fn new(config: ConjointConfig, plots: bool) -> Result<Self> {
        let source = DataSource::parse(&config.source)?;
        Ok(Self {
            config,
            source,
            client: Client::new(),
            plots,
        })
    }

    fn required_columns(&self) -> Vec<String> {
        let mut columns = self.config.choice_set.clone();
        columns.push(self.config.choice_column.clone());
        columns.extend(self.config.terms.iter().map(|t| t.column().to_string()));
        columns
    }

    /// One key per row: the row's values in every choice-set column.
    fn set_keys<'a>(&self, table: &'a Table) -> Result<Vec<Vec<&'a str>>> {
        let parts = self
            .config
            .choice_set
            .iter()
            .map(|c| table.text_column(c))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..table.len())
            .map(|row| parts.iter().map(|column| column[row]).collect())
            .collect())
    }

    fn products(&self) -> Result<Vec<(String, HashMap<String, String>)>> {
        self.config
            .products
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|p| Ok((p.name.clone(), p.profile()?)))
            .collect()
    }
}

#[async_trait]
impl Analysis for ConjointAnalysis {
    fn name(&self) -> &str {
        "conjoint"
    }

    async fn extract(&self) -> Result<Table> {
        self.source.load_table(&self.client).await
    }

    async fn analyze(&self, mut table: Table) -> Result<AnalysisReport> {
        let dropped = table.drop_incomplete(&self.required_columns())?;
        if dropped > 0 {
            tracing::warn!("Dropped {} alternatives with blank cells", dropped);
        }

        let chosen = table.numeric_column(&self.config.choice_column)?;
        let sets = group_choice_sets(&self.set_keys(&table)?, &chosen)?;
        tracing::debug!("Grouped {} alternatives into {} choice sets", table.len(), sets.len());

        let encoder = Encoder::fit(&table, &self.config.terms, false)?;
        let design = encoder.transform(&table)?;
        let model = conjoint::fit(&design, &sets)?;
        let stats = model.statistics();
        let partworths = model.partworths(&encoder);

        let wtp: Vec<WillingnessToPay> = match &self.config.price_column {
            Some(price) => model.willingness_to_pay(price)?,
            None => Vec::new(),
        };

        let products = self.products()?;
        let shares: Vec<ProductShare> = if products.is_empty() {
            Vec::new()
        } else {
            model.simulate_shares(&encoder, &products)?
        };

        let mut summary = String::new();
        let _ = writeln!(summary, "Conditional Logit Results ({})", self.source);
        let _ = writeln!(
            summary,
            "Choice sets: {}  Alternatives: {}  Dropped rows: {}",
            stats.n_sets, stats.n_alternatives, dropped
        );
        let _ = writeln!(
            summary,
            "Log-likelihood: {:.3}  LL-null: {:.3}  Pseudo R-squ.: {:.4}  AIC: {:.3}  Iterations: {}",
            stats.log_likelihood,
            stats.null_log_likelihood,
            stats.pseudo_r_squared,
            stats.aic,
            stats.iterations
        );
        let _ = writeln!(summary);
        summary.push_str(&render_table(&model.coefficients));

        let _ = writeln!(summary, "\nPartworths:");
        for (attribute, levels) in &partworths {
            let _ = writeln!(summary, "  {}", attribute);
            for (level, value) in levels {
                let _ = writeln!(summary, "    {:<24} {:>10.4}", level, value);
            }
        }

        if !wtp.is_empty() {
            let _ = writeln!(summary, "\nWillingness to pay:");
            for w in &wtp {
                let _ = writeln!(summary, "  {:<30} {:>10.2}", w.term, w.value);
            }
        }

        if !shares.is_empty() {
            let _ = writeln!(summary, "\nSimulated market shares:");
            for s in &shares {
                let _ = writeln!(
                    summary,
                    "  {:<20} utility {:>8.4}  share {:>6.2}%",
                    s.name,
                    s.utility,
                    s.share * 100.0
                );
            }
        }

        let json = serde_json::json!({
            "analysis": "conjoint",
            "source": self.source.to_string(),
            "dropped_rows": dropped,
            "statistics": stats,
            "coefficients": model.coefficients,
            "partworths": partworths,
            "willingness_to_pay": wtp,
            "market_shares": shares,
        });

        let mut artifacts = vec![Artifact::text(
            "coefficients.csv",
            coefficients_csv(&model.coefficients)?,
        )];
        if !shares.is_empty() {
            let mut csv = String::from("product,utility,share\n");
            for s in &shares {
                let _ = writeln!(csv, "{},{:.6},{:.6}", s.name, s.utility, s.share);
            }
            artifacts.push(Artifact::text("market_shares.csv", csv));
            if self.plots {
                artifacts.extend(plots::chart_artifact(
                    "share_chart.svg",
                    plots::share_chart(&shares),
                ));
            }
        }

        Ok(AnalysisReport {
            name: "conjoint".to_string(),
            summary,
            json,
            artifacts,
        })
    }
}
