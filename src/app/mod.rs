pub mod churn_analysis;
pub mod conjoint_analysis;
pub mod factor_analysis;

pub use churn_analysis::ChurnAnalysis;
pub use conjoint_analysis::ConjointAnalysis;
pub use factor_analysis::FactorAnalysis;

use crate::config::toml_config::AnalysisConfig;
use crate::config::AnalysisKind;
use crate::core::Analysis;
use crate::utils::error::{AnalysisError, Result};

/// The configured analyses in run order, optionally narrowed to one kind.
pub fn build_analyses(
    config: &AnalysisConfig,
    only: Option<AnalysisKind>,
) -> Result<Vec<Box<dyn Analysis>>> {
    let wanted = |kind: AnalysisKind| only.map_or(true, |o| o == kind);
    let plots = config.plots();
    let mut analyses: Vec<Box<dyn Analysis>> = Vec::new();

    if wanted(AnalysisKind::Churn) {
        if let Some(churn) = &config.churn {
            analyses.push(Box::new(ChurnAnalysis::new(churn.clone(), plots)?));
        }
    }
    if wanted(AnalysisKind::Factor) {
        if let Some(factor) = &config.factor {
            analyses.push(Box::new(FactorAnalysis::new(factor.clone(), plots)?));
        }
    }
    if wanted(AnalysisKind::Conjoint) {
        if let Some(conjoint) = &config.conjoint {
            analyses.push(Box::new(ConjointAnalysis::new(conjoint.clone(), plots)?));
        }
    }

    if analyses.is_empty() {
        return Err(AnalysisError::MissingConfigError {
            field: only.map_or("analyses", |o| o.as_str()).to_string(),
        });
    }
    Ok(analyses)
}
