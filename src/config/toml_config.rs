use crate::core::design::Term;
use crate::core::factor::Rotation;
use crate::utils::error::{AnalysisError, Result};
use crate::utils::validation::{
    validate_bounds, validate_non_empty_string, validate_path, validate_range,
    validate_source, validate_unique_columns, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub report: ReportConfig,
    pub churn: Option<ChurnConfig>,
    pub factor: Option<FactorConfig>,
    pub conjoint: Option<ConjointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub name: String,
    pub output_path: String,
    pub compress: Option<bool>,
    pub plots: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnConfig {
    pub source: String,
    pub response: String,
    pub positive_label: Option<String>,
    pub terms: Vec<Term>,
    pub intercept: Option<bool>,
    pub threshold: Option<f64>,
    pub clv: Option<ClvConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClvConfig {
    pub price_column: String,
    pub discount: f64,
    pub margin_rate: Option<f64>,
    pub bounds: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorConfig {
    pub source: String,
    pub columns: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub n_factors: Option<usize>,
    pub rotation: Option<Rotation>,
    pub label_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConjointConfig {
    pub source: String,
    pub choice_column: String,
    pub choice_set: Vec<String>,
    pub terms: Vec<Term>,
    pub price_column: Option<String>,
    pub products: Option<Vec<ProductConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    pub attributes: HashMap<String, toml::Value>,
}

impl ProductConfig {
    /// Attribute levels as strings, the form the design encoder expects.
    pub fn profile(&self) -> Result<HashMap<String, String>> {
        self.attributes
            .iter()
            .map(|(key, value)| {
                let level = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    other => {
                        return Err(AnalysisError::InvalidConfigValueError {
                            field: format!("conjoint.products.{}.{}", self.name, key),
                            value: other.to_string(),
                            reason: "Attribute levels must be strings or numbers".to_string(),
                        })
                    }
                };
                Ok((key.clone(), level))
            })
            .collect()
    }
}

impl ChurnConfig {
    pub fn threshold(&self) -> f64 {
        self.threshold.unwrap_or(0.5)
    }

    pub fn intercept(&self) -> bool {
        self.intercept.unwrap_or(true)
    }

    /// Columns whose blank cells drop a row before fitting.
    pub fn model_columns(&self) -> Vec<String> {
        std::iter::once(self.response.clone())
            .chain(self.terms.iter().map(|t| t.column().to_string()))
            .collect()
    }
}

impl ClvConfig {
    pub fn margin_rate(&self) -> f64 {
        self.margin_rate.unwrap_or(1.0)
    }

    pub fn bounds(&self) -> (f64, f64) {
        let [lower, upper] = self.bounds.unwrap_or([0.5, 2.0]);
        (lower, upper)
    }
}

impl FactorConfig {
    pub fn rotation(&self) -> Rotation {
        self.rotation.unwrap_or(Rotation::Varimax)
    }
}

impl AnalysisConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AnalysisError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AnalysisError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATA_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AnalysisError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("report.name", &self.report.name)?;
        validate_path("report.output_path", &self.report.output_path)?;

        if self.churn.is_none() && self.factor.is_none() && self.conjoint.is_none() {
            return Err(AnalysisError::ConfigValidationError {
                field: "analyses".to_string(),
                message: "configure at least one of [churn], [factor] or [conjoint]".to_string(),
            });
        }

        if let Some(churn) = &self.churn {
            validate_source("churn.source", &churn.source)?;
            validate_non_empty_string("churn.response", &churn.response)?;
            validate_range("churn.threshold", churn.threshold(), 0.0, 1.0)?;
            if churn.terms.is_empty() {
                return Err(AnalysisError::MissingConfigError {
                    field: "churn.terms".to_string(),
                });
            }
            let columns: Vec<String> = churn.terms.iter().map(|t| t.column().to_string()).collect();
            validate_unique_columns("churn.terms", &columns)?;

            if let Some(clv) = &churn.clv {
                validate_range("churn.clv.discount", clv.discount, 0.0, 1.0)?;
                let (lower, upper) = clv.bounds();
                validate_bounds("churn.clv.bounds", lower, upper)?;
                if !(clv.margin_rate() > 0.0) {
                    return Err(AnalysisError::InvalidConfigValueError {
                        field: "churn.clv.margin_rate".to_string(),
                        value: clv.margin_rate().to_string(),
                        reason: "Margin rate must be positive".to_string(),
                    });
                }
                let numeric_price = churn
                    .terms
                    .iter()
                    .any(|t| matches!(t, Term::Numeric(c) if *c == clv.price_column));
                if !numeric_price {
                    return Err(AnalysisError::InvalidConfigValueError {
                        field: "churn.clv.price_column".to_string(),
                        value: clv.price_column.clone(),
                        reason: "Price column must be a numeric term of the churn model"
                            .to_string(),
                    });
                }
            }
        }

        if let Some(factor) = &self.factor {
            validate_source("factor.source", &factor.source)?;
            if let Some(columns) = &factor.columns {
                validate_unique_columns("factor.columns", columns)?;
                if columns.len() < 2 {
                    return Err(AnalysisError::ConfigValidationError {
                        field: "factor.columns".to_string(),
                        message: "factor analysis needs at least two columns".to_string(),
                    });
                }
            }
            if let Some(n) = factor.n_factors {
                validate_range("factor.n_factors", n, 1, usize::MAX)?;
            }
        }

        if let Some(conjoint) = &self.conjoint {
            validate_source("conjoint.source", &conjoint.source)?;
            validate_non_empty_string("conjoint.choice_column", &conjoint.choice_column)?;
            if conjoint.choice_set.is_empty() {
                return Err(AnalysisError::MissingConfigError {
                    field: "conjoint.choice_set".to_string(),
                });
            }
            validate_unique_columns("conjoint.choice_set", &conjoint.choice_set)?;
            if conjoint.terms.is_empty() {
                return Err(AnalysisError::MissingConfigError {
                    field: "conjoint.terms".to_string(),
                });
            }
            if let Some(products) = &conjoint.products {
                if products.is_empty() {
                    return Err(AnalysisError::ConfigValidationError {
                        field: "conjoint.products".to_string(),
                        message: "list at least one product to simulate".to_string(),
                    });
                }
                for product in products {
                    validate_non_empty_string("conjoint.products.name", &product.name)?;
                    product.profile()?;
                }
            }
            if let Some(price) = &conjoint.price_column {
                let numeric_price = conjoint
                    .terms
                    .iter()
                    .any(|t| matches!(t, Term::Numeric(c) if c == price));
                if !numeric_price {
                    return Err(AnalysisError::InvalidConfigValueError {
                        field: "conjoint.price_column".to_string(),
                        value: price.clone(),
                        reason: "Price column must be a numeric term of the choice model"
                            .to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn compress(&self) -> bool {
        self.report.compress.unwrap_or(true)
    }

    pub fn plots(&self) -> bool {
        self.report.plots.unwrap_or(true)
    }

    pub fn output_path(&self) -> &str {
        &self.report.output_path
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
