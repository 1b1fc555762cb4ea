pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::AnalysisConfig, AnalysisKind};

pub use app::{build_analyses, ChurnAnalysis, ConjointAnalysis, FactorAnalysis};
pub use core::engine::{AnalysisEngine, RunOutcome};
pub use utils::error::{AnalysisError, Result};
