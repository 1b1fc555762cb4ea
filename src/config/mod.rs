pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "marketlab")]
#[command(about = "Churn, factor and conjoint analyses for marketing data")]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the analyses configured in a TOML file
    Run {
        /// Path to TOML configuration file
        #[arg(short, long, default_value = "marketlab.toml")]
        config: String,

        /// Run only one of the configured analyses
        #[arg(long, value_enum)]
        only: Option<AnalysisKind>,

        /// Override the output directory from the config
        #[arg(long)]
        output_path: Option<String>,

        /// Validate the config and describe the work without fitting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Customer lifetime value for a single margin / churn / discount triple
    Clv {
        #[arg(long)]
        margin: f64,

        #[arg(long)]
        churn: f64,

        #[arg(long)]
        discount: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum AnalysisKind {
    Churn,
    Factor,
    Conjoint,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Churn => "churn",
            AnalysisKind::Factor => "factor",
            AnalysisKind::Conjoint => "conjoint",
        }
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = CliConfig::parse_from([
            "marketlab", "run", "--config", "analysis.toml", "--only", "conjoint", "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Run { config, only, dry_run, .. } => {
                assert_eq!(config, "analysis.toml");
                assert_eq!(only, Some(AnalysisKind::Conjoint));
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_clv_command() {
        let cli = CliConfig::parse_from([
            "marketlab", "clv", "--margin", "100", "--churn", "0.2", "--discount", "0.9",
        ]);
        match cli.command {
            Command::Clv { margin, churn, discount } => {
                assert_eq!((margin, churn, discount), (100.0, 0.2, 0.9));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
