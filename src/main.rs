use anyhow::Context;
use clap::Parser;
use marketlab::config::Command;
use marketlab::core::clv::clv;
use marketlab::utils::error::ErrorSeverity;
use marketlab::utils::logger::{self, LogFormat};
use marketlab::utils::validation::Validate;
use marketlab::{
    build_analyses, AnalysisConfig, AnalysisEngine, AnalysisError, AnalysisKind, CliConfig,
    LocalStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logger::init_logger(format, cli.verbose);
    tracing::debug!("CLI config: {:?}", cli);

    match cli.command {
        Command::Clv {
            margin,
            churn,
            discount,
        } => {
            let value = clv(margin, churn, discount).with_context(|| {
                format!(
                    "cannot compute CLV for margin {}, churn {}, discount {}",
                    margin, churn, discount
                )
            })?;
            println!("{:.4}", value);
        }
        Command::Run {
            config,
            only,
            output_path,
            dry_run,
        } => {
            if let Err(e) = run(&config, only, output_path, dry_run).await {
                report_failure(&e);
            }
        }
    }

    Ok(())
}

async fn run(
    config_path: &str,
    only: Option<AnalysisKind>,
    output_path: Option<String>,
    dry_run: bool,
) -> Result<(), AnalysisError> {
    tracing::info!("Loading configuration from {}", config_path);
    let mut config = AnalysisConfig::from_file(config_path)?;
    if let Some(path) = output_path {
        config.report.output_path = path;
    }

    // 驗證配置
    config.validate()?;

    let analyses = build_analyses(&config, only)?;

    if dry_run {
        println!("Report '{}' (dry run)", config.report.name);
        println!("  output: {} (compress: {})", config.output_path(), config.compress());
        for analysis in &analyses {
            println!("  would run: {}", analysis.name());
        }
        return Ok(());
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let engine = AnalysisEngine::new(storage, config.compress());

    for analysis in &analyses {
        let outcome = engine.run(analysis.as_ref()).await?;
        println!("{}", outcome.summary);
        println!("📁 {} output saved to: {}", outcome.name, outcome.location);
    }

    tracing::info!("✅ Report '{}' completed successfully!", config.report.name);
    Ok(())
}

fn report_failure(e: &AnalysisError) {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Analysis failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
}
