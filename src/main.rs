use clap::Parser;
use kylie::utils::{error::ErrorSeverity, logger, validation::Validate};
use kylie::{CliConfig, LocalStorage, Normalizer, SchemaConfig};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting kylie CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    // 載入 schema 並建立模型
    tracing::info!("📁 Loading schema from: {}", config.schema);
    let registry = match SchemaConfig::from_file(&config.schema).and_then(|s| s.build_registry()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("❌ Failed to load schema '{}': {}", config.schema, e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };
    tracing::info!(
        "📋 Models: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );

    let output = Path::new(&config.output_path)
        .join(config.output_file())
        .to_string_lossy()
        .into_owned();

    // Paths are used as given, relative to the working directory.
    let storage = LocalStorage::new(String::new());
    let normalizer = Normalizer::new(storage, registry, config.model.clone()).with_format(config.format);

    match normalizer.run(&config.input, &output).await {
        Ok(report) => {
            tracing::info!("✅ Normalized {} record(s)", report.records);
            println!("✅ Normalized {} record(s)", report.records);
            println!("📁 Output saved to: {}", report.output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Normalization failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,   // 輸入資料不符合 schema
                ErrorSeverity::High => 1,     // schema 或參數錯誤
                ErrorSeverity::Critical => 3, // 系統錯誤
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
