use clap::Parser;
use london_ev_etl::utils::error::{EtlError, ErrorSeverity};
use london_ev_etl::utils::{logger, validation::Validate};
use london_ev_etl::{CliConfig, FileSink, LocalStorage, TomlConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting london-ev-etl CLI");
    tracing::debug!("CLI config: {:?}", cli);

    let mut config = match TomlConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => fail("Failed to load configuration", &e),
    };
    if !cli.sources.is_empty() {
        config.sources.enabled = cli.sources.iter().map(ToString::to_string).collect();
    }
    if let Some(output_path) = &cli.output_path {
        config.load.output_path = output_path.clone();
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        fail("Configuration validation failed", &e);
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let sink_options = match config.sink_options() {
        Ok(options) => options,
        Err(e) => fail("Configuration validation failed", &e),
    };
    let engine = match config.build_engine(Arc::new(FileSink::new(storage, sink_options))) {
        Ok(engine) => engine,
        Err(e) => fail("Failed to build pipeline", &e),
    };

    let bbox = config.bounding_box();
    let enabled = match config.enabled_sources() {
        Ok(enabled) => enabled,
        Err(e) => fail("Configuration validation failed", &e),
    };

    if cli.dry_run {
        match engine.plan(&bbox, &enabled) {
            Ok(adapters) => {
                println!("🧪 Dry run: configuration is valid");
                println!(
                    "📦 Bounding box: lat {}..{}, lon {}..{}",
                    bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon
                );
                for adapter in adapters {
                    println!("🔌 Would fetch from {}", adapter.source());
                }
                println!("📁 Output would go to: {}", config.output_path());
                return Ok(());
            }
            Err(e) => fail("Dry run failed", &e),
        }
    }

    match engine.run(&bbox, &enabled).await {
        Ok(output) => {
            let report = &output.report;
            tracing::info!("✅ ETL process completed successfully!");
            println!("✅ ETL process completed successfully!");
            println!("📁 Output saved to: {}", output.output_path);
            println!(
                "📊 {} rows written ({} matched pairs)",
                report.output_rows, report.matched_pairs
            );
            for (source, reason) in &report.unavailable {
                println!("⚠️ Degraded run: {} unavailable ({})", source, reason);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            fail("ETL process failed", &e);
        }
    }

    Ok(())
}

fn fail(context: &str, e: &EtlError) -> ! {
    tracing::error!("❌ {}: {}", context, e);
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
