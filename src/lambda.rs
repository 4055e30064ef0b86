use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client as S3Client;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use london_ev_etl::utils::{logger, validation::Validate};
use london_ev_etl::{FileSink, LambdaConfig, RunReport, RunVariant, S3Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every field falls back to the function's environment.
#[derive(Debug, Default, Deserialize)]
pub struct Request {
    pub variant: Option<RunVariant>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
}

#[derive(Serialize)]
pub struct Response {
    pub status: String,
    pub output_path: String,
    pub report: RunReport,
}

async fn function_handler(event: LambdaEvent<Request>) -> Result<Response, Error> {
    tracing::info!("Starting EV charger ETL Lambda function");

    let mut lambda_config = LambdaConfig::from_env()?;
    if let Some(bucket) = event.payload.s3_bucket {
        lambda_config.s3_bucket = bucket;
    }
    if let Some(prefix) = event.payload.s3_prefix {
        lambda_config.s3_prefix = prefix;
    }
    if let Some(variant) = event.payload.variant {
        lambda_config.variant = variant;
    }
    lambda_config.validate()?;

    let etl_config = lambda_config.to_etl_config(lambda_config.variant);
    etl_config.validate()?;

    // 創建AWS配置和S3客戶端
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .region(Region::new(lambda_config.s3_region.clone()))
        .build();
    let storage = S3Storage::new(
        S3Client::from_conf(s3_config),
        lambda_config.s3_bucket.clone(),
        lambda_config.s3_prefix.clone(),
    );

    let sink = FileSink::new(storage, etl_config.sink_options()?);
    let engine = etl_config.build_engine(Arc::new(sink))?;
    let output = engine
        .run(&etl_config.bounding_box(), &etl_config.enabled_sources()?)
        .await?;

    let status = if output.report.is_degraded() {
        "completed_degraded"
    } else {
        "completed"
    };
    tracing::info!("ETL Lambda function finished with status {}", status);

    Ok(Response {
        status: status.to_string(),
        output_path: output.output_path,
        report: output.report,
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    run(service_fn(function_handler)).await
}
