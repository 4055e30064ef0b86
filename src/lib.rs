pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{cli::LocalStorage, toml_config::TomlConfig, CliConfig};

#[cfg(feature = "lambda")]
pub use config::lambda::S3Storage;
pub use config::lambda::{LambdaConfig, RunVariant};

pub use adapters::{FileSink, SinkOptions};
pub use core::{EtlEngine, RunOutput};
pub use domain::model::{BoundingBox, CleanedPoint, MergedPoint, NormalizedPoint, Source};
pub use domain::report::RunReport;
pub use utils::error::{EtlError, Result};
