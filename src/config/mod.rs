pub mod cli;
pub mod lambda;
pub mod toml_config;

use crate::domain::model::Source;
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "ev-etl"))]
#[cfg_attr(
    feature = "cli",
    command(about = "Fetch, match and clean London EV charging points from Google Places and Open Charge Map")
)]
pub struct CliConfig {
    #[cfg_attr(feature = "cli", arg(long, default_value = "etl-config.toml"))]
    pub config: String,

    /// Overrides `sources.enabled`, e.g. `--sources ocm` for an OCM-only run
    #[cfg_attr(feature = "cli", arg(long, value_delimiter = ','))]
    pub sources: Vec<Source>,

    /// Overrides `load.output_path`
    #[cfg_attr(feature = "cli", arg(long))]
    pub output_path: Option<String>,

    #[cfg_attr(feature = "cli", arg(long, help = "Enable verbose output"))]
    pub verbose: bool,

    #[cfg_attr(
        feature = "cli",
        arg(long, help = "Validate the configuration and print the plan without calling any API")
    )]
    pub dry_run: bool,
}
