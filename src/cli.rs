use std::path::PathBuf;

use clap::Parser;

/// Runs the API scenarios of a TOML file against the demo services
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the scenario file
    #[arg(short, long, default_value = "api_proof.toml")]
    pub path: String,

    /// Write Allure result files into this directory
    #[arg(short, long)]
    pub results_dir: Option<PathBuf>,

    /// Directory holding the JSON schema fixtures
    #[arg(long)]
    pub schema_dir: Option<PathBuf>,

    /// Only run tests whose name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Ignore HTTP(S)_PROXY and friends from the environment
    #[arg(long)]
    pub no_proxy: bool,
}
