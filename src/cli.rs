use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "skytruth-etl",
    version,
    about = "Blend FracFocus report and chemical exports into files and databases"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON pipeline configuration; built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    #[arg(long)]
    pub target_dir: Option<PathBuf>,

    #[arg(long = "report-file")]
    pub report_files: Vec<String>,

    #[arg(long = "chemical-file")]
    pub chemical_files: Vec<String>,

    #[arg(long, env = "SKYTRUTH_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, default_value_t = false)]
    pub skip_remote: bool,

    /// Exit non-zero unless every destination, the remote database included,
    /// was published.
    #[arg(long, default_value_t = false, conflicts_with = "skip_remote")]
    pub require_remote: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub target_dir: Option<PathBuf>,
}
