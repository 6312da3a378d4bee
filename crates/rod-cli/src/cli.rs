use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rod", about = "ROD embedded object database tools", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the metadata of a database
    Info(InfoArgs),
    /// Check version and schema compatibility and read every container
    Check(CheckArgs),
    /// Cluster the records of shared containers by resource
    Arrange(ArrangeArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    /// Database directory
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Database directory
    pub dir: PathBuf,
    /// Library version to check against instead of the running one
    #[arg(long)]
    pub version: Option<String>,
    /// Database configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ArrangeArgs {
    /// Database directory
    pub dir: PathBuf,
    /// Database configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
