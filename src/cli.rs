use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Watchdog and harvest trigger for a piveau search hub.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Append log records to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the search endpoint once and restart the hub if it is down.
    Watch {
        /// Path to the config file.
        #[arg(short, long, default_value = "hubwatch.toml")]
        config: PathBuf,
    },
    /// Trigger dataset harvesting pipes.
    Harvest(HarvestArgs),
}

#[derive(clap::Args, Debug)]
pub struct HarvestArgs {
    /// Project whose pipes are harvested.
    #[arg(short, long, value_parser = ["nfdi4ds", "quadriga", "nfdi4cat"])]
    pub project: String,

    /// Pipe(s) to harvest.
    #[arg(short, long = "dataset", required_unless_present = "all")]
    pub datasets: Vec<String>,

    /// Harvest every pipe of the project.
    #[arg(short, long, conflicts_with = "datasets")]
    pub all: bool,

    /// Send the triggers instead of only logging them.
    #[arg(long)]
    pub skip_dry_run: bool,

    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value_t = 8090)]
    pub port: u16,

    /// Seconds to wait between two triggers.
    #[arg(long, default_value_t = 300)]
    pub delay: u64,

    /// Seconds before a trigger request is abandoned.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Directory holding `<project>/*.yaml` pipe definitions.
    #[arg(long, default_value = "pipes")]
    pub pipes_dir: PathBuf,
}
