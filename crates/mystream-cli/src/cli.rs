use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mystream")]
#[command(about = "Stream MySQL binlog row changes as JSON change events")]
#[command(version)]
pub struct Cli {
    /// Path to the connector config file
    #[arg(short, long, global = true, default_value = "mystream.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template config and .env.example
    Init,

    /// Validate the config and print a summary
    Check {
        /// Also connect to the source and report its binlog position
        #[arg(long)]
        connect: bool,
    },

    /// Stream change events to stdout as JSON lines
    Run {
        /// Stop after this many events
        #[arg(long)]
        limit: Option<u64>,
    },
}
