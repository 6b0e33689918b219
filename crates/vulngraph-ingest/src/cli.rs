//! Command-line interface definition
//!
//! Kept in the library so documentation can be generated from it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vulngraph-ingest")]
#[command(author, version, about = "Vulnerability graph ingestion tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker count (overrides INGEST_WORKERS)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest NVD JSON feed files
    Feed {
        /// Feed file or directory of *.json feed files
        path: PathBuf,

        /// Write to an in-memory store instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch CVEs from the NVD API by publication year and ingest them
    Api {
        /// First publication year
        #[arg(long)]
        start_year: i32,

        /// Last publication year (defaults to the start year)
        #[arg(long)]
        end_year: Option<i32>,

        /// Write to an in-memory store instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply database migrations
    Migrate,
}
