use clap::{Parser, Subcommand};
use std::path::PathBuf;

use covermap::types::Reducer;

#[derive(Parser)]
#[command(name = "covermap", version, about = "Land-cover classification from optical and radar composites")]
pub struct CliArgs {
    /// Pipeline configuration (JSON). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable logging (RUST_LOG overrides the level)
    #[arg(long, default_value_t = false, global = true)]
    pub log: bool,

    /// Log at debug level
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Composite, train, validate, classify and export
    Run {
        /// Seed for the train/validation split and both forests
        #[arg(long)]
        seed: Option<u64>,

        /// Override the storage prefix
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Skip JPEG quicklooks
        #[arg(long, default_value_t = false)]
        no_quicklooks: bool,
    },

    /// Build the feature stack and write one GeoTIFF per band
    Composite {
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Temporal reducer for the optical composite
        #[arg(long, value_enum)]
        reducer: Option<Reducer>,
    },

    /// Recompute accuracy figures from an exported validation table
    Validate {
        /// Validation CSV with `class` and `classification` columns
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the class legend and confidence bands
    Legend,

    /// Write the default configuration
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "covermap.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}
