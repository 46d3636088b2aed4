use crate::core::export::ExportFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bill-splitter")]
#[command(version, about = "Split a shared bill from photos of the receipt")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "BILL_SPLITTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the local review server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Compute a split from a bill in the plain-text review format
    Split {
        file: PathBuf,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Read bill photos with the configured parser and compute the split
    Process {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Who shared what, in plain language
        #[arg(short, long)]
        description: String,

        #[command(flatten)]
        export: ExportArgs,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct ExportArgs {
    /// Also write the split as json or csv
    #[arg(long)]
    pub export: Option<ExportFormat>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "split")]
    pub name: String,
}
