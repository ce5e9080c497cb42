//! txlog CLI
//!
//! Command-line tools for inspecting transaction log files.
//!
//! # Commands
//!
//! - `header` - Display the file header
//! - `dump` - Print every entry in the file
//! - `verify` - Check checksums and report the state of the tail

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Transaction log inspection tools.
#[derive(Parser)]
#[command(name = "txlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for commands that print records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable lines
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the header of a log file
    Header {
        /// Log file to read
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the entries of a log file
    Dump {
        /// Log file to read
        file: PathBuf,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Fail when a start entry does not continue the previous transaction's checksum
        #[arg(long)]
        verify_chain: bool,
    },

    /// Verify every entry checksum and report the log tail
    Verify {
        /// Log file to check
        file: PathBuf,

        /// Also check the transaction checksum chain
        #[arg(long)]
        verify_chain: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Header { file, format } => commands::header::run(&file, format)?,
        Commands::Dump {
            file,
            limit,
            format,
            verify_chain,
        } => commands::dump::run(&file, limit, format, verify_chain)?,
        Commands::Verify { file, verify_chain } => commands::verify::run(&file, verify_chain)?,
        Commands::Version => {
            println!("txlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("txlog core v{}", txlog_core::VERSION);
        }
    }

    Ok(())
}
