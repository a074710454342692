//! freg CLI
//!
//! Command-line tools for inspecting and maintaining freg stores.
//!
//! # Commands
//!
//! - `init` - Create a store
//! - `inspect` - Display instance, counters and table sizes
//! - `verify` - Check tables and blobs against each other
//! - `list` - List changes, heads, missing entries or storage
//! - `graph` - Print the change forest as Graphviz DOT
//! - `cat` - Write a blob to stdout

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// freg store tools.
#[derive(Parser)]
#[command(name = "freg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store root
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format of listing commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One line per row.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Tables that can be listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Table {
    /// Every change.
    Changes,
    /// Materialized heads.
    Heads,
    /// Announced but undefined changes.
    Missing,
    /// Reference-counted blobs.
    Storage,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a store
    Init {
        /// Name of the local instance
        #[arg(short, long)]
        name: String,
    },

    /// Display instance, counters and table sizes
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check tables and blobs against each other
    Verify,

    /// List the rows of a table
    List {
        /// Table to list
        #[arg(value_enum)]
        table: Table,

        /// Only heads inside this directory node (`<instance>.n<index>` or `root`)
        #[arg(short, long)]
        dir: Option<String>,

        /// Rows to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Maximum rows to show
        #[arg(short, long, default_value = "100")]
        limit: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print the change forest as Graphviz DOT
    Graph,

    /// Write a blob to stdout
    Cat {
        /// Storage id of the blob
        storage: u64,
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
        Commands::Init { name } => {
            let path = cli.path.ok_or("Store path required for init")?;
            commands::init::run(&path, &name)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::List {
            table,
            dir,
            offset,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for list")?;
            commands::list::run(&path, table, dir.as_deref(), offset, limit, format)?;
        }
        Commands::Graph => {
            let path = cli.path.ok_or("Store path required for graph")?;
            commands::graph::run(&path)?;
        }
        Commands::Cat { storage } => {
            let path = cli.path.ok_or("Store path required for cat")?;
            commands::cat::run(&path, storage)?;
        }
        Commands::Version => {
            println!("freg CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("freg core v{}", freg_core::VERSION);
        }
    }

    Ok(())
}
