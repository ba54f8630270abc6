//! Command-line argument parsing for toolgate
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolgate - validate and dispatch model tool calls inside a sandboxed project root
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(version)]
#[command(about = "Validate and dispatch model tool calls inside a sandboxed project root", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.toolgate/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a path against the project boundary
    CheckPath {
        /// Path as a tool would receive it
        #[arg(value_name = "PATH")]
        path: String,

        /// Project root (current directory by default)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Print the function-calling schemas of the built-in tools
    Schema {
        /// Project root (current directory by default)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Execute a tool-call payload and print the tool messages
    Run {
        /// JSON payload file, or `-` for stdin
        #[arg(value_name = "PAYLOAD_FILE")]
        payload: String,

        /// Project root (current directory by default)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Dispatch the batch concurrently
        #[arg(long)]
        parallel: bool,

        /// Per-call timeout in milliseconds (overrides config)
        #[arg(long, value_name = "N")]
        timeout_ms: Option<u64>,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Commands {
    /// Project root for the command (current dir if not specified)
    pub fn root(&self) -> PathBuf {
        let root = match self {
            Commands::CheckPath { root, .. } | Commands::Schema { root } | Commands::Run { root, .. } => root,
        };
        root.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
        }
    }
}
