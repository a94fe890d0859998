//! CLI module - Command-line interface for Reelarr
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Reelarr - Movie and TV acquisition pipeline
/// Requests in, linked library files out
#[derive(Parser)]
#[command(name = "reelarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as background daemon with scheduler
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Run every pipeline job once
    #[command(alias = "-c", alias = "--check")]
    Check,

    /// Request a movie or show
    #[command(alias = "a")]
    Add {
        /// Title to request
        #[arg(required = true)]
        title: Vec<String>,
        /// Release year
        #[arg(long)]
        year: Option<i32>,
        /// Track as a show instead of a movie
        #[arg(long)]
        show: bool,
        /// IMDb id, e.g. tt0133093
        #[arg(long)]
        imdb: Option<String>,
    },

    /// List tracked items
    #[command(alias = "ls", alias = "l")]
    List,

    /// Retry a failed item, or every failed item when no id is given
    Retry {
        /// Item ID
        id: Option<i32>,
        /// Only redo the mount search and link
        #[arg(long)]
        symlink: bool,
    },

    /// Remove an item and its links
    #[command(alias = "rm", alias = "r")]
    Remove {
        /// Item ID to remove
        id: i32,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Link episodes whose files already appeared on the mount
    Sweep,

    /// Import the watchlist
    Sync,

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
