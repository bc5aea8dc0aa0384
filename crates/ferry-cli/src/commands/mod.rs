//! CLI commands and argument parsing.

pub mod push;

use clap::{Parser, Subcommand};

/// Ferry - replicate bundled images and charts into a registry
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Push content to a registry
    Push(push::PushArgs),
}
