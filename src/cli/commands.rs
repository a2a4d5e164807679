use crate::config::BackendKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(author, version, about = "Persist chat events as conversation and message rows", long_about = None)]
pub struct Cli {
    /// Override the backend selected in the settings
    #[arg(short, long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay JSON-lines chat events into the store
    Ingest {
        /// Event file (reads stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show the active backend and what it can answer
    Info,
}
