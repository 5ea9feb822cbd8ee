// src/cli/history.rs
//! Action log commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// Delete every log entry and the retained snapshot
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}
