// src/cli/mode.rs
//! Execution mode commands

use clap::{Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum ModeCommands {
    /// Show the persisted mode and which transports hold permission
    Show,

    /// Persist a mode choice
    Set {
        #[arg(value_enum, ignore_case = true)]
        mode: ModeArg,
    },

    /// Forget the persisted mode; the next command checks again
    Clear,

    /// Actively verify the active mode, prompting for consent if needed
    Verify,
}

/// Mode names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Long-lived elevated shell
    Root,
    /// Helper service over its socket
    Remote,
    /// View-only, nothing mutating runs
    None,
}
