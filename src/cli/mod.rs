// src/cli/mod.rs
//! CLI definitions for appwarden
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! Actions are hoisted to root level:
//! - `freeze` / `unfreeze` - Disable or re-enable packages
//! - `force-stop` - Stop running packages
//! - `restrict-background` / `allow-background` - Toggle background execution
//! - `clear-cache` / `clear-data` - Wipe package storage
//! - `uninstall` - Remove packages for the current user, keeping data
//! - `rollback` - Restore the state captured before the last reversible batch
//!
//! Management:
//! - `mode` - Select and verify the privilege transport
//! - `history` - Action log
//! - `check` - Dry-run a raw command through the policy validator
//! - `status` - Summary of mode, permission and rollback availability
//! - `helper` - Run the elevated helper service

use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

mod history;
mod mode;

pub use history::HistoryCommands;
pub use mode::{ModeArg, ModeCommands};

#[derive(Parser)]
#[command(name = "appwarden")]
#[command(author = "Appwarden Contributors")]
#[command(version)]
#[command(about = "Privileged app-state control with policy gating and rollback", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "/etc/appwarden/config.toml")]
    pub config: String,

    /// Override the database path from the configuration
    #[arg(short, long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Packages a batch action applies to
#[derive(Args)]
pub struct TargetArgs {
    /// Package names
    #[arg(required = true, num_args = 1..)]
    pub packages: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    // =========================================================================
    // Actions
    // =========================================================================
    /// Disable packages for the current user (reversible)
    Freeze(TargetArgs),

    /// Re-enable packages (reversible)
    Unfreeze(TargetArgs),

    /// Stop every process of the packages
    ForceStop(TargetArgs),

    /// Deny background execution and wake locks (reversible)
    RestrictBackground(TargetArgs),

    /// Allow background execution and wake locks (reversible)
    AllowBackground(TargetArgs),

    /// Clear cached files
    ClearCache(TargetArgs),

    /// Clear all app data
    ClearData(TargetArgs),

    /// Uninstall for the current user, keeping data
    Uninstall(TargetArgs),

    /// Restore the state captured before the last reversible action
    Rollback {
        /// Show what would be restored without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    // =========================================================================
    // Management
    // =========================================================================
    /// Show or clear the action log
    History {
        /// Show only the most recent N entries
        #[arg(short, long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        limit: Option<usize>,

        #[command(subcommand)]
        command: Option<HistoryCommands>,
    },

    /// Execution mode selection
    #[command(subcommand)]
    Mode(ModeCommands),

    /// Check a raw command against the policy without running it
    Check {
        /// Full command string, quoted
        command: String,

        /// Package the command targets
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Show mode, permission, rollback availability and history size
    Status,

    /// Run the elevated helper service (as root)
    Helper,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_history_limit_must_be_positive() {
        assert!(Cli::try_parse_from(["appwarden", "history", "--limit", "0"]).is_err());

        let cli = Cli::try_parse_from(["appwarden", "history", "-l", "3"]).unwrap();
        match cli.command {
            Some(Commands::History { limit, .. }) => assert_eq!(limit, Some(3)),
            _ => panic!("expected history"),
        }
    }

    #[test]
    fn test_mode_names() {
        let cli = Cli::try_parse_from(["appwarden", "mode", "set", "Remote"]).unwrap();
        match cli.command {
            Some(Commands::Mode(ModeCommands::Set { mode })) => assert_eq!(mode, ModeArg::Remote),
            _ => panic!("expected mode set"),
        }
        assert!(Cli::try_parse_from(["appwarden", "mode", "set", "adb"]).is_err());
    }
}
