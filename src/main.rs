// src/main.rs

mod cli;
mod commands;

use anyhow::{Context, Result};
use appwarden::{ActionKind, Config, ExecutionMode};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, HistoryCommands, ModeArg, ModeCommands};
use commands::Session;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let open = || Session::open(&cli.config, cli.db_path.as_deref());

    match command {
        Commands::Freeze(args) => commands::cmd_action(&open()?, ActionKind::Freeze, &args.packages),
        Commands::Unfreeze(args) => {
            commands::cmd_action(&open()?, ActionKind::Unfreeze, &args.packages)
        }
        Commands::ForceStop(args) => {
            commands::cmd_action(&open()?, ActionKind::ForceStop, &args.packages)
        }
        Commands::RestrictBackground(args) => {
            commands::cmd_action(&open()?, ActionKind::RestrictBackground, &args.packages)
        }
        Commands::AllowBackground(args) => {
            commands::cmd_action(&open()?, ActionKind::AllowBackground, &args.packages)
        }
        Commands::ClearCache(args) => {
            commands::cmd_action(&open()?, ActionKind::ClearCache, &args.packages)
        }
        Commands::ClearData(args) => {
            commands::cmd_action(&open()?, ActionKind::ClearData, &args.packages)
        }
        Commands::Uninstall(args) => {
            commands::cmd_action(&open()?, ActionKind::Uninstall, &args.packages)
        }
        Commands::Rollback { dry_run } => commands::cmd_rollback(&open()?, dry_run),

        Commands::History { limit, command } => match command {
            Some(HistoryCommands::Clear { yes }) => commands::cmd_history_clear(&open()?, yes),
            None => commands::cmd_history(&open()?, limit),
        },
        Commands::Mode(mode_cmd) => {
            let session = open()?;
            match mode_cmd {
                ModeCommands::Show => commands::cmd_mode_show(&session),
                ModeCommands::Set { mode } => {
                    commands::cmd_mode_set(&session, execution_mode(mode))
                }
                ModeCommands::Clear => commands::cmd_mode_clear(&session),
                ModeCommands::Verify => commands::cmd_mode_verify(&session),
            }
        }
        Commands::Check { command, target } => {
            commands::cmd_check(&open()?, &command, target.as_deref())
        }
        Commands::Status => commands::cmd_status(&open()?),

        Commands::Helper => {
            let config = Config::load(&cli.config)
                .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
            appwarden::helper::run(&config).context("Helper service failed")
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "appwarden", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn execution_mode(arg: ModeArg) -> ExecutionMode {
    match arg {
        ModeArg::Root => ExecutionMode::Root,
        ModeArg::Remote => ExecutionMode::RemoteService,
        ModeArg::None => ExecutionMode::None,
    }
}
