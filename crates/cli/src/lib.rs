pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stockpulse_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "stockpulse",
    about = "Stockpulse suggestion engine operator CLI",
    long_about = "Generate, inspect and sweep inventory suggestions, and run the periodic scheduler.",
    after_help = "Examples:\n  stockpulse migrate\n  stockpulse generate --user u-42\n  stockpulse list --user u-42 --status pending\n  stockpulse run --interval-secs 900"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a stockpulse.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Run every detector for one user, or for every known user")]
    Generate {
        #[arg(long, conflicts_with = "all")]
        user: Option<String>,
        #[arg(long)]
        all: bool,
    },
    #[command(about = "List a user's suggestions, most severe first")]
    List {
        #[arg(long)]
        user: String,
        #[arg(long, help = "pending|viewed|dismissed|acted|expired")]
        status: Option<String>,
        #[arg(long, help = "stock|sales|finance|operations")]
        domain: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    #[command(about = "Mark one suggestion viewed, dismissed or acted on")]
    Respond {
        #[arg(long)]
        id: String,
        #[arg(long, help = "view|dismiss|act")]
        action: String,
        #[arg(long, help = "JSON payload stored with an `act` response")]
        payload: Option<String>,
    },
    #[command(about = "Expire every active suggestion past its deadline")]
    Cleanup,
    #[command(about = "Check the popup gate for a user and optionally stamp it")]
    Popup {
        #[arg(long)]
        user: String,
        #[arg(long)]
        mark_shown: bool,
        #[arg(long, help = "Replace the user's popup frequency (minutes)")]
        frequency_minutes: Option<u32>,
    },
    #[command(about = "Sweep and regenerate on a fixed interval until interrupted")]
    Run {
        #[arg(long, default_value_t = 900)]
        interval_secs: u64,
        #[arg(long, help = "Stop after this many ticks")]
        max_ticks: Option<u64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config.clone(),
        ..LoadOptions::default()
    };

    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init(&config.logging);
    }

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Migrate => commands::migrate::run(options),
        Command::Generate { user, all } => commands::generate::run(options, user, all),
        Command::List { user, status, domain, limit } => {
            commands::list::run(options, &user, status.as_deref(), domain.as_deref(), limit)
        }
        Command::Respond { id, action, payload } => {
            commands::respond::run(options, &id, &action, payload.as_deref())
        }
        Command::Cleanup => commands::cleanup::run(options),
        Command::Popup { user, mark_shown, frequency_minutes } => {
            commands::popup::run(options, &user, mark_shown, frequency_minutes)
        }
        Command::Run { interval_secs, max_ticks } => {
            commands::schedule::run(options, interval_secs, max_ticks)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
