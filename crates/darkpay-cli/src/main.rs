// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DARKPAY CLI - Reward ledger configuration & scenario runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "darkpay")]
#[command(about = "Darkpay - claimless darknode reward ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Suppress the banner
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ledger configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Run a JSON action script against an in-memory registry and store
    Simulate {
        /// Ledger config (TOML). Falls back to DARKPAY_* environment variables.
        #[arg(short, long, env = "DARKPAY_CONFIG")]
        config: Option<PathBuf>,

        /// Action script (JSON)
        #[arg(short, long)]
        script: PathBuf,

        /// Write the final ledger state here (JSON)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Abort on the first failed action instead of reporting and continuing
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a config with default fractions
    Init {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Administrator address
        #[arg(long)]
        owner: String,

        /// Community fund address
        #[arg(long)]
        community_fund: String,
    },

    /// Load and validate a config file
    Check {
        /// Config file path
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    match cli.command {
        Commands::Config { action } => commands::config::handle(action)?,
        Commands::Simulate {
            config,
            script,
            snapshot,
            strict,
        } => commands::simulate::handle(config.as_deref(), &script, snapshot.as_deref(), strict)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        "╔═══════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║      DARKPAY - claimless rewards ledger       ║"
            .cyan()
            .bold()
    );
    println!(
        "{}",
        "╚═══════════════════════════════════════════════╝".cyan()
    );
    println!();
}

fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

// ─────────────────────────────────────────────────────────────────
// UNIT TESTS
// ─────────────────────────────────────────────────────────────────
