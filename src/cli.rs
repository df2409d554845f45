// CLI module - command-line argument parsing and handlers
//
// The config subcommands run before tracing is initialized, so they talk to
// the terminal directly: results on stdout, prompts and failures on stderr.

use crate::config::{Config, VERSION};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Shepherd - service registry and metrics rollup orchestrator
#[derive(Parser)]
#[command(name = "shepherd")]
#[command(version = VERSION)]
#[command(about = "Service registry and metrics rollup orchestrator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle CLI commands. Returns true if a command was handled (exit after).
pub fn handle_cli() -> bool {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { show, reset, path }) => {
            if path {
                handle_config_path();
            } else if show {
                handle_config_show();
            } else if reset {
                handle_config_reset();
            } else {
                // No flag provided, show help
                println!("Usage: shepherd config [--show|--reset|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --reset   Reset config file to defaults");
                println!("  --path    Show config file path");
            }
            true
        }
        None => false, // No subcommand, run the orchestrator
    }
}

/// Resolve the config path or bail out; every config subcommand needs it.
fn config_path_or_exit() -> PathBuf {
    let Some(path) = Config::config_path() else {
        eprintln!("error: cannot determine the config directory (no home directory?)");
        std::process::exit(1);
    };
    path
}

fn handle_config_path() {
    println!("{}", config_path_or_exit().display());
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    println!();

    let path = config_path_or_exit();
    if path.exists() {
        println!("# Loaded from {}", path.display());
    } else {
        println!("# No config file present; showing built-in defaults");
    }
}

fn handle_config_reset() {
    let path = config_path_or_exit();

    // Never clobber an existing file without asking
    if path.exists() && !confirm(&format!("Overwrite existing config at {}?", path.display())) {
        println!("Aborted.");
        return;
    }

    if let Err(e) = write_default_config(&path) {
        eprintln!("error: failed to write {}: {e}", path.display());
        std::process::exit(1);
    }

    println!("Wrote default config to {}", path.display());
}

/// Render `Config::default()` through `to_toml()`, the same template the
/// first-run bootstrap writes.
fn write_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml())
}

/// Interactive y/N prompt on stderr. Anything but an explicit yes declines.
fn confirm(prompt: &str) -> bool {
    eprint!("{prompt} [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().eq_ignore_ascii_case("y")
}
