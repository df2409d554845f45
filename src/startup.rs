// Startup module - banner and component status
//
// Prints a short banner before the orchestrator starts serving, and mirrors
// the same information into the structured log.

use crate::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Print the startup banner
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}Shepherd{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Service registry and metrics rollup orchestrator{RESET}");
    println!();

    // Config file status
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}ok{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }

    println!("  {DIM}Store:{RESET}  {}", config.db_path.display());
    println!();
    println!(
        "  {MAGENTA}>{RESET} Orchestrator listening on {BOLD}{}{RESET}",
        config.bind_addr
    );
    println!();
}

/// Mirror the startup summary into the structured log
pub fn log_startup(config: &Config) {
    tracing::info!("Shepherd v{} starting", VERSION);
    tracing::info!(
        "Checker interval={}s, aggregator flush={}s, rollup cadences={}s/{}s",
        config.checker.interval_secs,
        config.aggregator.flush_secs,
        config.rollup.cadence_120_secs,
        config.rollup.cadence_300_secs
    );
    tracing::info!("Metrics store at {}", config.db_path.display());
    tracing::info!("Listening on {}", config.bind_addr);
}
