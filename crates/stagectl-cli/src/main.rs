//! `stagectl` – interactive shell for Thorlabs motorized stages
//!
//! 1. Loads `~/.stagectl/config.toml`; runs a short first-run setup when the
//!    file is absent.
//! 2. Validates the Kinesis installation (or selects the simulator) and brings
//!    up every configured axis.
//! 3. Drops the user into an **interactive REPL** with slash-commands.
//! 4. Intercepts **Ctrl-C** to stop every axis immediately and exit.

mod bootstrap;
mod config;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

use stagectl_hal::AxisRegistry;
use stagectl_types::StageError;

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); STAGECTL_LOG_FORMAT=json
    // emits newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("STAGECTL_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_setup(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Vendor runtime ────────────────────────────────────────────────────
    let runtime = match bootstrap::runtime_for(&cfg) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "vendor runtime unavailable");
            println!("{}: {}", "Runtime error".red(), e);
            if matches!(e, StageError::RuntimeLocation(_)) {
                println!("  {}", bootstrap::SIMULATE_HINT.dimmed());
            }
            return ExitCode::FAILURE;
        }
    };
    if cfg.simulate {
        println!("  {}", "Simulated controllers (no hardware).".yellow());
    }

    // ── Axes ──────────────────────────────────────────────────────────────
    let (registry, statuses) = match bootstrap::build_registry(&cfg, &runtime) {
        Ok(built) => built,
        Err(e) => {
            println!("{}: {}", "Axis configuration error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if statuses.is_empty() {
        println!(
            "  {} Add [[axes]] entries to {}.",
            "No axes configured.".yellow(),
            config::config_path().display()
        );
    }
    bootstrap::print_statuses(&statuses);

    let registry = Arc::new(Mutex::new(registry));
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let registry_ctrlc = registry.clone();
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping every axis …".yellow().bold());
        let mut axes = registry_ctrlc.lock().unwrap_or_else(PoisonError::into_inner);
        match axes.emergency_stop() {
            Ok(()) => println!("{}", "  ✓ All axes stopped.".green()),
            Err(e) => println!("{}: {}", "  ✗ Emergency stop incomplete".red(), e),
        }
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(registry.clone(), shutdown);

    release(&registry);
    ExitCode::SUCCESS
}

fn release(registry: &Mutex<AxisRegistry>) {
    let mut axes = registry.lock().unwrap_or_else(PoisonError::into_inner);
    axes.shutdown();
    println!("{}", "  ✓ Axes released.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// First-run setup
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_setup() -> config::Config {
    println!();
    println!("{}", "  No configuration found.  Let's set up stagectl.\n".bold());

    let mut cfg = config::Config::default();

    let answer = prompt_line("  Run against simulated controllers? [y/N]: ", "n");
    cfg.simulate = matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes");

    if !cfg.simulate {
        cfg.kinesis_path = prompt_line(
            &format!("  Kinesis installation [{}]: ", cfg.kinesis_path),
            &cfg.kinesis_path,
        );
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "stagectl".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Thorlabs motorized stage control");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
