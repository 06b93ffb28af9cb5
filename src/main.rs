use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitbackup::report::format_size_kb;
use gitbackup::{Backup, Config, RunReport};

#[derive(Parser)]
#[command(name = "gitbackup")]
#[command(about = "Back up every GitHub repository an account owns")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ./env.json, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Starting gitbackup v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            println!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut backup = match Backup::new(config) {
        Ok(backup) => backup,
        Err(e) => {
            error!("{}", e);
            println!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    match backup.run().await {
        Ok(report) => {
            print_report(&report);
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            println!("❌ Backup aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()?;

    Ok(())
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;

    println!("\n🎉 Backup Complete!");
    println!("   📊 Total repositories: {}", summary.total_repos);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   🔄 Updated: {}", summary.updated);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   💾 Total size: {}", format_size_kb(summary.total_size_kb));
    if let Some(name) = &summary.max_size_repo {
        println!(
            "   🏔  Largest: {} ({})",
            name,
            format_size_kb(summary.max_size_kb)
        );
    }

    if summary.has_warnings() {
        println!("\n⚠️  Warnings:");
        for (name, months) in &summary.stale_repos {
            println!("   ⏳ {}: no commits for {} months", name, months);
        }
        for (name, size_kb) in &summary.large_repos {
            println!("   📦 {}: {}", name, format_size_kb(*size_kb));
        }
    }

    if summary.has_failures() {
        println!("\n🔍 Failed Repositories:");
        for (name, reason) in &summary.failures {
            println!("   ❌ {}: {}", name, reason);
        }
    }
}
