//! sendcheck CLI - Fixture tooling for integration assertions

mod lint;
mod scaffold;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sendcheck_core::{Action, Config};

#[derive(Parser)]
#[command(name = "sendcheck")]
#[command(about = "Fixture tooling for analytics integration assertions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: .sendcheck.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate fixture files
    Check {
        /// Fixture directory (default: fixtures_dir from config)
        dir: Option<PathBuf>,
    },

    /// Scaffold a fixture file
    New {
        /// Fixture name, written as <NAME>.json
        name: String,

        /// Message type of the fixture input
        #[arg(short, long, default_value = "track")]
        action: Action,

        /// Target directory (default: fixtures_dir from config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Export JSON Schema for fixture files
    Schema,

    /// Initialize config file
    Init,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Ok(match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    })
}

/// `--verbose` wins, then `RUST_LOG`, then the config's `log` field.
fn init_tracing(verbose: bool, configured: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(configured.unwrap_or("warn")))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<u8> {
    let config = load_config(cli.config.as_deref());
    init_tracing(
        cli.verbose,
        config.as_ref().ok().and_then(|config| config.log.as_deref()),
    );

    match cli.command {
        Commands::Check { dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => config?.fixtures_dir,
            };
            let reports = lint::check_dir(&dir)?;
            let failed = reports.iter().filter(|report| !report.is_ok()).count();

            match cli.output {
                OutputFormat::Terminal => {
                    for report in &reports {
                        let icon = if report.is_ok() { "OK  " } else { "FAIL" };
                        println!("{icon} {}", report.path.display());
                        for problem in &report.problems {
                            println!("       {problem}");
                        }
                    }
                    println!(
                        "\n{} fixtures, {} invalid ({})",
                        reports.len(),
                        failed,
                        dir.display()
                    );
                }
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "dir": dir,
                        "total": reports.len(),
                        "invalid": failed,
                        "files": reports,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(u8::from(failed > 0))
        }

        Commands::New { name, action, dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => config?.fixtures_dir,
            };
            let path = scaffold::write_fixture(&dir, &name, action)?;
            println!("Created {}", path.display());
            println!("\nFill in \"output\" with what the {action} mapper should return.");
            Ok(0)
        }

        Commands::Schema => {
            let schema = sendcheck_core::fixture::generate_schema();
            println!("{schema}");
            Ok(0)
        }

        Commands::Init => {
            let config_path = ".sendcheck.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - fixtures_dir: where <name>.json fixtures live");
            println!("  - settings: merged into every assertion");
            println!("  - log: default tracing filter");
            Ok(0)
        }
    }
}
