//! Kustom CLI - template-free customization of Kubernetes configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

mod commands;
mod error;
mod exit_codes;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "KUSTOM_LOG";

#[derive(Parser)]
#[command(name = "kustom")]
#[command(author = "Kustom Contributors")]
#[command(version)]
#[command(about = "Template-free customization of Kubernetes configuration", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a kustomization directory and print the resulting resources
    Build {
        /// Kustomization directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Print the resources as authored, without generating or transforming
        #[arg(long)]
        raw: bool,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let env = std::env::var(LOG_ENV).unwrap_or_else(|_| default.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Build { path, raw, output } => {
            commands::build::run(&path, raw, output.as_deref())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
