mod commands;
mod state;

use clap::{Parser, Subcommand};
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_TOOL_ERROR};
use helmwright_core::{DiffOptions, Engine};
use helmwright_runtime::ProcessRunner;
use helmwright_schema::EngineConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "helmwright",
    version,
    about = "Idempotent plan/apply/destroy reconciliation of helmfile release sets"
)]
struct Cli {
    /// Engine settings file. Defaults apply when it does not exist.
    #[arg(long, default_value = "helmwright.toml", global = true)]
    config: PathBuf,

    /// Resource state file.
    #[arg(long, default_value = "helmwright.state.json", global = true)]
    state: PathBuf,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the changes applying a resource file would make.
    Plan {
        /// JSON resource file.
        resource: PathBuf,
        /// Ask the tool not to contact the cluster for server-side validation.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Credentials file used for this diff only.
        #[arg(long)]
        kubeconfig: Option<String>,
    },
    /// Plan, then create or update the release set.
    Apply {
        /// JSON resource file.
        resource: PathBuf,
    },
    /// Check the stored release set against the tool.
    Refresh,
    /// Destroy every release of the stored release set.
    Destroy,
    /// Adopt an existing helmfile manifest into the state file.
    Import {
        /// Manifest to adopt.
        manifest: PathBuf,
    },
    /// Print the stored resource attributes.
    Show {
        /// Output as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("HELMWRIGHT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config = match EngineConfig::load_or_default(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: configuration error: {}: {e}", cli.config.display());
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    debug!(
        state_root = %config.state_root.display(),
        max_diff_output_len = config.max_diff_output_len,
        "loaded configuration"
    );
    let engine = Engine::new(config, Arc::new(ProcessRunner::new()));

    let result = match cli.command {
        Commands::Plan {
            resource,
            dry_run,
            kubeconfig,
        } => commands::plan::run(
            &engine,
            &cli.state,
            &resource,
            &DiffOptions {
                dry_run,
                kubeconfig,
            },
        ),
        Commands::Apply { resource } => commands::apply::run(&engine, &cli.state, &resource),
        Commands::Refresh => commands::refresh::run(&engine, &cli.state),
        Commands::Destroy => commands::destroy::run(&engine, &cli.state),
        Commands::Import { manifest } => commands::import::run(&engine, &cli.state, &manifest),
        Commands::Show { json } => commands::show::run(&cli.state, json),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("configuration error:")
                || msg.starts_with("failed to parse resource")
                || msg.starts_with("failed to read resource")
            {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("tool error:") {
                EXIT_TOOL_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
