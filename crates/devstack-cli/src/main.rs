mod cmd;
mod output;
mod root;
mod signal;

use clap::{Parser, Subcommand};
use cmd::env::EnvSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "devstack",
    about = "Bring up a local development stack in order and keep its .env in sync",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from devstack.yaml or .git/)
    #[arg(long, global = true, env = "DEVSTACK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write devstack.yaml and seed .env with defaults
    Init {
        /// Overwrite an existing devstack.yaml
        #[arg(long)]
        force: bool,
    },

    /// Start every service that is not already answering, in order
    Up {
        /// Only bring up these services (and what they depend on)
        #[arg(long, value_name = "SERVICE")]
        only: Vec<String>,

        /// Do not open dashboards in the browser
        #[arg(long)]
        no_open: bool,
    },

    /// Probe each service once without starting anything
    Status,

    /// Check that the programs the services need are installed
    Check,

    /// Show the end of a service's log file
    Logs {
        /// Service name from devstack.yaml
        service: String,

        /// Number of lines to show
        #[arg(long, short = 'n', default_value_t = 40)]
        lines: usize,
    },

    /// Read and edit the env file
    Env {
        #[command(subcommand)]
        subcommand: EnvSubcommand,
    },

    /// Show the public tunnel URL and the webhook URL built from it
    Url {
        /// Write the URL into the env file
        #[arg(long)]
        save: bool,
    },

    /// Validate devstack.yaml
    Validate,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Up { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { force } => cmd::init::run(&root, force, cli.json),
        Commands::Up { only, no_open } => cmd::up::run(&root, &only, no_open, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Check => cmd::check::run(&root, cli.json),
        Commands::Logs { service, lines } => cmd::logs::run(&root, &service, lines, cli.json),
        Commands::Env { subcommand } => cmd::env::run(&root, subcommand, cli.json),
        Commands::Url { save } => cmd::url::run(&root, save, cli.json),
        Commands::Validate => cmd::validate::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
