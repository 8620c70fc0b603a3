mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, sequence::SequenceSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "chainpilot",
    about = "Build, store and execute on-chain action sequences",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from chainpilot.yaml or .chainpilot/)
    #[arg(long, global = true, env = "CHAINPILOT_ROOT")]
    root: Option<PathBuf>,

    /// Config file (default: <root>/chainpilot.yaml)
    #[arg(long, global = true, env = "CHAINPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the reconcile worker
    Serve {
        /// Port to listen on (default: server.port from config; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List registered protocols and their actions
    Protocols {
        /// Print the plain-text catalogue used in system prompts
        #[arg(long)]
        describe: bool,
    },

    /// List registered tools
    Tools,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Inspect stored sequences
    Sequence {
        #[command(subcommand)]
        subcommand: SequenceSubcommand,
    },

    /// Check the in-flight transactions of one sequence against the chain
    Reconcile {
        /// Sequence id
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Serve { .. } => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let config_path = root::config_path(&root, cli.config.as_deref());

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&root, &config_path, port),
        Commands::Protocols { describe } => cmd::protocols::run(&config_path, describe, cli.json),
        Commands::Tools => cmd::tools::run(&config_path, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
        Commands::Sequence { subcommand } => {
            cmd::sequence::run(&root, &config_path, subcommand, cli.json)
        }
        Commands::Reconcile { id } => cmd::reconcile::run(&root, &config_path, &id, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
