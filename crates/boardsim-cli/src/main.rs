//! boardsim CLI - compile, run and drive FPGA board simulators.

mod backend;
mod colors;
mod decode;
mod run;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "boardsim")]
#[command(about = "Compile, run and drive FPGA board simulators")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the design and run the simulator, driven from stdin
    Run {
        /// Source files to stage into the workspace
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Simulation delay passed to the build
        #[arg(long)]
        sim_delay: Option<String>,

        /// Iterations per clock cycle passed to the build
        #[arg(long)]
        it_per_cycle: Option<String>,

        /// Execution backend (auto, native or wsl)
        #[arg(long, default_value = "auto")]
        backend: String,

        /// Config file (default: $BOARDSIM_CONFIG or the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Local address for the datagram channel
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Address of the simulator's socket
        #[arg(long)]
        peer: Option<SocketAddr>,
    },

    /// Decode a simulator payload and print the display frame
    Decode {
        /// Payload text, e.g. "3 0xC0 0"
        payload: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Config file providing the board layout
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the execution backend that would be used
    Backend {
        /// Backend to resolve (auto, native or wsl)
        #[arg(default_value = "auto")]
        backend: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format boardsim-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<boardsim_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Run {
            files,
            sim_delay,
            it_per_cycle,
            backend,
            config,
            bind,
            peer,
        } => {
            let options = run::RunOptions {
                files,
                sim_delay,
                it_per_cycle,
                backend,
                config,
                bind,
                peer,
            };
            run::execute(options).await.map_err(format_error)?;
        }

        Commands::Decode {
            payload,
            json,
            config,
        } => {
            decode::execute(&payload, json, config.as_deref()).map_err(format_error)?;
        }

        Commands::Backend { backend } => {
            backend::execute(&backend).map_err(format_error)?;
        }
    }

    Ok(())
}
