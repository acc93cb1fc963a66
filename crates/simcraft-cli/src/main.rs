//! CLI for simcraft — deterministic resource-flow simulation.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "simcraft")]
#[command(about = "simcraft — deterministic resource-flow simulation")]
#[command(version = simcraft_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a model and print its state trajectory
    Run {
        /// Model file: .yaml/.yml parse as YAML, anything else as the inline DSL
        model: String,

        /// Number of steps to run
        #[arg(long, default_value = "10")]
        steps: u64,

        /// Run until this simulated time instead of a step count
        #[arg(long)]
        until: Option<f64>,

        /// Print a snapshot after every step (JSON lines)
        #[arg(long)]
        trace: bool,

        /// Print every delivered event (JSON lines)
        #[arg(long)]
        events: bool,

        /// Write the final snapshot as JSON to this path
        #[arg(long)]
        output: Option<String>,
    },

    /// Run the invariant check battery over a model:
    /// determinism, conservation, monotonicity, bounds, reset, round-trip
    Check {
        /// Model file
        model: String,

        /// Steps each check runs the model for
        #[arg(long, default_value = "25")]
        steps: u64,
    },

    /// Parse a model and print its normalized form
    Show {
        /// Model file
        model: String,

        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Serve a model over HTTP/WebSocket
    Serve {
        /// Model file
        model: String,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(long, default_value = "8700")]
        port: u16,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            model,
            steps,
            until,
            trace,
            events,
            output,
        } => commands::run::run(&model, steps, until, trace, events, output.as_deref()),
        Commands::Check { model, steps } => commands::check::run(&model, steps),
        Commands::Show { model, json } => commands::show::run(&model, json),
        Commands::Serve { model, host, port } => commands::serve::run(&model, &host, port),
    }
}
