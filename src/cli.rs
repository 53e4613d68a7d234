//! CLI definitions for FlowHands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// FlowHands CLI.
#[derive(Parser)]
#[command(name = "flowhands")]
#[command(about = "Resumable event-routed flows with human-in-the-loop suspension")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to ~/.flowhands/config.toml when present)
    #[arg(short, long, global = true, env = "FLOWHANDS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Serve the HTTP API in the foreground (default)
    Serve {
        /// Bind host, overriding the config file
        #[arg(long)]
        host: Option<String>,

        /// Bind port, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },

    /// List registered flows
    Flows,

    /// Run a flow until it completes, fails or waits for input
    Run {
        /// Flow ID
        flow_id: String,

        /// Input as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,

        /// Session for conversational memory
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Answer a suspended run
    Respond {
        /// Suspension workflow ID
        workflow_id: String,

        /// Human response text
        response: String,

        /// Operator answering the prompt
        #[arg(short, long)]
        operator: Option<String>,
    },

    /// Show a run record
    Status {
        /// Run ID
        run_id: String,

        /// Include step records
        #[arg(long)]
        steps: bool,
    },
}
