//! FlowHands - resumable event-routed flows with human-in-the-loop suspension.
//!
//! Main entry point for the FlowHands CLI and server.

mod cli;
mod commands;
mod server;

use clap::Parser;
use tracing::warn;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, warnings) = server::load_config(cli.config.as_deref())?;
    server::init_tracing(&config.logging)?;
    for warning in warnings {
        warn!("Config: {}", warning);
    }

    match cli.command {
        None => server::run_server(config, None, None).await,
        Some(Commands::Serve { host, port }) => server::run_server(config, host, port).await,
        Some(Commands::Flows) => {
            let runtime = server::build_runtime(&config).await?;
            commands::list_flows(&runtime)
        }
        Some(Commands::Run {
            flow_id,
            input,
            session,
        }) => {
            let runtime = server::build_runtime(&config).await?;
            commands::run_flow(&runtime, &flow_id, &input, session).await
        }
        Some(Commands::Respond {
            workflow_id,
            response,
            operator,
        }) => {
            let runtime = server::build_runtime(&config).await?;
            commands::respond(&runtime, &workflow_id, &response, operator.as_deref()).await
        }
        Some(Commands::Status { run_id, steps }) => {
            let runtime = server::build_runtime(&config).await?;
            commands::status(&runtime, &run_id, steps).await
        }
    }
}
