//! # Schema Tag Provider Agent
//!
//! Keeps Ignition UDT definitions in step with JSON Schema documents.
//!
//! ## Architecture
//!
//! The agent multiplexes three sources on one task:
//! 1. **Listener**: schema documents published over MQTT (empty payload deletes)
//! 2. **Scanner**: periodic reload of the on-disk schema cache
//! 3. **Signals**: Ctrl+C triggers an orderly shutdown
//!
//! Every accepted schema is cached to disk, rendered into UDT JSON and
//! imported into the configured tag provider. A `SQLite` ledger remembers
//! what was imported so schemas deleted while the agent was down are
//! cleaned up on the next start.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod ledger;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting schema tag provider agent"
    );

    let config = AgentConfig::from_env()?;
    let agent = Agent::from_config(config)?;

    agent.run().await?;

    Ok(())
}
