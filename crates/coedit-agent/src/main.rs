//! # coedit agent
//!
//! Headless collaborative editing peer.
//!
//! Connects to the MQTT broker, joins one document, and edits it from
//! standard input while remote changes are printed as they arrive.
//!
//! ## Input
//!
//! - plain line: append it to the document
//! - `:set TEXT`, `:insert POS TEXT`, `:delete POS LEN`: edit
//! - `:cursor POS [START END]`: share the cursor
//! - `:show`, `:save`, `:leave`

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod editor;
mod runtime;
mod transport;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries document content.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting coedit agent");

    let config = AgentConfig::from_env()?;
    let client_id = config.client_id.unwrap_or_else(Uuid::new_v4);

    tracing::info!(
        %client_id,
        user_id = %config.identity.user_id,
        "Agent initialized"
    );

    Agent::new(config, client_id).run().await
}
