//! Agent configuration.

use anyhow::{Context, Result};
use chrono::Duration;
use coedit_core::{ClampPolicy, DocumentId, EngineConfig, UserId};
use coedit_proto::WireFormat;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Connection identifier; random when unset
    pub client_id: Option<Uuid>,

    /// Document to edit
    pub document_id: DocumentId,

    /// Identity of the local collaborator
    pub identity: IdentityConfig,

    /// Transport configuration
    pub transport: TransportConfig,

    /// OT engine configuration
    pub engine: EngineConfig,
}

/// Identity of the local collaborator.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Collaborator ID
    pub user_id: UserId,

    /// Display name
    pub username: String,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// MQTT broker URL
    pub mqtt_broker: String,

    /// Tenant identifier
    pub tenant: String,

    /// Token presented as the MQTT password
    pub auth_token: Option<String>,

    /// Frame encoding
    pub wire_format: WireFormat,

    /// MQTT keep-alive interval
    pub keep_alive: std::time::Duration,

    /// Pause before reconnecting after a transport error
    pub reconnect_delay: std::time::Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mqtt_broker: "tcp://localhost:1883".to_string(),
            tenant: "default".to_string(),
            auth_token: None,
            wire_format: WireFormat::Json,
            keep_alive: std::time::Duration::from_secs(30),
            reconnect_delay: std::time::Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COEDIT_DOCUMENT_ID`: Document to edit (required)
    /// - `COEDIT_CLIENT_ID`: Connection UUID
    /// - `COEDIT_USER_ID`: Collaborator ID
    /// - `COEDIT_USERNAME`: Display name
    /// - `COEDIT_MQTT_BROKER`: MQTT broker URL
    /// - `COEDIT_TENANT`: Tenant identifier
    /// - `COEDIT_AUTH_TOKEN`: Token attached to the connection
    /// - `COEDIT_WIRE_FORMAT`: "json" or "cbor"
    /// - `COEDIT_STRICT_APPLY`: Reject overlong removals instead of clamping
    /// - `COEDIT_PRESENCE_TTL_SECS`: Remote cursor time-to-live
    /// - `COEDIT_CURSOR_THROTTLE_MS`: Minimum spacing of cursor updates
    ///
    /// # Errors
    ///
    /// Returns error if required environment variables are missing or malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns error if required keys are missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let document_id = lookup("COEDIT_DOCUMENT_ID")
            .map(DocumentId::from)
            .context("COEDIT_DOCUMENT_ID is required")?;

        let client_id = lookup("COEDIT_CLIENT_ID")
            .map(|id| Uuid::parse_str(&id).context("Invalid COEDIT_CLIENT_ID"))
            .transpose()?;

        let user_id = lookup("COEDIT_USER_ID")
            .map_or_else(|| UserId::new(Uuid::new_v4().to_string()), UserId::new);
        let username = lookup("COEDIT_USERNAME").unwrap_or_else(|| user_id.to_string());

        let mut transport = TransportConfig::default();
        if let Some(broker) = lookup("COEDIT_MQTT_BROKER") {
            transport.mqtt_broker = broker;
        }
        if let Some(tenant) = lookup("COEDIT_TENANT") {
            transport.tenant = tenant;
        }
        transport.auth_token = lookup("COEDIT_AUTH_TOKEN");
        if let Some(format) = lookup("COEDIT_WIRE_FORMAT") {
            transport.wire_format = format.parse().context("Invalid COEDIT_WIRE_FORMAT")?;
        }

        let mut engine = EngineConfig::default();
        if let Some(strict) = lookup("COEDIT_STRICT_APPLY") {
            if parse_flag(&strict).context("Invalid COEDIT_STRICT_APPLY")? {
                engine.clamp_policy = ClampPolicy::Strict;
            }
        }
        if let Some(secs) = lookup("COEDIT_PRESENCE_TTL_SECS") {
            let secs: i64 = secs.parse().context("Invalid COEDIT_PRESENCE_TTL_SECS")?;
            engine.presence_ttl = Duration::seconds(secs);
        }
        if let Some(ms) = lookup("COEDIT_CURSOR_THROTTLE_MS") {
            let ms: i64 = ms.parse().context("Invalid COEDIT_CURSOR_THROTTLE_MS")?;
            engine.cursor_throttle = Duration::milliseconds(ms);
        }

        Ok(Self {
            client_id,
            document_id,
            identity: IdentityConfig { user_id, username },
            transport,
            engine,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}
