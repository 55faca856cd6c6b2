//! MQTT transport for a document channel.

use coedit_core::{ChannelError, DocumentId, OutboundChannel, OutboundMessage, UserId};
use coedit_proto::{ClientFrame, ServerFrame, TopicScheme, WireFormat};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, Publish, QoS};
use std::time::Duration;
use url::Url;

use crate::config::AgentConfig;

/// Outbound half of the document channel.
///
/// Frames are queued on the MQTT client without blocking; the event loop
/// returned by [`MqttChannel::new`] flushes them.
pub struct MqttChannel {
    client: AsyncClient,
    client_id: uuid::Uuid,
    user_id: UserId,
    username: String,
    document_id: DocumentId,
    format: WireFormat,
    publish_topic: String,
    subscribe_topic: String,
}

impl MqttChannel {
    /// Create the channel for the configured document.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn new(
        config: &AgentConfig,
        client_id: uuid::Uuid,
    ) -> Result<(Self, EventLoop), TransportError> {
        let (host, port) = parse_mqtt_url(&config.transport.mqtt_broker)?;

        let mut mqtt_options = MqttOptions::new(format!("coedit-{client_id}"), host, port);
        mqtt_options.set_keep_alive(config.transport.keep_alive);
        if let Some(token) = &config.transport.auth_token {
            mqtt_options.set_credentials(config.identity.user_id.as_str(), token);
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        let scheme = TopicScheme::new(&config.transport.tenant);
        let doc_hash = config.document_id.topic_hash();

        Ok((
            Self {
                client,
                client_id,
                user_id: config.identity.user_id.clone(),
                username: config.identity.username.clone(),
                document_id: config.document_id.clone(),
                format: config.transport.wire_format,
                publish_topic: scheme.client(&doc_hash),
                subscribe_topic: scheme.server(&doc_hash),
            },
            eventloop,
        ))
    }

    /// Subscribe to the document's broadcast topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    pub fn subscribe(&self) -> Result<(), TransportError> {
        tracing::info!(topic = %self.subscribe_topic, "Subscribing to document topic");

        self.client
            .try_subscribe(&self.subscribe_topic, QoS::AtLeastOnce)
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    /// Decode a received publish into a frame for this peer.
    ///
    /// Returns `None` for other topics, other documents, frames addressed
    /// to other peers, and undecodable payloads.
    pub fn accept(&self, publish: &Publish) -> Option<ServerFrame> {
        if publish.topic != self.subscribe_topic {
            return None;
        }

        let frame = match ServerFrame::decode(&publish.payload, self.format) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(topic = %publish.topic, error = %err, "Failed to decode server frame");
                return None;
            }
        };

        // Topic hashes can collide.
        if frame.document_id != self.document_id {
            tracing::debug!(document_id = %frame.document_id, "Frame for another document");
            return None;
        }

        frame.is_for(self.client_id).then_some(frame)
    }

    /// Ask the client to disconnect once queued requests are flushed.
    pub fn disconnect(&self) {
        if let Err(err) = self.client.try_disconnect() {
            tracing::debug!(error = %err, "Disconnect request not queued");
        }
    }
}

impl OutboundChannel for MqttChannel {
    fn send(&mut self, message: OutboundMessage) -> Result<(), ChannelError> {
        let frame = ClientFrame::new(
            self.client_id,
            self.user_id.clone(),
            self.username.clone(),
            message,
        );
        let payload = frame
            .encode(self.format)
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        tracing::debug!(
            topic = %self.publish_topic,
            payload_len = payload.len(),
            "Publishing frame"
        );

        self.client
            .try_publish(&self.publish_topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| ChannelError::Send(e.to_string()))
    }
}

/// Drive the event loop until pending requests are flushed or `limit` passes.
pub async fn flush(eventloop: &mut EventLoop, limit: Duration) {
    let _ = tokio::time::timeout(limit, async {
        while eventloop.poll().await.is_ok() {}
    })
    .await;
}

/// Parse MQTT URL into host and port.
pub(crate) fn parse_mqtt_url(input: &str) -> Result<(String, u16), TransportError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| TransportError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        if !matches!(url.scheme(), "tcp" | "mqtt") {
            return Err(TransportError::InvalidBrokerUrl(format!(
                "{input}: unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        return Ok((host.to_string(), url.port().unwrap_or(1883)));
    }

    let (host, port) = match input.split_once(':') {
        Some((host, port)) => {
            if port.contains(':') {
                return Err(TransportError::InvalidBrokerUrl(format!(
                    "{input}: too many ':' separators"
                )));
            }
            let port = port.parse().map_err(|_| {
                TransportError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
            })?;
            (host, port)
        }
        None => (input, 1883),
    };
    if host.is_empty() {
        return Err(TransportError::InvalidBrokerUrl(format!(
            "{input}: missing host"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for transport operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
}
