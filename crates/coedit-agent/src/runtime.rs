//! Agent runtime orchestration.

use crate::config::AgentConfig;
use crate::editor::{Command, ConsoleEditor};
use crate::transport::{self, MqttChannel};
use anyhow::{Context, Result};
use chrono::Utc;
use coedit_core::{ConnectionState, Session, SessionEvent};
use rumqttc::{Event, Packet};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    client_id: Uuid,
}

/// What the loop should do after handling an input line.
enum Flow {
    Continue,
    Stop,
}

impl Agent {
    /// Create a new agent.
    pub fn new(config: AgentConfig, client_id: Uuid) -> Self {
        Self { config, client_id }
    }

    /// Run the agent's main loop until stdin closes, `:leave`, or Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot be created.
    #[allow(clippy::too_many_lines)]
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            document_id = %self.config.document_id,
            client_id = %self.client_id,
            "Starting agent runtime"
        );

        let (channel, mut eventloop) = MqttChannel::new(&self.config, self.client_id)
            .context("Failed to create MQTT transport")?;
        let mut session = Session::new(
            self.config.document_id.clone(),
            self.config.identity.user_id.clone(),
            "",
            channel,
            &self.config.engine,
        );
        let mut editor = ConsoleEditor::default();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        session.connect()?;
        let mut broker_connected = false;
        tracing::info!("Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("Connected to broker");
                        broker_connected = true;
                        on_connack(&mut session);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(frame) = session.channel().accept(&publish) {
                            session.handle(frame.message, &mut editor, Utc::now());
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        broker_connected = false;
                        session.on_disconnected();
                    }
                    Ok(_) => {}
                    Err(err) => {
                        broker_connected = false;
                        session.on_transport_error(err.to_string());
                        tracing::info!(
                            delay_secs = self.config.transport.reconnect_delay.as_secs(),
                            "Reconnecting after transport error"
                        );
                        tokio::time::sleep(self.config.transport.reconnect_delay).await;
                    }
                },
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Flow::Stop = on_line(&mut session, &mut editor, &line) {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Input closed");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to read input");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down agent");
                    break;
                }
            }

            if matches!(
                session.state(),
                ConnectionState::Disconnected | ConnectionState::Error
            ) {
                session.connect()?;
                // A failed send leaves the broker link up; no ConnAck follows.
                if broker_connected {
                    on_connack(&mut session);
                }
            }

            // Queued remote operations apply after the turn that queued them,
            // yielding to the runtime between each.
            while session.drain_next(&mut editor) {
                tokio::task::yield_now().await;
            }

            for event in session.poll_events() {
                report(&event, &mut editor);
            }
        }

        if session.state() == ConnectionState::Joined {
            if let Err(err) = session.leave_document() {
                tracing::warn!(error = %err, "Failed to send leave");
            }
        }
        session.channel().disconnect();
        transport::flush(&mut eventloop, Duration::from_secs(1)).await;

        Ok(())
    }
}

fn on_connack(session: &mut Session<MqttChannel>) {
    if let Err(err) = join(session) {
        // Failed sends already moved the session to `Error`.
        if session.state() != ConnectionState::Error {
            session.on_transport_error(err.to_string());
        }
    }
}

fn join(session: &mut Session<MqttChannel>) -> Result<()> {
    if session.state() != ConnectionState::Connecting {
        session.on_disconnected();
        session.connect()?;
    }
    session.on_connected()?;
    session.channel().subscribe()?;
    session.join_document()?;
    Ok(())
}

fn on_line(
    session: &mut Session<MqttChannel>,
    editor: &mut ConsoleEditor,
    line: &str,
) -> Flow {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(usage) => {
            eprintln!("{usage}");
            return Flow::Continue;
        }
    };

    let result = match &command {
        Command::Leave => return Flow::Stop,
        Command::Show => {
            println!("{}", editor.content());
            for cursor in session.cursors(Utc::now()) {
                println!(
                    "@{} ({}) at {} [{}..{}]",
                    cursor.username,
                    cursor.user_id,
                    cursor.position,
                    cursor.selection_start,
                    cursor.selection_end
                );
            }
            Ok(())
        }
        Command::Save => session.save(),
        Command::Cursor(cursor) => session.update_cursor(*cursor, Utc::now()).map(|sent| {
            if !sent {
                tracing::debug!("Cursor update throttled");
            }
        }),
        edit => match editor.edited(edit) {
            Some(next) => {
                let sent = session.local_edit(&next).map(|op| {
                    if let Some(op) = op {
                        tracing::debug!(%op, "Sent local edit");
                    }
                });
                editor.load(session.content());
                sent
            }
            None => {
                eprintln!("edit out of range");
                Ok(())
            }
        },
    };

    // Channel failures have already moved the session to `Error`.
    if let Err(err) = result {
        eprintln!("{err}");
    }
    Flow::Continue
}

fn report(event: &SessionEvent, editor: &mut ConsoleEditor) {
    match event {
        SessionEvent::StateChanged { from, to } => {
            tracing::info!(%from, %to, "Session state changed");
        }
        SessionEvent::ContentReplaced {
            content,
            discarded_len,
        } => {
            editor.load(content);
            if *discarded_len > 0 {
                eprintln!("local content ({discarded_len} chars) replaced by the shared document");
            }
            println!("{content}");
        }
        SessionEvent::RemoteApplied { .. } => {}
        SessionEvent::OperationDropped { operation } => {
            tracing::info!(op = %operation, "Remote operation dropped");
        }
        SessionEvent::OperationRejected { operation, error } => {
            tracing::warn!(op = %operation, %error, "Remote operation rejected");
        }
        SessionEvent::UserJoined { user_id, username } => {
            eprintln!("+ {username} ({user_id}) joined");
        }
        SessionEvent::UserLeft { user_id } => eprintln!("- {user_id} left"),
        SessionEvent::DocumentSaved { saved_at } => match saved_at {
            Some(at) => eprintln!("saved at {at}"),
            None => eprintln!("saved"),
        },
        SessionEvent::Error { message } => eprintln!("error: {message}"),
    }
}
