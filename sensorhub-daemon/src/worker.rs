// Sensorhub Daemon - Client socket workers
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Unix socket server, one task per connected client.
//!
//! The dispatcher thread never blocks on a client: events go through a
//! bounded channel with `try_send`, and a full channel drops the event for
//! that client only.

use std::path::Path;
use std::sync::Arc;

use sensorhub::{ClientId, Event, EventSink, SensorHub, SinkError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{self, Response};

/// uid used when the peer credentials cannot be read
const NOBODY: u32 = 65534;

/// Outbound channel of one connection
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &Event) -> std::result::Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::BufferFull,
            TrySendError::Closed(_) => SinkError::Disconnected {
                reason: "connection closed".to_string(),
            },
        })
    }
}

/// Bind the client socket, replacing a stale one
pub fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}

/// Accept clients until the listener fails
pub async fn serve(listener: UnixListener, hub: Arc<SensorHub>, buffer: usize) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, hub, buffer).await {
                warn!("client connection ended with error: {}", e);
            }
        });
    }
}

/// Serve one client from connect to disconnect
pub async fn handle_connection(
    stream: UnixStream,
    hub: Arc<SensorHub>,
    buffer: usize,
) -> Result<()> {
    let (pid, uid) = match stream.peer_cred() {
        Ok(cred) => (cred.pid().unwrap_or(0).max(0) as u32, cred.uid()),
        Err(e) => {
            warn!("cannot read peer credentials: {}", e);
            (0, NOBODY)
        }
    };

    let (tx, mut rx) = mpsc::channel(buffer.max(1));
    let client = hub.connect(pid, uid, Arc::new(ChannelSink::new(tx)));
    info!(client, pid, uid, "client connected");

    let result = session(stream, &hub, client, &mut rx).await;

    if let Err(e) = hub.disconnect(client) {
        warn!("disconnect of client {} failed: {}", client, e);
    }
    info!(client, "client disconnected");
    result
}

async fn session(
    stream: UnixStream,
    hub: &Arc<SensorHub>,
    client: ClientId,
    rx: &mut mpsc::Receiver<Event>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match protocol::decode(&line) {
                    Ok(request) => {
                        debug!(client, ?request, "request");
                        let hub = hub.clone();
                        tokio::task::spawn_blocking(move || protocol::handle(&hub, client, request))
                            .await
                            .unwrap_or_else(|e| Response::Error {
                                code: "internal",
                                message: e.to_string(),
                            })
                    }
                    Err(e) => Response::Error {
                        code: "malformed_request",
                        message: e.to_string(),
                    },
                };
                write_line(&mut writer, &response).await?;
            }
            Some(event) = rx.recv() => {
                write_line(&mut writer, &Response::Event { event }).await?;
            }
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let mut line = protocol::encode(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
