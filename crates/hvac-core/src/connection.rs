//! Push channel lifecycle.
//!
//! The [`ConnectionManager`] keeps at most one channel open. A supervisor
//! task opens the channel, forwards parsed frames to the engine, and on any
//! close or error waits the reconnect delay and opens a new one. A failed
//! open is handled exactly like a close. Only [`ConnectionManager::disconnect`]
//! (or cancellation of the parent token) stops the cycle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::messages::{DisconnectReason, EngineInput, InputSender};
use crate::reconnect::{ConnectionState, ReconnectOptions};
use crate::router::PushFrame;
use crate::transport::{PushChannel, PushTransport};

const OUTBOUND_CAPACITY: usize = 32;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    outbound: mpsc::Sender<String>,
}

/// Owns the push channel and its reconnect cycle.
pub struct ConnectionManager {
    url: String,
    transport: Arc<dyn PushTransport>,
    options: ReconnectOptions,
    inputs: InputSender,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    parent: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager for the channel at `url`.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called. The
    /// supervisor stops when `parent` is cancelled.
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn PushTransport>,
        options: ReconnectOptions,
        inputs: InputSender,
        parent: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            transport,
            options,
            inputs,
            state_tx: Arc::new(state_tx),
            parent,
            running: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Start the supervisor. Does nothing if one is already running.
    pub async fn connect(&self) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Push channel supervisor already running");
            return;
        }

        let cancel = self.parent.child_token();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let supervisor = Supervisor {
            url: self.url.clone(),
            transport: Arc::clone(&self.transport),
            options: self.options.clone(),
            inputs: self.inputs.clone(),
            state_tx: Arc::clone(&self.state_tx),
            cancel: cancel.clone(),
            outbound: outbound_rx,
        };

        info!(url = %self.url, "Starting push channel");
        let handle = tokio::spawn(supervisor.run());
        *running = Some(Running {
            cancel,
            handle,
            outbound,
        });
    }

    /// Stop the supervisor and close the channel.
    ///
    /// Cancels a pending reconnect delay as well. Never schedules a new
    /// attempt. Safe to call in any state.
    pub async fn disconnect(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "Push channel supervisor panicked");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Push channel stopped");
    }

    /// Serialize `payload` to JSON and send it on the open channel.
    ///
    /// Dropped silently when no channel is open; nothing is queued for a
    /// later connection. Returns whether the frame was handed to the channel.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        if !self.state().is_connected() {
            debug!("No open push channel, dropping outbound frame");
            return false;
        }

        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound frame");
                return false;
            }
        };

        let running = self.running.lock().await;
        match running.as_ref() {
            Some(r) => r.outbound.try_send(text).is_ok(),
            None => false,
        }
    }
}

struct Supervisor {
    url: String,
    transport: Arc<dyn PushTransport>,
    options: ReconnectOptions,
    inputs: InputSender,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    outbound: mpsc::Receiver<String>,
}

enum SessionEnd {
    Closed(DisconnectReason),
    Cancelled,
    EngineGone,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            self.state_tx.send_replace(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.transport.open(&self.url) => result,
            };

            let reason = match opened {
                Ok(mut channel) => {
                    attempt = 0;
                    self.state_tx.send_replace(ConnectionState::Connected);
                    info!(url = %self.url, "Push channel connected");
                    if self.inputs.send(EngineInput::Connected).await.is_err() {
                        channel.close().await;
                        break;
                    }

                    let end = self.pump(channel.as_mut()).await;
                    channel.close().await;
                    match end {
                        SessionEnd::Closed(reason) => reason,
                        SessionEnd::Cancelled => {
                            self.state_tx.send_replace(ConnectionState::Disconnected);
                            let _ = self.inputs.try_send(EngineInput::Disconnected {
                                reason: DisconnectReason::Local,
                            });
                            return;
                        }
                        SessionEnd::EngineGone => break,
                    }
                }
                Err(e) => DisconnectReason::ConnectFailed(e.to_string()),
            };

            self.state_tx.send_replace(ConnectionState::Disconnected);
            let delay = self.options.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            info!(%reason, ?delay, "Push channel disconnected, reconnecting");

            if self
                .inputs
                .send(EngineInput::Disconnected { reason })
                .await
                .is_err()
            {
                break;
            }

            // Frames written while disconnected are not carried over
            while self.outbound.try_recv().is_ok() {}

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        debug!("Push channel supervisor exited");
    }

    async fn pump(&mut self, channel: &mut dyn PushChannel) -> SessionEnd {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                frame = channel.recv() => match frame {
                    None => return SessionEnd::Closed(DisconnectReason::RemoteClosed),
                    Some(Err(e)) => return SessionEnd::Closed(DisconnectReason::Error(e.to_string())),
                    Some(Ok(text)) => {
                        let Some(frame) = PushFrame::parse(&text) else {
                            continue;
                        };
                        if frame.is_keepalive() {
                            trace!("keepalive");
                            continue;
                        }
                        let sent = tokio::select! {
                            _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                            sent = self.inputs.send(EngineInput::Push(frame)) => sent,
                        };
                        if sent.is_err() {
                            return SessionEnd::EngineGone;
                        }
                    }
                },
                Some(text) = self.outbound.recv() => {
                    if let Err(e) = channel.send(text).await {
                        return SessionEnd::Closed(DisconnectReason::Error(e.to_string()));
                    }
                }
            }
        }
    }
}
