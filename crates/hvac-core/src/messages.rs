//! Inputs to the engine task.
//!
//! Every producer (connection supervisor, refresh tasks, control actions)
//! talks to the engine exclusively through these messages. The engine
//! applies them one at a time, which is what makes the state consistent.

use std::fmt;

use hvac_types::Zone;
use tokio::sync::mpsc;

use crate::refresh::ZoneRefresh;
use crate::router::PushFrame;

/// Why the push channel went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Opening the channel failed.
    ConnectFailed(String),
    /// The server closed the channel.
    RemoteClosed,
    /// Reading from or writing to the channel failed.
    Error(String),
    /// Closed by an explicit `disconnect()`.
    Local,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            DisconnectReason::RemoteClosed => f.write_str("closed by server"),
            DisconnectReason::Error(e) => write!(f, "channel error: {e}"),
            DisconnectReason::Local => f.write_str("disconnected locally"),
        }
    }
}

/// A single state transition request.
#[derive(Debug, Clone)]
pub enum EngineInput {
    /// The push channel opened.
    Connected,
    /// The push channel closed or could not be opened.
    Disconnected { reason: DisconnectReason },
    /// A parsed, non-keepalive push frame.
    Push(PushFrame),
    /// Fresh zone list from REST.
    ZonesLoaded(Vec<Zone>),
    /// Results of one per-zone refresh cycle (at least one part succeeded).
    ZoneRefreshed(ZoneRefresh),
    /// Every part of a per-zone refresh cycle failed.
    RefreshFailed { zone_id: String, error: String },
    /// Server echo of a control action.
    ZoneUpdated(Zone),
}

impl EngineInput {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineInput::Connected => "connected",
            EngineInput::Disconnected { .. } => "disconnected",
            EngineInput::Push(_) => "push",
            EngineInput::ZonesLoaded(_) => "zones_loaded",
            EngineInput::ZoneRefreshed(_) => "zone_refreshed",
            EngineInput::RefreshFailed { .. } => "refresh_failed",
            EngineInput::ZoneUpdated(_) => "zone_updated",
        }
    }
}

/// Sender half of the engine input queue.
pub type InputSender = mpsc::Sender<EngineInput>;

/// Receiver half of the engine input queue.
pub type InputReceiver = mpsc::Receiver<EngineInput>;
