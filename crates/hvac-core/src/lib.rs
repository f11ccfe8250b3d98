//! Real-time state reconciliation engine for an HVAC zone dashboard.
//!
//! This crate keeps a consistent, bounded and continuously updated view of
//! zone telemetry by combining three sources:
//!
//! - a persistent push channel (`/ws/sensors`) carrying readings,
//!   predictions and device events,
//! - periodic REST refreshes of zones, devices, history and predictions,
//! - a bounded activity log of human-readable events.
//!
//! It tolerates channel drops, out-of-order arrival and partial data.
//!
//! # Architecture
//!
//! | Component | Module |
//! |-----------|--------|
//! | Connection manager | [`connection`], [`reconnect`], [`transport`] |
//! | Message router | [`router`] |
//! | Zone state store | [`store`] |
//! | History window | [`history`] |
//! | Activity log | [`activity`] |
//! | Refresh scheduler | [`refresh`] |
//! | Reducer and snapshots | [`state`], [`messages`] |
//! | Engine task and handle | [`engine`] |
//!
//! Every producer sends [`EngineInput`] messages to a single engine task
//! which owns the [`DashboardState`] and applies them in arrival order.
//! Snapshots leave through a `watch` channel and notifications through a
//! `broadcast` channel. Conflicts between refreshed and live values are
//! resolved last-write-wins by arrival, using the [`ArrivalClock`].
//!
//! # Quick Start
//!
//! ```no_run
//! use hvac_core::{Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(EngineConfig::new("http://localhost:8000"))
//!         .start()
//!         .await?;
//!
//!     let mut notifications = engine.subscribe_notifications();
//!     while let Ok(n) = notifications.recv().await {
//!         println!("{}: {}", n.title, n.description);
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod api;
pub mod connection;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod ids;
pub mod messages;
pub mod mock;
pub mod reconnect;
pub mod refresh;
pub mod router;
pub mod state;
pub mod store;
pub mod transport;

// Re-export the data model
pub use hvac_types as types;

pub use activity::{ACTIVITY_CAPACITY, ActivityLog};
pub use api::{ApiClient, ApiError, ApiResult, ZoneApi};
pub use connection::ConnectionManager;
pub use engine::{
    Engine, EngineBuilder, EngineConfig, EngineHandle, SETPOINT_MAX, SETPOINT_MIN, SETPOINT_STEP,
    validate_setpoint,
};
pub use error::{Error, Result};
pub use events::{Notification, NotificationLevel, NotificationReceiver, NotificationSender};
pub use history::{HISTORY_CAPACITY, HistoryWindow, HistoryWindows};
pub use ids::{EventIdGenerator, MonotonicIds, TimeRandomIds, UuidIds};
pub use messages::{DisconnectReason, EngineInput};
pub use mock::{MockApi, MockTransport};
pub use reconnect::{ConnectionState, DEFAULT_RECONNECT_DELAY, ReconnectOptions};
pub use refresh::{
    DEFAULT_HISTORY_MINUTES, DEFAULT_REFRESH_INTERVAL, RefreshOptions, RefreshScheduler,
    RefreshStats, ZoneRefresh,
};
pub use router::{DomainEvent, PushFrame, route};
pub use state::{DashboardSnapshot, DashboardState, ZoneView};
pub use store::{ArrivalClock, ZoneEntry, ZoneStateStore};
pub use transport::{PushChannel, PushTransport, SENSOR_CHANNEL_PATH, TransportError, WsTransport};
