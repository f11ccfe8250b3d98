//! Engine assembly and the handle the view layer talks to.
//!
//! [`Engine::builder`] wires the connection manager, refresh scheduler and
//! reducer together and spawns the engine task. The task owns the
//! [`DashboardState`] and applies inputs strictly one at a time; everything
//! else (channel supervisor, refresh tasks, control actions) only sends
//! [`EngineInput`] messages to it.
//!
//! ```no_run
//! use hvac_core::{Engine, EngineConfig};
//!
//! # async fn example() -> hvac_core::Result<()> {
//! let engine = Engine::builder(EngineConfig::new("http://localhost:8000"))
//!     .start()
//!     .await?;
//!
//! let mut snapshots = engine.subscribe_snapshots();
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow_and_update().clone();
//!     println!("{} zone(s), {:?}", snapshot.zones.len(), snapshot.connection);
//! }
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use hvac_types::Zone;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::api::{ApiClient, DEFAULT_API_TIMEOUT, ZoneApi};
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::events::{NotificationReceiver, NotificationSender, notification_channel};
use crate::ids::{EventIdGenerator, MonotonicIds};
use crate::messages::{EngineInput, InputReceiver, InputSender};
use crate::reconnect::{ConnectionState, ReconnectOptions};
use crate::refresh::{RefreshOptions, RefreshScheduler};
use crate::state::{DashboardSnapshot, DashboardState};
use crate::store::ArrivalClock;
use crate::transport::{PushTransport, WsTransport, channel_url};

/// Lowest setpoint accepted by the FCU controller, in °C.
pub const SETPOINT_MIN: f64 = 15.0;
/// Highest setpoint accepted by the FCU controller, in °C.
pub const SETPOINT_MAX: f64 = 28.0;
/// Setpoint granularity, in °C.
pub const SETPOINT_STEP: f64 = 0.5;

const INPUT_CAPACITY: usize = 256;
const NOTIFICATION_CAPACITY: usize = 64;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// REST base URL, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Push channel URL. Derived from `base_url` when `None`.
    pub ws_url: Option<String>,
    /// Timeout applied to every REST call.
    pub api_timeout: Duration,
    pub reconnect: ReconnectOptions,
    pub refresh: RefreshOptions,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ws_url: None,
            api_timeout: DEFAULT_API_TIMEOUT,
            reconnect: ReconnectOptions::default(),
            refresh: RefreshOptions::default(),
        }
    }

    #[must_use]
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn reconnect(mut self, options: ReconnectOptions) -> Self {
        self.reconnect = options;
        self
    }

    #[must_use]
    pub fn refresh(mut self, options: RefreshOptions) -> Self {
        self.refresh = options;
        self
    }

    /// The push channel URL in effect.
    pub fn channel_url(&self) -> Result<String> {
        match &self.ws_url {
            Some(url) => Ok(url.clone()),
            None => Ok(channel_url(&self.base_url)?),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.reconnect.validate()?;
        if self.api_timeout.is_zero() {
            return Err(Error::InvalidConfig("api timeout must be > 0".to_string()));
        }
        if self.refresh.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "refresh interval must be > 0".to_string(),
            ));
        }
        if self.refresh.history_minutes == 0 {
            return Err(Error::InvalidConfig(
                "history window must be at least 1 minute".to_string(),
            ));
        }
        self.channel_url()?;
        Ok(())
    }
}

/// Entry point for building an engine.
#[derive(Debug)]
pub struct Engine;

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            api: None,
            transport: None,
            ids: None,
        }
    }
}

/// Configures collaborators before the engine starts.
pub struct EngineBuilder {
    config: EngineConfig,
    api: Option<Arc<dyn ZoneApi>>,
    transport: Option<Arc<dyn PushTransport>>,
    ids: Option<Box<dyn EventIdGenerator>>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("custom_api", &self.api.is_some())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl EngineBuilder {
    /// Use `api` instead of an [`ApiClient`] for `base_url`.
    #[must_use]
    pub fn with_api<A: ZoneApi>(mut self, api: Arc<A>) -> Self {
        self.api = Some(api as Arc<dyn ZoneApi>);
        self
    }

    /// Use `transport` instead of the WebSocket transport.
    #[must_use]
    pub fn with_transport<T: PushTransport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport) as Arc<dyn PushTransport>);
        self
    }

    /// Use `ids` for activity entry ids instead of [`MonotonicIds`].
    #[must_use]
    pub fn with_ids<G: EventIdGenerator>(mut self, ids: G) -> Self {
        self.ids = Some(Box::new(ids) as Box<dyn EventIdGenerator>);
        self
    }

    /// Validate the configuration, spawn the engine and open the channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(self) -> Result<EngineHandle> {
        self.config.validate()?;
        let url = self.config.channel_url()?;

        let api: Arc<dyn ZoneApi> = match self.api {
            Some(api) => api,
            None => Arc::new(ApiClient::with_timeout(
                &self.config.base_url,
                self.config.api_timeout,
            )?),
        };
        let transport: Arc<dyn PushTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(WsTransport),
        };
        let ids: Box<dyn EventIdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Box::new(MonotonicIds::new()),
        };

        let cancel = CancellationToken::new();
        let (inputs, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (notifications, _) = notification_channel(NOTIFICATION_CAPACITY);

        let clock = ArrivalClock::new();
        let state = DashboardState::new(clock.clone(), ids);
        let (snapshot_tx, snapshots) = watch::channel(state.snapshot());

        let mut scheduler = RefreshScheduler::new(
            Arc::clone(&api),
            clock,
            inputs.clone(),
            self.config.refresh.clone(),
            &cancel,
        );
        scheduler.start();

        let connection = Arc::new(ConnectionManager::new(
            url,
            transport,
            self.config.reconnect.clone(),
            inputs.clone(),
            cancel.clone(),
        ));

        let task = EngineTask {
            state,
            inputs: input_rx,
            scheduler,
            snapshots: snapshot_tx,
            notifications: notifications.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        connection.connect().await;
        info!(base_url = %self.config.base_url, "Engine started");

        Ok(EngineHandle {
            api,
            connection,
            inputs,
            snapshots,
            notifications,
            cancel,
            task: Mutex::new(Some(handle)),
        })
    }
}

struct EngineTask {
    state: DashboardState,
    inputs: InputReceiver,
    scheduler: RefreshScheduler,
    snapshots: watch::Sender<DashboardSnapshot>,
    notifications: NotificationSender,
    cancel: CancellationToken,
}

impl EngineTask {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                _ = self.cancel.cancelled() => break,
                input = self.inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };
            trace!(kind = input.kind(), "Applying input");

            match &input {
                EngineInput::Connected => self.scheduler.request_zone_list(),
                EngineInput::ZonesLoaded(zones) => {
                    self.scheduler.sync_zones(zones.iter().map(|z| z.id.as_str()));
                }
                _ => {}
            }

            for notification in self.state.apply(input) {
                // No subscribers is fine
                let _ = self.notifications.send(notification);
            }
            self.snapshots.send_replace(self.state.snapshot());
        }

        // Refuse further inputs so no producer waits on a queue nobody drains
        self.inputs.close();
        self.scheduler.shutdown().await;
        debug!("Engine task exited");
    }
}

/// Handle to a running engine.
///
/// All state access goes through snapshots; the handle never exposes the
/// live stores.
pub struct EngineHandle {
    api: Arc<dyn ZoneApi>,
    connection: Arc<ConnectionManager>,
    inputs: InputSender,
    snapshots: watch::Receiver<DashboardSnapshot>,
    notifications: NotificationSender,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("connection", &self.connection)
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

impl EngineHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receive every new snapshot.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    /// Receive user-facing notifications.
    pub fn subscribe_notifications(&self) -> NotificationReceiver {
        self.notifications.subscribe()
    }

    /// Watch the push channel state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Send a JSON payload on the push channel. Dropped if not connected.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        self.connection.send(payload).await
    }

    /// Change a zone's setpoint.
    ///
    /// The value must lie within 15.0–28.0 °C on a 0.5 °C grid; anything else
    /// is rejected without contacting the server. The server's echo is fed
    /// back into the engine and returned.
    pub async fn set_setpoint(&self, zone_id: &str, value: f64) -> Result<Zone> {
        validate_setpoint(value)?;
        let zone = self.api.set_setpoint(zone_id, value).await?;
        info!(zone_id, setpoint = zone.setpoint, "Setpoint updated");
        self.publish_zone(zone).await
    }

    /// Switch a zone between adaptive and manual control.
    pub async fn set_adaptive_mode(&self, zone_id: &str, enabled: bool) -> Result<Zone> {
        let zone = self.api.set_adaptive_mode(zone_id, enabled).await?;
        info!(zone_id, adaptive_mode = zone.adaptive_mode, "Control mode updated");
        self.publish_zone(zone).await
    }

    async fn publish_zone(&self, zone: Zone) -> Result<Zone> {
        self.inputs
            .send(EngineInput::ZoneUpdated(zone.clone()))
            .await
            .map_err(|_| Error::EngineStopped)?;
        Ok(zone)
    }

    /// Stop the channel, the refresh tasks and the engine task, and wait for
    /// all of them. Further calls are no-ops.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        self.cancel.cancel();

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task panicked");
            }
            info!("Engine stopped");
        }
    }
}

/// Check a setpoint against the controller's range and step.
pub fn validate_setpoint(value: f64) -> Result<()> {
    let steps = (value - SETPOINT_MIN) / SETPOINT_STEP;
    let on_grid = (steps - steps.round()).abs() < 1e-9;

    if value.is_finite() && (SETPOINT_MIN..=SETPOINT_MAX).contains(&value) && on_grid {
        Ok(())
    } else {
        Err(Error::InvalidSetpoint {
            value,
            min: SETPOINT_MIN,
            max: SETPOINT_MAX,
            step: SETPOINT_STEP,
        })
    }
}
