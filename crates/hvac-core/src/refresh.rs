//! Periodic REST refresh.
//!
//! The scheduler runs one task for the zone list and one task per known
//! zone. Each per-zone cycle fetches devices, history and prediction
//! concurrently and hands whatever succeeded to the engine as a single
//! [`ZoneRefresh`]. Failures are logged and absorbed; the zone keeps its last
//! state and the next cycle simply tries again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hvac_types::{Device, SensorReading, ZonePrediction};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ZoneApi;
use crate::messages::{EngineInput, InputSender};
use crate::store::ArrivalClock;

/// Default interval between refresh cycles.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default history span requested per cycle.
pub const DEFAULT_HISTORY_MINUTES: u32 = 30;

/// Failures logged at `warn` before the scheduler goes quiet.
const LOUD_FAILURES: u32 = 3;

/// Refresh timing.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOptions {
    pub interval: Duration,
    pub history_minutes: u32,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            history_minutes: DEFAULT_HISTORY_MINUTES,
        }
    }
}

/// Result of one per-zone refresh cycle.
///
/// Each part is `None` when its request failed; `failures` says why.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRefresh {
    pub zone_id: String,
    /// Arrival revision read just before the requests were issued.
    pub issued_rev: u64,
    pub devices: Option<Vec<Device>>,
    pub history: Option<Vec<SensorReading>>,
    pub prediction: Option<ZonePrediction>,
    pub failures: Vec<String>,
}

impl ZoneRefresh {
    /// True when every part failed.
    pub fn is_empty(&self) -> bool {
        self.devices.is_none() && self.history.is_none() && self.prediction.is_none()
    }
}

/// Per-zone refresh bookkeeping, shown in the dashboard snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshStats {
    /// Cycles in which every part succeeded.
    pub success_count: u64,
    /// Cycles in which at least one part failed.
    pub failure_count: u64,
    pub consecutive_failures: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_refresh_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

impl RefreshStats {
    /// Record a completed cycle.
    pub fn record(&mut self, refresh: &ZoneRefresh, now: OffsetDateTime) {
        self.last_refresh_at = Some(now);
        if refresh.failures.is_empty() {
            self.success_count += 1;
            self.consecutive_failures = 0;
        } else {
            self.record_failure(refresh.failures.join("; "));
        }
    }

    /// Record a cycle in which nothing could be fetched.
    pub fn record_failure(&mut self, error: String) {
        self.failure_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
    }
}

/// Owns the refresh tasks.
///
/// Driven by the engine: the zone list task reports zones, the engine calls
/// [`sync_zones`](Self::sync_zones) with them, and the scheduler starts or
/// stops per-zone tasks to match.
pub struct RefreshScheduler {
    api: Arc<dyn ZoneApi>,
    clock: ArrivalClock,
    inputs: InputSender,
    options: RefreshOptions,
    cancel: CancellationToken,
    zone_list_trigger: Arc<Notify>,
    zones: HashMap<String, CancellationToken>,
    tasks: JoinSet<()>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("options", &self.options)
            .field("zones", &self.zones.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RefreshScheduler {
    pub fn new(
        api: Arc<dyn ZoneApi>,
        clock: ArrivalClock,
        inputs: InputSender,
        options: RefreshOptions,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            api,
            clock,
            inputs,
            options,
            cancel: parent.child_token(),
            zone_list_trigger: Arc::new(Notify::new()),
            zones: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Start the zone list task. It fetches immediately and then on every
    /// interval or [`request_zone_list`](Self::request_zone_list).
    pub fn start(&mut self) {
        info!(interval = ?self.options.interval, "Starting refresh scheduler");
        let task = ZoneListTask {
            api: Arc::clone(&self.api),
            inputs: self.inputs.clone(),
            interval: self.options.interval,
            trigger: Arc::clone(&self.zone_list_trigger),
            cancel: self.cancel.clone(),
        };
        self.tasks.spawn(task.run());
    }

    /// Fetch the zone list as soon as possible.
    pub fn request_zone_list(&self) {
        self.zone_list_trigger.notify_one();
    }

    /// Zones that currently have a refresh task.
    pub fn zone_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.zones.keys().map(String::as_str)
    }

    /// Match the per-zone tasks to `zone_ids`: start tasks for new zones and
    /// stop tasks for zones that are gone.
    pub fn sync_zones<'a>(&mut self, zone_ids: impl IntoIterator<Item = &'a str>) {
        let wanted: Vec<&str> = zone_ids.into_iter().collect();

        self.zones.retain(|id, token| {
            let keep = wanted.contains(&id.as_str());
            if !keep {
                info!(zone_id = %id, "Stopping refresh for removed zone");
                token.cancel();
            }
            keep
        });

        for id in wanted {
            if self.zones.contains_key(id) {
                continue;
            }
            let token = self.cancel.child_token();
            let task = ZoneTask {
                api: Arc::clone(&self.api),
                clock: self.clock.clone(),
                inputs: self.inputs.clone(),
                zone_id: id.to_string(),
                options: self.options.clone(),
                cancel: token.clone(),
            };
            debug!(zone_id = %id, "Starting zone refresh");
            self.tasks.spawn(task.run());
            self.zones.insert(id.to_string(), token);
        }

        // Reap tasks of removed zones
        while self.tasks.try_join_next().is_some() {}
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.zones.clear();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Refresh task panicked");
            }
        }
        debug!("Refresh scheduler stopped");
    }
}

struct ZoneListTask {
    api: Arc<dyn ZoneApi>,
    inputs: InputSender,
    interval: Duration,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
}

impl ZoneListTask {
    async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.api.zones() => result,
            };

            match result {
                Ok(zones) => {
                    if consecutive_failures > 0 {
                        info!("Zone list available again after {} failure(s)", consecutive_failures);
                    }
                    consecutive_failures = 0;
                    debug!("Loaded {} zone(s)", zones.len());
                    let sent = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        sent = self.inputs.send(EngineInput::ZonesLoaded(zones)) => sent,
                    };
                    if sent.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    log_failure("zone list", &e.to_string(), consecutive_failures);
                }
            }
        }
    }
}

struct ZoneTask {
    api: Arc<dyn ZoneApi>,
    clock: ArrivalClock,
    inputs: InputSender,
    zone_id: String,
    options: RefreshOptions,
    cancel: CancellationToken,
}

impl ZoneTask {
    async fn run(self) {
        let mut ticker = interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let refresh = tokio::select! {
                _ = self.cancel.cancelled() => break,
                refresh = fetch_zone(
                    self.api.as_ref(),
                    &self.clock,
                    &self.zone_id,
                    self.options.history_minutes,
                ) => refresh,
            };

            if refresh.failures.is_empty() {
                if consecutive_failures > 0 {
                    info!(zone_id = %self.zone_id, "Refresh recovered after {} failure(s)", consecutive_failures);
                }
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                let what = format!("refresh of {}", self.zone_id);
                log_failure(&what, &refresh.failures.join("; "), consecutive_failures);
            }

            let input = if refresh.is_empty() {
                EngineInput::RefreshFailed {
                    zone_id: refresh.zone_id,
                    error: refresh.failures.join("; "),
                }
            } else {
                EngineInput::ZoneRefreshed(refresh)
            };

            // A full engine queue must not hold up cancellation
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => break,
                sent = self.inputs.send(input) => sent,
            };
            if sent.is_err() {
                break;
            }
        }
    }
}

/// Fetch devices, history and prediction for one zone concurrently.
///
/// The arrival revision is read before any request goes out so the engine
/// can tell which live writes the results may have missed.
pub async fn fetch_zone(
    api: &dyn ZoneApi,
    clock: &ArrivalClock,
    zone_id: &str,
    history_minutes: u32,
) -> ZoneRefresh {
    let issued_rev = clock.current();
    let (devices, history, prediction) = tokio::join!(
        api.devices(zone_id),
        api.history(zone_id, history_minutes),
        api.prediction(zone_id),
    );

    let mut failures = Vec::new();
    let devices = devices
        .map_err(|e| failures.push(format!("devices: {e}")))
        .ok();
    let history = history
        .map(|h| h.readings)
        .map_err(|e| failures.push(format!("history: {e}")))
        .ok();
    let prediction = prediction
        .map_err(|e| failures.push(format!("prediction: {e}")))
        .ok();

    ZoneRefresh {
        zone_id: zone_id.to_string(),
        issued_rev,
        devices,
        history,
        prediction,
        failures,
    }
}

fn log_failure(what: &str, error: &str, consecutive_failures: u32) {
    if consecutive_failures <= LOUD_FAILURES {
        warn!("Failed {}: {} (attempt {})", what, error, consecutive_failures);
    } else if consecutive_failures == LOUD_FAILURES + 1 {
        error!(
            "Failed {} after {} attempts, will continue trying silently",
            what, consecutive_failures
        );
    } else {
        debug!("Failed {}: {}", what, error);
    }
}
