//! Delay-gated window suppression.
//!
//! Each monitored sensor runs its own cancellable open/close timer.
//! An elapsed open timer forces the sensor's zone members off with a
//! direct command batch, bypassing the target state entirely; an elapsed
//! close timer restores the current target to exactly the members that
//! were forced off, once no sibling sensor in the zone is still open.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use crate::domain::models::config::{GroupConfig, WindowConfig};
use crate::domain::models::event::SensorEvent;
use crate::domain::models::member::{MemberId, SensorId, ZoneId};
use crate::domain::ports::registry::MemberRegistry;

use super::dispatcher::CommandDispatcher;
use super::state_cell::StateCell;

/// Live check: does any monitored sensor currently report open?
/// This feeds every blocking-mode predicate.
pub fn any_sensor_open(config: &WindowConfig, registry: &dyn MemberRegistry) -> bool {
    config
        .sensors
        .iter()
        .any(|sensor| registry.sensor_open(sensor).unwrap_or(false))
}

/// Per-zone suppression controller.
#[derive(Clone)]
pub struct WindowSuppressor {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<GroupConfig>,
    registry: Arc<dyn MemberRegistry>,
    dispatcher: CommandDispatcher,
    cell: Arc<StateCell>,
    /// Pending timer per sensor. An event for a sensor cancels and
    /// replaces only that sensor's timer, never a sibling's.
    timers: Mutex<HashMap<SensorId, JoinHandle<()>>>,
    /// Members forced off, per zone. Restoration targets exactly this
    /// set, so members that were already off stay untouched.
    affected: Mutex<HashMap<ZoneId, BTreeSet<MemberId>>>,
}

impl WindowSuppressor {
    pub fn new(
        config: Arc<GroupConfig>,
        registry: Arc<dyn MemberRegistry>,
        dispatcher: CommandDispatcher,
        cell: Arc<StateCell>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                dispatcher,
                cell,
                timers: Mutex::new(HashMap::new()),
                affected: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether suppression currently holds the group.
    pub fn suppressed(&self) -> bool {
        any_sensor_open(&self.inner.config.window, &*self.inner.registry)
    }

    /// Handle a sensor state change: cancel the sensor's pending timer
    /// and arm the opposite one.
    pub async fn handle_sensor_event(&self, event: SensorEvent) {
        let inner = &self.inner;
        if !inner.config.window.sensors.contains(&event.sensor) {
            return;
        }
        let mut timers = inner.timers.lock().await;
        if let Some(handle) = timers.remove(&event.sensor) {
            handle.abort();
        }
        let delay = if event.open {
            inner.config.window.open_delay()
        } else {
            inner.config.window.close_delay()
        };
        debug!(
            group = %inner.config.name,
            sensor = %event.sensor,
            open = event.open,
            delay_ms = delay.as_millis() as u64,
            "window timer armed"
        );
        let task_inner = Arc::clone(inner);
        let sensor = event.sensor.clone();
        let open = event.open;
        timers.insert(
            event.sensor,
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if open {
                    task_inner.force_off(&sensor).await;
                } else {
                    task_inner.restore(&sensor).await;
                }
            }),
        );
    }

    /// Cancel every pending timer and wait for settlement.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> =
            self.inner.timers.lock().await.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
        self.inner.dispatcher.shutdown().await;
    }
}

impl Inner {
    async fn force_off(&self, sensor: &SensorId) {
        // The timer raced a close event; nothing to do.
        if !self.registry.sensor_open(sensor).unwrap_or(false) {
            debug!(group = %self.config.name, sensor = %sensor, "sensor closed again, no action");
            return;
        }
        let Some(zone) = self.registry.zone_of(sensor.as_str()) else {
            warn!(group = %self.config.name, sensor = %sensor, "no zone for sensor");
            return;
        };
        let members: Vec<MemberId> = self
            .registry
            .members_in_zone(&zone)
            .into_iter()
            .filter(|member| self.config.members.contains(member))
            .filter(|member| {
                self.registry
                    .snapshot(member)
                    .is_some_and(|s| s.available && !s.is_off())
            })
            .collect();
        if members.is_empty() {
            debug!(group = %self.config.name, zone = %zone, "no active members to force off");
            return;
        }
        {
            let mut affected = self.affected.lock().await;
            affected.entry(zone.clone()).or_default().extend(members.iter().cloned());
        }
        info!(
            group = %self.config.name,
            sensor = %sensor,
            zone = %zone,
            members = ?members,
            "window open, forcing zone members off"
        );
        let payload = AttrMap::from([(Attribute::HvacMode, AttrValue::Mode(HvacMode::Off))]);
        self.dispatcher.dispatch_scoped(members, payload).await;
    }

    async fn restore(&self, sensor: &SensorId) {
        let Some(zone) = self.registry.zone_of(sensor.as_str()) else {
            return;
        };
        // One still-open window holds the whole zone suppressed.
        let sibling_open = self.config.window.sensors.iter().any(|other| {
            other != sensor
                && self.registry.zone_of(other.as_str()).as_ref() == Some(&zone)
                && self.registry.sensor_open(other).unwrap_or(false)
        });
        if sibling_open {
            debug!(
                group = %self.config.name,
                zone = %zone,
                "sibling sensor still open, holding suppression"
            );
            return;
        }
        let members: Vec<MemberId> = {
            let mut affected = self.affected.lock().await;
            affected.remove(&zone).map(|set| set.into_iter().collect()).unwrap_or_default()
        };
        if members.is_empty() {
            debug!(group = %self.config.name, zone = %zone, "nothing to restore");
            return;
        }
        let payload = self.cell.get().await.to_map();
        if payload.is_empty() {
            debug!(group = %self.config.name, zone = %zone, "no target to restore");
            return;
        }
        info!(
            group = %self.config.name,
            zone = %zone,
            members = ?members,
            "zone closed, restoring target"
        );
        self.dispatcher.dispatch_scoped(members, payload).await;
    }
}
