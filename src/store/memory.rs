use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::sync::RwLock;

use super::{PowerStore, SampleWindow};
use crate::db::models::{
    Alert, AlertWithDevice, ControlAction, ControlRecord, DashboardStats, Device, DeviceStatus,
    DeviceType, DeviceWithReading, LatestReading, NewAlert, NewSample, Sample, ToggleOutcome,
};

/// `PowerStore` kept entirely in memory. Shares state across clones.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    devices: Vec<Device>,
    samples: Vec<Sample>,
    alerts: Vec<Alert>,
    history: Vec<ControlRecord>,
}

/// A device row for seeding tests.
pub fn device(id: i32, status: DeviceStatus, power_rating: f64) -> Device {
    let now = Utc::now();
    Device {
        id,
        name: format!("device-{id}"),
        device_type: DeviceType::Socket,
        location: Some("lab".to_owned()),
        power_rating,
        status,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// A sample with sensible defaults for fields a test does not care about.
pub fn new_sample(device_id: i32, recorded_at: DateTime<Utc>, voltage: f64, energy: f64) -> NewSample {
    NewSample {
        device_id,
        recorded_at: Some(recorded_at),
        voltage,
        current: 1.0,
        power: 220.0,
        energy,
        power_factor: 0.95,
        frequency: 50.0,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(State {
                devices,
                ..State::default()
            })),
        }
    }

    pub async fn device(&self, device_id: i32) -> Option<Device> {
        self.inner
            .read()
            .await
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.clone()
    }
}

fn latest_for(samples: &[Sample], device_id: i32) -> Option<&Sample> {
    samples
        .iter()
        .filter(|s| s.device_id == device_id)
        .max_by_key(|s| (s.recorded_at, s.id))
}

#[async_trait]
impl PowerStore for MemoryStore {
    async fn dashboard_stats(&self, day_start: DateTime<Utc>) -> Result<DashboardStats> {
        let state = self.inner.read().await;
        let active = state.devices.iter().filter(|d| d.is_active);
        let on: Vec<_> = active
            .clone()
            .filter(|d| d.status == DeviceStatus::On)
            .collect();

        Ok(DashboardStats {
            total_devices: active.count() as i64,
            devices_on: on.len() as i64,
            current_power: on.iter().map(|d| d.power_rating).sum(),
            today_energy: state
                .samples
                .iter()
                .filter(|s| s.recorded_at >= day_start)
                .map(|s| s.energy)
                .sum(),
            unread_alerts: state.alerts.iter().filter(|a| !a.is_read).count() as i64,
        })
    }

    async fn list_devices(&self) -> Result<Vec<DeviceWithReading>> {
        let state = self.inner.read().await;
        let mut devices: Vec<_> = state.devices.iter().filter(|d| d.is_active).collect();
        devices.sort_by_key(|d| d.id);

        Ok(devices
            .into_iter()
            .map(|d| {
                let latest = latest_for(&state.samples, d.id);
                DeviceWithReading {
                    device: d.clone(),
                    current_power: latest.map_or(0.0, |s| s.power),
                    current_voltage: latest.map_or(0.0, |s| s.voltage),
                    current_current: latest.map_or(0.0, |s| s.current),
                    last_recorded_at: latest.map(|s| s.recorded_at),
                }
            })
            .collect())
    }

    async fn active_device(&self, device_id: i32) -> Result<Option<Device>> {
        Ok(self
            .inner
            .read()
            .await
            .devices
            .iter()
            .find(|d| d.id == device_id && d.is_active)
            .cloned())
    }

    async fn toggle_device(
        &self,
        device_id: i32,
        user_id: Option<i32>,
    ) -> Result<Option<ToggleOutcome>> {
        let mut state = self.inner.write().await;
        let Some(device) = state
            .devices
            .iter_mut()
            .find(|d| d.id == device_id && d.is_active)
        else {
            return Ok(None);
        };

        let previous_status = device.status;
        device.status = previous_status.toggled();
        device.updated_at = Utc::now();
        let outcome = ToggleOutcome {
            device_id,
            previous_status,
            new_status: device.status,
            updated_at: device.updated_at,
        };

        let id = state.history.len() as i64 + 1;
        state.history.push(ControlRecord {
            id,
            device_id,
            user_id,
            action: ControlAction::from(outcome.new_status),
            previous_status,
            new_status: outcome.new_status,
            created_at: outcome.updated_at,
        });

        Ok(Some(outcome))
    }

    async fn deactivate_device(&self, device_id: i32) -> Result<bool> {
        let mut state = self.inner.write().await;
        match state
            .devices
            .iter_mut()
            .find(|d| d.id == device_id && d.is_active)
        {
            Some(device) => {
                device.is_active = false;
                device.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn control_history(
        &self,
        device_id: Option<i32>,
        limit: i64,
    ) -> Result<Vec<ControlRecord>> {
        let state = self.inner.read().await;
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|r| device_id.is_none_or(|id| id == r.device_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_sample(&self, sample: &NewSample) -> Result<Sample> {
        let mut state = self.inner.write().await;
        let row = Sample {
            id: state.samples.len() as i64 + 1,
            device_id: sample.device_id,
            recorded_at: sample.recorded_at.unwrap_or_else(Utc::now),
            voltage: sample.voltage,
            current: sample.current,
            power: sample.power,
            energy: sample.energy,
            power_factor: sample.power_factor,
            frequency: sample.frequency,
        };
        state.samples.push(row.clone());
        Ok(row)
    }

    fn samples_in_window(&self, window: SampleWindow) -> BoxStream<'_, Result<Sample>> {
        let inner = self.inner.clone();
        stream::once(async move {
            let state = inner.read().await;
            let mut rows: Vec<Sample> = state
                .samples
                .iter()
                .filter(|s| window.contains(s))
                .cloned()
                .collect();
            rows.sort_by_key(|s| s.recorded_at);
            stream::iter(rows.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }

    async fn latest_readings(&self) -> Result<Vec<LatestReading>> {
        let state = self.inner.read().await;
        let mut devices: Vec<_> = state.devices.iter().collect();
        devices.sort_by_key(|d| d.id);

        Ok(devices
            .into_iter()
            .filter_map(|d| {
                latest_for(&state.samples, d.id).map(|s| LatestReading {
                    sample: s.clone(),
                    device_name: d.name.clone(),
                    device_type: d.device_type,
                    location: d.location.clone(),
                })
            })
            .collect())
    }

    async fn insert_alerts(&self, alerts: &[NewAlert]) -> Result<Vec<Alert>> {
        let mut state = self.inner.write().await;
        let mut created = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let row = Alert {
                id: state.alerts.len() as i64 + 1,
                device_id: alert.device_id,
                kind: alert.kind,
                message: alert.message.clone(),
                severity: alert.severity,
                is_read: false,
                created_at: Utc::now(),
            };
            state.alerts.push(row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn list_alerts(&self, limit: i64) -> Result<Vec<AlertWithDevice>> {
        let state = self.inner.read().await;
        Ok(state
            .alerts
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .map(|a| AlertWithDevice {
                alert: a.clone(),
                device_name: a
                    .device_id
                    .and_then(|id| state.devices.iter().find(|d| d.id == id))
                    .map(|d| d.name.clone()),
            })
            .collect())
    }

    async fn mark_alert_read(&self, alert_id: i64) -> Result<bool> {
        let mut state = self.inner.write().await;
        match state.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_alerts_read(&self) -> Result<u64> {
        let mut state = self.inner.write().await;
        let mut changed = 0;
        for alert in state.alerts.iter_mut().filter(|a| !a.is_read) {
            alert.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }
}
