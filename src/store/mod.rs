//! Storage seam for devices, samples, alerts and control history.
//!
//! Every read and write the service performs goes through [`PowerStore`].
//! Production uses [`PgStore`]; tests use an in-memory implementation.

#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::db::models::{
    Alert, AlertWithDevice, ControlRecord, DashboardStats, Device, DeviceWithReading,
    LatestReading, NewAlert, NewSample, Sample, ToggleOutcome,
};

pub use postgres::PgStore;

/// Inclusive time range of samples to scan, optionally for one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWindow {
    pub device_id: Option<i32>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl SampleWindow {
    pub fn contains(&self, sample: &Sample) -> bool {
        self.device_id.is_none_or(|id| id == sample.device_id)
            && sample.recorded_at >= self.since
            && sample.recorded_at <= self.until
    }
}

#[async_trait]
pub trait PowerStore: Send + Sync {
    // -- devices ------------------------------------------------------------

    async fn dashboard_stats(&self, day_start: DateTime<Utc>) -> Result<DashboardStats>;

    /// Active devices ordered by id, each with its latest reading.
    async fn list_devices(&self) -> Result<Vec<DeviceWithReading>>;

    /// Look up an active device.
    async fn active_device(&self, device_id: i32) -> Result<Option<Device>>;

    /// Atomically flip the status of an active device and append a control
    /// record. `None` when no active device has that id.
    async fn toggle_device(
        &self,
        device_id: i32,
        user_id: Option<i32>,
    ) -> Result<Option<ToggleOutcome>>;

    /// Soft delete. Returns `false` when no active device has that id.
    async fn deactivate_device(&self, device_id: i32) -> Result<bool>;

    /// Most recent control records, newest first.
    async fn control_history(
        &self,
        device_id: Option<i32>,
        limit: i64,
    ) -> Result<Vec<ControlRecord>>;

    // -- samples ------------------------------------------------------------

    async fn insert_sample(&self, sample: &NewSample) -> Result<Sample>;

    /// Stream samples inside `window`, oldest first.
    fn samples_in_window(&self, window: SampleWindow) -> BoxStream<'_, Result<Sample>>;

    /// Latest sample of every device that has reported, with device metadata.
    async fn latest_readings(&self) -> Result<Vec<LatestReading>>;

    // -- alerts -------------------------------------------------------------

    async fn insert_alerts(&self, alerts: &[NewAlert]) -> Result<Vec<Alert>>;

    /// Newest first, joined with the device name.
    async fn list_alerts(&self, limit: i64) -> Result<Vec<AlertWithDevice>>;

    /// Returns `false` when the alert does not exist. Already-read alerts
    /// stay read and count as found.
    async fn mark_alert_read(&self, alert_id: i64) -> Result<bool>;

    /// Returns how many alerts changed from unread to read.
    async fn mark_all_alerts_read(&self) -> Result<u64>;
}
