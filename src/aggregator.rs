//! Time-bucketed power history for charting.
//!
//! Raw samples inside the requested window are streamed from the store and
//! folded into fixed-width buckets aligned to the Unix epoch. Only the most
//! recent `max_buckets` buckets are kept, and the result is always returned
//! in ascending time order.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    db::models::Sample,
    error::{ServiceError, ServiceResult},
    store::{PowerStore, SampleWindow},
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySettings {
    /// Window used when the caller does not give one.
    pub default_hours: i64,
    /// Largest window a caller may request.
    pub max_hours: i64,
    pub bucket_width: TimeDelta,
    pub max_buckets: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_hours: 24,
            max_hours: 24 * 365,
            bucket_width: TimeDelta::minutes(1),
            max_buckets: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// Aggregate of every sample whose `recorded_at` truncates to `bucket_start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub avg_voltage: f64,
    pub avg_current: f64,
    pub avg_power: f64,
    /// Sum, never mean: each sample's energy is already a delta.
    pub total_energy: f64,
    pub sample_count: u64,
}

/// Chart point as served by `power_history`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistoryPoint {
    /// Bucket start, UTC, `YYYY-MM-DD HH:MM`.
    pub time: String,
    pub avg_voltage: f64,
    pub avg_current: f64,
    pub avg_power: f64,
    pub total_energy: f64,
}

impl From<Bucket> for HistoryPoint {
    fn from(b: Bucket) -> Self {
        Self {
            time: b.bucket_start.format("%Y-%m-%d %H:%M").to_string(),
            avg_voltage: b.avg_voltage,
            avg_current: b.avg_current,
            avg_power: b.avg_power,
            total_energy: b.total_energy,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    voltage: f64,
    current: f64,
    power: f64,
    energy: f64,
    count: u64,
}

impl Accumulator {
    fn add(&mut self, s: &Sample) {
        self.voltage += s.voltage;
        self.current += s.current;
        self.power += s.power;
        self.energy += s.energy;
        self.count += 1;
    }

    fn finish(self, start_secs: i64) -> Option<Bucket> {
        let n = self.count as f64;
        Some(Bucket {
            bucket_start: DateTime::from_timestamp(start_secs, 0)?,
            avg_voltage: self.voltage / n,
            avg_current: self.current / n,
            avg_power: self.power / n,
            total_energy: self.energy,
            sample_count: self.count,
        })
    }
}

/// Start (Unix seconds) of the bucket containing `ts`.
pub fn bucket_start(ts: DateTime<Utc>, width_secs: i64) -> i64 {
    let secs = ts.timestamp();
    secs - secs.rem_euclid(width_secs)
}

/// Folds samples, in any order, into the newest `max_buckets` buckets.
///
/// Once more than `max_buckets` distinct buckets have been seen the oldest
/// one can never make the cut, so it is dropped together with anything at or
/// before it. Memory stays bounded by `max_buckets`.
#[derive(Debug)]
pub struct Bucketizer {
    width_secs: i64,
    max_buckets: usize,
    buckets: BTreeMap<i64, Accumulator>,
    evicted_up_to: Option<i64>,
}

impl Bucketizer {
    /// `width_secs` and `max_buckets` must be positive.
    pub fn new(width_secs: i64, max_buckets: usize) -> Self {
        Self {
            width_secs,
            max_buckets,
            buckets: BTreeMap::new(),
            evicted_up_to: None,
        }
    }

    pub fn push(&mut self, sample: &Sample) {
        let start = bucket_start(sample.recorded_at, self.width_secs);
        if self.evicted_up_to.is_some_and(|floor| start <= floor) {
            return;
        }

        self.buckets.entry(start).or_default().add(sample);

        if self.buckets.len() > self.max_buckets {
            if let Some((oldest, _)) = self.buckets.pop_first() {
                self.evicted_up_to = Some(oldest);
            }
        }
    }

    /// Buckets in ascending order of start time.
    pub fn finish(self) -> Vec<Bucket> {
        self.buckets
            .into_iter()
            .filter_map(|(start, acc)| acc.finish(start))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateRequest {
    pub device_id: Option<i32>,
    pub window_hours: i64,
    pub bucket_width: TimeDelta,
    pub max_buckets: usize,
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn PowerStore>,
    settings: HistorySettings,
}

impl Aggregator {
    pub fn new(store: Arc<dyn PowerStore>, settings: HistorySettings) -> Self {
        Self { store, settings }
    }

    /// Power history with the configured bucket width and cap.
    ///
    /// `hours` defaults to `default_hours` and must lie in `1..=max_hours`.
    pub async fn history(
        &self,
        device_id: Option<i32>,
        hours: Option<i64>,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<Bucket>> {
        let window_hours = hours.unwrap_or(self.settings.default_hours);
        if window_hours > self.settings.max_hours {
            return Err(ServiceError::invalid(format!(
                "hours must not exceed {}",
                self.settings.max_hours
            )));
        }

        self.aggregate(
            AggregateRequest {
                device_id,
                window_hours,
                bucket_width: self.settings.bucket_width,
                max_buckets: self.settings.max_buckets,
            },
            now,
        )
        .await
    }

    /// Samples recorded in `[now - window_hours, now]`, bucketed.
    ///
    /// An unknown device simply has no samples and yields an empty series.
    pub async fn aggregate(
        &self,
        req: AggregateRequest,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<Bucket>> {
        if req.window_hours <= 0 {
            return Err(ServiceError::invalid("hours must be a positive integer"));
        }
        let width_secs = req.bucket_width.num_seconds();
        if width_secs <= 0 {
            return Err(ServiceError::invalid("bucket width must be at least one second"));
        }
        if req.max_buckets == 0 {
            return Err(ServiceError::invalid("bucket limit must be positive"));
        }

        let since = TimeDelta::try_hours(req.window_hours)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| ServiceError::invalid("hours is out of range"))?;
        let window = SampleWindow {
            device_id: req.device_id,
            since,
            until: now,
        };

        let mut bucketizer = Bucketizer::new(width_secs, req.max_buckets);
        let mut scanned = 0u64;
        let mut rows = self.store.samples_in_window(window);
        while let Some(sample) = rows.try_next().await? {
            bucketizer.push(&sample);
            scanned += 1;
        }

        let buckets = bucketizer.finish();
        debug!(
            device_id = ?req.device_id,
            window_hours = req.window_hours,
            scanned,
            buckets = buckets.len(),
            "Power history aggregated"
        );
        Ok(buckets)
    }
}
