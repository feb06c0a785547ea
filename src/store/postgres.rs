use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use sqlx::PgPool;
use tracing::debug;

use super::{PowerStore, SampleWindow};
use crate::db::models::{
    Alert, AlertWithDevice, ControlAction, ControlRecord, DashboardStats, Device,
    DeviceStatus, DeviceWithReading, LatestReading, NewAlert, NewSample, Sample, ToggleOutcome,
};

/// `PowerStore` backed by the Postgres schema in `migrations/`.
///
/// All statements use bound parameters.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PowerStore for PgStore {
    async fn dashboard_stats(&self, day_start: DateTime<Utc>) -> Result<DashboardStats> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM devices WHERE is_active) AS total_devices,
                (SELECT COUNT(*) FROM devices WHERE is_active AND status = 'on') AS devices_on,
                (SELECT COALESCE(SUM(power_rating), 0)
                   FROM devices WHERE is_active AND status = 'on') AS current_power,
                (SELECT COALESCE(SUM(energy), 0)
                   FROM power_samples WHERE recorded_at >= $1) AS today_energy,
                (SELECT COUNT(*) FROM alerts WHERE NOT is_read) AS unread_alerts
            "#,
        )
        .bind(day_start)
        .fetch_one(&self.pool)
        .await
        .context("dashboard stats query failed")?;

        Ok(stats)
    }

    async fn list_devices(&self) -> Result<Vec<DeviceWithReading>> {
        let rows = sqlx::query_as::<_, DeviceWithReading>(
            r#"
            SELECT d.id, d.name, d.device_type, d.location, d.power_rating,
                   d.status, d.is_active, d.created_at, d.updated_at,
                   COALESCE(s.power, 0)        AS current_power,
                   COALESCE(s.voltage, 0)      AS current_voltage,
                   COALESCE(s.current_amps, 0) AS current_current,
                   s.recorded_at               AS last_recorded_at
            FROM devices d
            LEFT JOIN LATERAL (
                SELECT power, voltage, current_amps, recorded_at
                FROM power_samples
                WHERE device_id = d.id
                ORDER BY recorded_at DESC, id DESC
                LIMIT 1
            ) s ON TRUE
            WHERE d.is_active
            ORDER BY d.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list devices query failed")?;

        Ok(rows)
    }

    async fn active_device(&self, device_id: i32) -> Result<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, name, device_type, location, power_rating,
                   status, is_active, created_at, updated_at
            FROM devices
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .context("device lookup failed")?;

        Ok(device)
    }

    async fn toggle_device(
        &self,
        device_id: i32,
        user_id: Option<i32>,
    ) -> Result<Option<ToggleOutcome>> {
        let mut tx = self.pool.begin().await?;

        // Single-statement flip: the row lock serializes concurrent toggles.
        let flipped = sqlx::query_as::<_, (DeviceStatus, DateTime<Utc>)>(
            r#"
            UPDATE devices
            SET status = CASE WHEN status = 'on'
                              THEN 'off'::device_status
                              ELSE 'on'::device_status END,
                updated_at = now()
            WHERE id = $1 AND is_active
            RETURNING status, updated_at
            "#,
        )
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await
        .context("device status update failed")?;

        let Some((new_status, updated_at)) = flipped else {
            return Ok(None);
        };
        let previous_status = new_status.toggled();

        sqlx::query(
            r#"
            INSERT INTO control_history (device_id, user_id, action, previous_status, new_status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(device_id)
        .bind(user_id)
        .bind(ControlAction::from(new_status))
        .bind(previous_status)
        .bind(new_status)
        .execute(&mut *tx)
        .await
        .context("control history insert failed")?;

        tx.commit().await?;

        Ok(Some(ToggleOutcome {
            device_id,
            previous_status,
            new_status,
            updated_at,
        }))
    }

    async fn deactivate_device(&self, device_id: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = FALSE, updated_at = now() WHERE id = $1 AND is_active",
        )
        .bind(device_id)
        .execute(&self.pool)
        .await
        .context("device deactivation failed")?;

        Ok(result.rows_affected() > 0)
    }

    async fn control_history(
        &self,
        device_id: Option<i32>,
        limit: i64,
    ) -> Result<Vec<ControlRecord>> {
        let rows = sqlx::query_as::<_, ControlRecord>(
            r#"
            SELECT id, device_id, user_id, action, previous_status, new_status, created_at
            FROM control_history
            WHERE ($1::int IS NULL OR device_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("control history query failed")?;

        Ok(rows)
    }

    async fn insert_sample(&self, sample: &NewSample) -> Result<Sample> {
        let row = sqlx::query_as::<_, Sample>(
            r#"
            INSERT INTO power_samples
                (device_id, recorded_at, voltage, current_amps, power, energy,
                 power_factor, frequency)
            VALUES ($1, COALESCE($2, now()), $3, $4, $5, $6, $7, $8)
            RETURNING id, device_id, recorded_at, voltage, current_amps, power, energy,
                      power_factor, frequency
            "#,
        )
        .bind(sample.device_id)
        .bind(sample.recorded_at)
        .bind(sample.voltage)
        .bind(sample.current)
        .bind(sample.power)
        .bind(sample.energy)
        .bind(sample.power_factor)
        .bind(sample.frequency)
        .fetch_one(&self.pool)
        .await
        .context("sample insert failed")?;

        debug!(device_id = row.device_id, sample_id = row.id, "Sample persisted");
        Ok(row)
    }

    fn samples_in_window(&self, window: SampleWindow) -> BoxStream<'_, Result<Sample>> {
        sqlx::query_as::<_, Sample>(
            r#"
            SELECT id, device_id, recorded_at, voltage, current_amps, power, energy,
                   power_factor, frequency
            FROM power_samples
            WHERE recorded_at >= $1
              AND recorded_at <= $2
              AND ($3::int IS NULL OR device_id = $3)
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(window.since)
        .bind(window.until)
        .bind(window.device_id)
        .fetch(&self.pool)
        .map_err(anyhow::Error::from)
        .boxed()
    }

    async fn latest_readings(&self) -> Result<Vec<LatestReading>> {
        let rows = sqlx::query_as::<_, LatestReading>(
            r#"
            SELECT DISTINCT ON (s.device_id)
                   s.id, s.device_id, s.recorded_at, s.voltage, s.current_amps,
                   s.power, s.energy, s.power_factor, s.frequency,
                   d.name AS device_name, d.device_type, d.location
            FROM power_samples s
            JOIN devices d ON d.id = s.device_id
            ORDER BY s.device_id, s.recorded_at DESC, s.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("latest readings query failed")?;

        Ok(rows)
    }

    async fn insert_alerts(&self, alerts: &[NewAlert]) -> Result<Vec<Alert>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let row = sqlx::query_as::<_, Alert>(
                r#"
                INSERT INTO alerts (device_id, alert_type, message, severity)
                VALUES ($1, $2, $3, $4)
                RETURNING id, device_id, alert_type, message, severity, is_read, created_at
                "#,
            )
            .bind(alert.device_id)
            .bind(alert.kind)
            .bind(&alert.message)
            .bind(alert.severity)
            .fetch_one(&mut *tx)
            .await
            .context("alert insert failed")?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_alerts(&self, limit: i64) -> Result<Vec<AlertWithDevice>> {
        let rows = sqlx::query_as::<_, AlertWithDevice>(
            r#"
            SELECT a.id, a.device_id, a.alert_type, a.message, a.severity,
                   a.is_read, a.created_at, d.name AS device_name
            FROM alerts a
            LEFT JOIN devices d ON d.id = a.device_id
            ORDER BY a.created_at DESC, a.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("list alerts query failed")?;

        Ok(rows)
    }

    async fn mark_alert_read(&self, alert_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE alerts SET is_read = TRUE WHERE id = $1")
            .bind(alert_id)
            .execute(&self.pool)
            .await
            .context("mark alert read failed")?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_alerts_read(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE alerts SET is_read = TRUE WHERE NOT is_read")
            .execute(&self.pool)
            .await
            .context("mark all alerts read failed")?;

        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
