//! Single dispatch surface over devices, history and alerts.
//!
//! Callers hand in an action name and JSON params; the name is resolved once
//! into an [`Operation`] and executed against the store. Results come back
//! as a [`Reply`] (message plus JSON data) or a [`ServiceError`].

mod operation;

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    aggregator::{Aggregator, HistoryPoint},
    error::{ServiceError, ServiceResult},
    store::PowerStore,
};

pub use operation::{Operation, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Per-request inputs supplied by the caller's identity provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Attributed on control-history rows. `None` for anonymous callers.
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub data: Value,
}

impl Reply {
    fn data(data: impl Serialize) -> ServiceResult<Self> {
        Self::with_message("", data)
    }

    fn with_message(message: impl Into<String>, data: impl Serialize) -> ServiceResult<Self> {
        Ok(Self {
            message: message.into(),
            data: serde_json::to_value(data).map_err(anyhow::Error::from)?,
        })
    }
}

#[derive(Clone)]
pub struct Facade {
    store: Arc<dyn PowerStore>,
    aggregator: Aggregator,
}

impl Facade {
    pub fn new(store: Arc<dyn PowerStore>, aggregator: Aggregator) -> Self {
        Self { store, aggregator }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        action: &str,
        params: Value,
    ) -> ServiceResult<Reply> {
        let op = Operation::parse(action, params)?;
        self.execute(ctx, op).await
    }

    pub async fn execute(&self, ctx: &RequestContext, op: Operation) -> ServiceResult<Reply> {
        self.execute_at(ctx, op, Utc::now()).await
    }

    async fn execute_at(
        &self,
        ctx: &RequestContext,
        op: Operation,
        now: DateTime<Utc>,
    ) -> ServiceResult<Reply> {
        match op {
            Operation::DashboardStats => {
                let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
                Reply::data(self.store.dashboard_stats(day_start).await?)
            }

            Operation::ListDevices => Reply::data(self.store.list_devices().await?),

            Operation::ToggleDevice { device_id } => {
                let outcome = self
                    .store
                    .toggle_device(device_id, ctx.user_id)
                    .await?
                    .ok_or_else(|| not_found_device(device_id))?;

                info!(
                    device_id,
                    user_id = ?ctx.user_id,
                    previous = %outcome.previous_status,
                    new = %outcome.new_status,
                    "Device toggled"
                );
                Reply::with_message(format!("Device turned {}", outcome.new_status), outcome)
            }

            Operation::DeactivateDevice { device_id } => {
                if !self.store.deactivate_device(device_id).await? {
                    return Err(not_found_device(device_id));
                }
                info!(device_id, user_id = ?ctx.user_id, "Device deactivated");
                Reply::with_message("Device deactivated", json!({ "device_id": device_id }))
            }

            Operation::PowerHistory { device_id, hours } => {
                let points: Vec<HistoryPoint> = self
                    .aggregator
                    .history(device_id, hours, now)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect();
                Reply::data(points)
            }

            Operation::LatestReadings => Reply::data(self.store.latest_readings().await?),

            Operation::ListAlerts { limit } => Reply::data(self.store.list_alerts(limit).await?),

            Operation::MarkOneRead { alert_id } => {
                if !self.store.mark_alert_read(alert_id).await? {
                    return Err(ServiceError::not_found(format!(
                        "alert {alert_id} does not exist"
                    )));
                }
                Reply::with_message("Alert marked as read", json!({ "alert_id": alert_id }))
            }

            Operation::MarkAllRead => {
                let updated = self.store.mark_all_alerts_read().await?;
                info!(updated, user_id = ?ctx.user_id, "All alerts marked as read");
                Reply::with_message("All alerts marked as read", json!({ "updated": updated }))
            }

            Operation::ControlHistory { device_id, limit } => {
                Reply::data(self.store.control_history(device_id, limit).await?)
            }
        }
    }
}

fn not_found_device(device_id: i32) -> ServiceError {
    ServiceError::not_found(format!("device {device_id} does not exist or is inactive"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::{
        aggregator::HistorySettings,
        alerts::AlertEngine,
        db::models::{DeviceStatus, NewAlert},
        store::memory::{device, new_sample, MemoryStore},
    };

    fn facade(store: &MemoryStore) -> Facade {
        let shared: Arc<dyn PowerStore> = Arc::new(store.clone());
        Facade::new(shared.clone(), Aggregator::new(shared, HistorySettings::default()))
    }

    fn ctx() -> RequestContext {
        RequestContext { user_id: Some(7) }
    }

    async fn raise_alerts(store: &MemoryStore, n: usize) {
        let engine = AlertEngine::default();
        for _ in 0..n {
            let sample = store
                .insert_sample(&new_sample(1, Utc::now(), 260.0, 0.01))
                .await
                .unwrap();
            engine.process(store, &sample, 1000.0).await.unwrap();
        }
    }

    #[tokio::test]
    async fn toggle_turns_off_device_on() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::Off, 1000.0)]);
        let reply = facade(&store)
            .handle(&ctx(), "toggle_device", json!({ "deviceId": 1 }))
            .await
            .unwrap();

        assert_eq!(reply.data["new_status"], "on");
        assert_eq!(reply.message, "Device turned on");
        assert_eq!(store.device(1).await.unwrap().status, DeviceStatus::On);
    }

    #[tokio::test]
    async fn toggle_twice_restores_status_and_logs_both() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::Off, 1000.0)]);
        let f = facade(&store);

        f.execute(&ctx(), Operation::ToggleDevice { device_id: 1 }).await.unwrap();
        f.execute(&ctx(), Operation::ToggleDevice { device_id: 1 }).await.unwrap();
        assert_eq!(store.device(1).await.unwrap().status, DeviceStatus::Off);

        let history = f
            .execute(&ctx(), Operation::ControlHistory { device_id: Some(1), limit: 10 })
            .await
            .unwrap()
            .data;
        let rows = history.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        // Newest first.
        assert_eq!(rows[0]["previous_status"], "on");
        assert_eq!(rows[0]["new_status"], "off");
        assert_eq!(rows[0]["action"], "turn_off");
        assert_eq!(rows[1]["previous_status"], "off");
        assert_eq!(rows[1]["new_status"], "on");
        assert_eq!(rows[1]["user_id"], 7);
    }

    #[tokio::test]
    async fn toggle_unknown_or_inactive_device_is_not_found() {
        let mut inactive = device(2, DeviceStatus::Off, 10.0);
        inactive.is_active = false;
        let store = MemoryStore::with_devices(vec![inactive]);
        let f = facade(&store);

        for id in [2, 99] {
            let err = f
                .execute(&ctx(), Operation::ToggleDevice { device_id: id })
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
        }
        assert_eq!(store.device(2).await.unwrap().status, DeviceStatus::Off);
    }

    #[tokio::test]
    async fn toggle_without_device_id_is_invalid_input() {
        let store = MemoryStore::new();
        let err = facade(&store)
            .handle(&ctx(), "toggle_device", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let err = facade(&MemoryStore::new())
            .handle(&ctx(), "get_everything", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownOperation(_)));
    }

    #[tokio::test]
    async fn dashboard_stats_counts_active_devices_and_today_energy() {
        let mut gone = device(3, DeviceStatus::On, 5000.0);
        gone.is_active = false;
        let store = MemoryStore::with_devices(vec![
            device(1, DeviceStatus::On, 1000.0),
            device(2, DeviceStatus::Off, 60.0),
            gone,
        ]);
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 0).unwrap();
        store
            .insert_sample(&new_sample(1, now - TimeDelta::hours(1), 230.0, 0.5))
            .await
            .unwrap();
        store
            .insert_sample(&new_sample(1, now - TimeDelta::hours(10), 230.0, 4.0))
            .await
            .unwrap();
        store
            .insert_alerts(&[NewAlert {
                device_id: Some(1),
                kind: crate::db::models::AlertType::General,
                message: "check wiring".into(),
                severity: crate::db::models::AlertSeverity::Low,
            }])
            .await
            .unwrap();

        let data = facade(&store)
            .execute_at(&ctx(), Operation::DashboardStats, now)
            .await
            .unwrap()
            .data;

        assert_eq!(
            data,
            json!({
                "total_devices": 2,
                "devices_on": 1,
                "current_power": 1000.0,
                "today_energy": 0.5,
                "unread_alerts": 1,
            })
        );
    }

    #[tokio::test]
    async fn list_devices_defaults_readings_to_zero() {
        let store = MemoryStore::with_devices(vec![
            device(2, DeviceStatus::On, 100.0),
            device(1, DeviceStatus::On, 100.0),
        ]);
        store
            .insert_sample(&new_sample(2, Utc::now(), 231.0, 0.1))
            .await
            .unwrap();

        let data = facade(&store)
            .execute(&ctx(), Operation::ListDevices)
            .await
            .unwrap()
            .data;
        let rows = data.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[0]["current_voltage"], 0.0);
        assert!(rows[0]["last_recorded_at"].is_null());
        assert_eq!(rows[1]["current_voltage"], 231.0);
    }

    #[tokio::test]
    async fn deactivated_device_disappears_from_listing() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::On, 100.0)]);
        let f = facade(&store);

        f.execute(&ctx(), Operation::DeactivateDevice { device_id: 1 })
            .await
            .unwrap();
        let data = f.execute(&ctx(), Operation::ListDevices).await.unwrap().data;
        assert_eq!(data, json!([]));

        let again = f
            .execute(&ctx(), Operation::DeactivateDevice { device_id: 1 })
            .await;
        assert!(matches!(again, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn power_history_without_samples_is_empty_success() {
        let store = MemoryStore::with_devices(vec![device(5, DeviceStatus::On, 100.0)]);
        let reply = facade(&store)
            .handle(&ctx(), "power_history", json!({ "deviceId": 5, "hours": 24 }))
            .await
            .unwrap();
        assert_eq!(reply.data, json!([]));
    }

    #[tokio::test]
    async fn power_history_points_are_ascending() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::On, 100.0)]);
        let now = Utc::now();
        for minutes_ago in [3, 30, 1, 12] {
            store
                .insert_sample(&new_sample(1, now - TimeDelta::minutes(minutes_ago), 230.0, 0.1))
                .await
                .unwrap();
        }

        let data = facade(&store)
            .execute_at(
                &ctx(),
                Operation::PowerHistory { device_id: Some(1), hours: None },
                now,
            )
            .await
            .unwrap()
            .data;
        let times: Vec<&str> = data
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["time"].as_str().unwrap())
            .collect();
        assert_eq!(times.len(), 4);
        assert!(times.windows(2).all(|w| w[0] < w[1]), "{times:?}");
    }

    #[tokio::test]
    async fn mark_alert_read_is_idempotent() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::On, 1000.0)]);
        raise_alerts(&store, 2).await;
        let f = facade(&store);

        for _ in 0..2 {
            f.handle(&ctx(), "mark_alert_read", json!({ "alertId": 1 }))
                .await
                .unwrap();
            let alerts = store.alerts().await;
            assert!(alerts[0].is_read);
            assert!(!alerts[1].is_read);
        }
    }

    #[tokio::test]
    async fn mark_missing_alert_is_not_found() {
        let err = facade(&MemoryStore::new())
            .execute(&ctx(), Operation::MarkOneRead { alert_id: 42 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_alert_read_zero_marks_everything() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::On, 1000.0)]);
        raise_alerts(&store, 3).await;
        let f = facade(&store);

        let reply = f
            .handle(&ctx(), "mark_alert_read", json!({ "alertId": 0 }))
            .await
            .unwrap();
        assert_eq!(reply.data["updated"], 3);

        let listed = f
            .handle(&ctx(), "list_alerts", Value::Null)
            .await
            .unwrap()
            .data;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|a| a["is_read"] == true));
        assert_eq!(listed[0]["device_name"], "device-1");

        let stats = f
            .execute(&ctx(), Operation::DashboardStats)
            .await
            .unwrap()
            .data;
        assert_eq!(stats["unread_alerts"], 0);
    }

    #[tokio::test]
    async fn mark_alert_read_without_id_marks_everything() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::On, 1000.0)]);
        raise_alerts(&store, 1).await;

        let reply = facade(&store)
            .handle(&ctx(), "mark_alert_read", json!({}))
            .await
            .unwrap();
        assert_eq!(reply.message, "All alerts marked as read");
        assert_eq!(reply.data["updated"], 1);
        assert!(store.alerts().await.iter().all(|a| a.is_read));
    }

    #[tokio::test]
    async fn list_alerts_is_newest_first_and_limited() {
        let store = MemoryStore::with_devices(vec![device(1, DeviceStatus::On, 1000.0)]);
        raise_alerts(&store, 4).await;

        let data = facade(&store)
            .execute(&ctx(), Operation::ListAlerts { limit: 2 })
            .await
            .unwrap()
            .data;
        let ids: Vec<i64> = data
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn latest_readings_has_one_row_per_device() {
        let store = MemoryStore::with_devices(vec![
            device(1, DeviceStatus::On, 100.0),
            device(2, DeviceStatus::On, 100.0),
        ]);
        let now = Utc::now();
        store
            .insert_sample(&new_sample(1, now - TimeDelta::minutes(2), 220.0, 0.1))
            .await
            .unwrap();
        store
            .insert_sample(&new_sample(1, now, 235.0, 0.1))
            .await
            .unwrap();

        let data = facade(&store)
            .execute(&ctx(), Operation::LatestReadings)
            .await
            .unwrap()
            .data;
        let rows = data.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["device_id"], 1);
        assert_eq!(rows[0]["voltage"], 235.0);
        assert_eq!(rows[0]["device_name"], "device-1");
        assert_eq!(rows[0]["device_type"], "socket");
    }
}
