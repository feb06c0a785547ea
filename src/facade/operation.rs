use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};

/// Upper bound on `limit` for list operations.
pub const MAX_LIST_LIMIT: i64 = 1000;
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Every operation the facade understands, with typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    DashboardStats,
    ListDevices,
    ToggleDevice { device_id: i32 },
    DeactivateDevice { device_id: i32 },
    PowerHistory { device_id: Option<i32>, hours: Option<i64> },
    LatestReadings,
    ListAlerts { limit: i64 },
    MarkOneRead { alert_id: i64 },
    MarkAllRead,
    ControlHistory { device_id: Option<i32>, limit: i64 },
}

impl Operation {
    pub const NAMES: &'static [&'static str] = &[
        "dashboard_stats",
        "list_devices",
        "toggle_device",
        "deactivate_device",
        "power_history",
        "latest_readings",
        "list_alerts",
        "mark_alert_read",
        "mark_all_alerts_read",
        "control_history",
    ];

    /// Resolve a wire action name and its JSON params.
    ///
    /// Unknown names fail with `UnknownOperation` before params are looked at.
    pub fn parse(action: &str, params: Value) -> ServiceResult<Self> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        match action {
            "dashboard_stats" => Ok(Self::DashboardStats),
            "list_devices" => Ok(Self::ListDevices),
            "latest_readings" => Ok(Self::LatestReadings),
            "mark_all_alerts_read" => Ok(Self::MarkAllRead),

            "toggle_device" => {
                let p: DeviceParams = decode(action, params)?;
                Ok(Self::ToggleDevice {
                    device_id: required_device_id(p.device_id)?,
                })
            }

            "deactivate_device" => {
                let p: DeviceParams = decode(action, params)?;
                Ok(Self::DeactivateDevice {
                    device_id: required_device_id(p.device_id)?,
                })
            }

            "power_history" => {
                let p: HistoryParams = decode(action, params)?;
                // 0 is the "all devices" filter, same as leaving it out.
                Ok(Self::PowerHistory {
                    device_id: p.device_id.filter(|id| *id != 0).map(device_id).transpose()?,
                    hours: p.hours,
                })
            }

            "list_alerts" => {
                let p: ListParams = decode(action, params)?;
                Ok(Self::ListAlerts {
                    limit: limit(p.limit)?,
                })
            }

            // A missing or zero `alertId` resolves to the bulk variant here,
            // so nothing past parsing treats a falsy id as "all".
            "mark_alert_read" => {
                let p: AlertParams = decode(action, params)?;
                match p.alert_id {
                    None | Some(0) => Ok(Self::MarkAllRead),
                    Some(id) if id > 0 => Ok(Self::MarkOneRead { alert_id: id }),
                    Some(_) => Err(ServiceError::invalid("alertId must not be negative")),
                }
            }

            "control_history" => {
                let p: ControlHistoryParams = decode(action, params)?;
                Ok(Self::ControlHistory {
                    device_id: p.device_id.map(device_id).transpose()?,
                    limit: limit(p.limit)?,
                })
            }

            other => Err(ServiceError::UnknownOperation(other.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::DashboardStats => "dashboard_stats",
            Operation::ListDevices => "list_devices",
            Operation::ToggleDevice { .. } => "toggle_device",
            Operation::DeactivateDevice { .. } => "deactivate_device",
            Operation::PowerHistory { .. } => "power_history",
            Operation::LatestReadings => "latest_readings",
            Operation::ListAlerts { .. } => "list_alerts",
            Operation::MarkOneRead { .. } => "mark_alert_read",
            Operation::MarkAllRead => "mark_all_alerts_read",
            Operation::ControlHistory { .. } => "control_history",
        }
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceParams {
    device_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    device_id: Option<i64>,
    hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertParams {
    alert_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlHistoryParams {
    device_id: Option<i64>,
    limit: Option<i64>,
}

fn decode<T: DeserializeOwned>(action: &str, params: Value) -> ServiceResult<T> {
    serde_json::from_value(params)
        .map_err(|e| ServiceError::invalid(format!("invalid params for {action}: {e}")))
}

fn device_id(raw: i64) -> ServiceResult<i32> {
    i32::try_from(raw)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ServiceError::invalid("deviceId must be a positive integer"))
}

fn required_device_id(raw: Option<i64>) -> ServiceResult<i32> {
    device_id(raw.ok_or_else(|| ServiceError::invalid("deviceId is required"))?)
}

fn limit(raw: Option<i64>) -> ServiceResult<i64> {
    match raw.unwrap_or(DEFAULT_LIST_LIMIT) {
        n if (1..=MAX_LIST_LIMIT).contains(&n) => Ok(n),
        _ => Err(ServiceError::invalid(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        ))),
    }
}
