use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{db::models::NewSample, facade::Reply};

/// Request body for `POST /api`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiRequest {
    /// Operation name, e.g. `dashboard_stats` or `toggle_device`.
    pub action: String,
    /// Operation parameters (camelCase keys). May be omitted.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Value,
}

/// Every response body, success or failure.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[schema(value_type = Object)]
    pub data: Value,
}

impl Envelope {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Value::Null,
        }
    }
}

impl From<Reply> for Envelope {
    fn from(r: Reply) -> Self {
        Self {
            success: true,
            message: r.message,
            data: r.data,
        }
    }
}

/// Request body for `POST /samples`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SampleRequest {
    pub device_id: i32,
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Watts
    pub power: f64,
    /// kWh since the device's previous sample
    pub energy: f64,
    #[serde(default = "unity")]
    pub power_factor: f64,
    /// Hz
    #[serde(default = "mains_hz")]
    pub frequency: f64,
    /// Defaults to the time of ingestion.
    pub recorded_at: Option<DateTime<Utc>>,
}

fn unity() -> f64 {
    1.0
}

fn mains_hz() -> f64 {
    50.0
}

impl From<SampleRequest> for NewSample {
    fn from(r: SampleRequest) -> Self {
        Self {
            device_id: r.device_id,
            recorded_at: r.recorded_at,
            voltage: r.voltage,
            current: r.current,
            power: r.power,
            energy: r.energy,
            power_factor: r.power_factor,
            frequency: r.frequency,
        }
    }
}
