use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Postgres enums
// ---------------------------------------------------------------------------

/// Mirrors the `device_type` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "device_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Ac,
    Fan,
    Heater,
    Socket,
    Other,
}

/// Mirrors the `device_status` Postgres enum. Only toggling writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "device_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    On,
    Off,
}

impl DeviceStatus {
    pub fn toggled(self) -> Self {
        match self {
            DeviceStatus::On => DeviceStatus::Off,
            DeviceStatus::Off => DeviceStatus::On,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceStatus::On => "on",
            DeviceStatus::Off => "off",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "alert_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Overvoltage,
    Undervoltage,
    Overcurrent,
    Overpower,
    General,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertType::Overvoltage => "overvoltage",
            AlertType::Undervoltage => "undervoltage",
            AlertType::Overcurrent => "overcurrent",
            AlertType::Overpower => "overpower",
            AlertType::General => "general",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "alert_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "control_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    TurnOn,
    TurnOff,
}

impl From<DeviceStatus> for ControlAction {
    /// The action that leads *to* the given status.
    fn from(new_status: DeviceStatus) -> Self {
        match new_status {
            DeviceStatus::On => ControlAction::TurnOn,
            DeviceStatus::Off => ControlAction::TurnOff,
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub id: i32,
    pub name: String,
    pub device_type: DeviceType,
    pub location: Option<String>,
    /// Watts
    pub power_rating: f64,
    pub status: DeviceStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable row of `power_samples`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Sample {
    pub id: i64,
    pub device_id: i32,
    pub recorded_at: DateTime<Utc>,
    /// Volts
    pub voltage: f64,
    /// Amperes
    #[sqlx(rename = "current_amps")]
    pub current: f64,
    /// Watts
    pub power: f64,
    /// kWh accrued since the previous sample of this device (not cumulative).
    pub energy: f64,
    pub power_factor: f64,
    /// Hz
    pub frequency: f64,
}

/// A validated sample about to be appended. `recorded_at = None` means "now".
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub device_id: i32,
    pub recorded_at: Option<DateTime<Utc>>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub energy: f64,
    pub power_factor: f64,
    pub frequency: f64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    pub id: i64,
    pub device_id: Option<i32>,
    #[sqlx(rename = "alert_type")]
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub message: String,
    pub severity: AlertSeverity,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: Option<i32>,
    pub kind: AlertType,
    pub message: String,
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct AlertWithDevice {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub alert: Alert,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ControlRecord {
    pub id: i64,
    pub device_id: i32,
    pub user_id: Option<i32>,
    pub action: ControlAction,
    pub previous_status: DeviceStatus,
    pub new_status: DeviceStatus,
    pub created_at: DateTime<Utc>,
}

/// An active device joined with the power/voltage/current of its most recent
/// sample. Readings are zero when the device has never reported.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct DeviceWithReading {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub device: Device,
    pub current_power: f64,
    pub current_voltage: f64,
    pub current_current: f64,
    pub last_recorded_at: Option<DateTime<Utc>>,
}

/// The most recent sample of one device with the device's metadata.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct LatestReading {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub sample: Sample,
    pub device_name: String,
    pub device_type: DeviceType,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_devices: i64,
    pub devices_on: i64,
    /// Sum of the rated power of every active device that is on, in watts.
    pub current_power: f64,
    /// kWh recorded since the start of the current UTC day.
    pub today_energy: f64,
    pub unread_alerts: i64,
}

/// Result of a successful toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ToggleOutcome {
    pub device_id: i32,
    pub previous_status: DeviceStatus,
    pub new_status: DeviceStatus,
    pub updated_at: DateTime<Utc>,
}
