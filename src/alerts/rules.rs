use crate::db::models::{AlertSeverity, AlertType, NewAlert, Sample};

use super::AlertRule;

/// Static limits for the built-in rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    /// Volts. Strictly above fires `overvoltage`.
    pub overvoltage_v: f64,
    /// Volts. Strictly below fires `undervoltage`.
    pub undervoltage_v: f64,
    /// Amperes. Strictly above fires `overcurrent`.
    pub overcurrent_a: f64,
    /// Multiplier on the device rating. Power strictly above
    /// `rating * tolerance` fires `overpower`.
    pub overpower_tolerance: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            overvoltage_v: 250.0,
            undervoltage_v: 200.0,
            overcurrent_a: 16.0,
            overpower_tolerance: 1.2,
        }
    }
}

fn alert(sample: &Sample, kind: AlertType, severity: AlertSeverity, message: String) -> NewAlert {
    NewAlert {
        device_id: Some(sample.device_id),
        kind,
        message,
        severity,
    }
}

#[derive(Debug, Clone)]
pub struct Overvoltage {
    pub limit: f64,
}

impl AlertRule for Overvoltage {
    fn check(&self, sample: &Sample, _rating: f64) -> Option<NewAlert> {
        (sample.voltage > self.limit).then(|| {
            alert(
                sample,
                AlertType::Overvoltage,
                AlertSeverity::High,
                format!(
                    "Voltage above limit: {:.2}V (limit {:.0}V)",
                    sample.voltage, self.limit
                ),
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct Undervoltage {
    pub limit: f64,
}

impl AlertRule for Undervoltage {
    fn check(&self, sample: &Sample, _rating: f64) -> Option<NewAlert> {
        (sample.voltage < self.limit).then(|| {
            alert(
                sample,
                AlertType::Undervoltage,
                AlertSeverity::Medium,
                format!(
                    "Voltage below limit: {:.2}V (limit {:.0}V)",
                    sample.voltage, self.limit
                ),
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct Overcurrent {
    pub limit: f64,
}

impl AlertRule for Overcurrent {
    fn check(&self, sample: &Sample, _rating: f64) -> Option<NewAlert> {
        (sample.current > self.limit).then(|| {
            alert(
                sample,
                AlertType::Overcurrent,
                AlertSeverity::High,
                format!(
                    "Current above limit: {:.3}A (limit {:.1}A)",
                    sample.current, self.limit
                ),
            )
        })
    }
}

/// Fires when power exceeds the device rating by more than the tolerance.
/// Devices without a positive rating are never checked.
#[derive(Debug, Clone)]
pub struct Overpower {
    pub tolerance: f64,
}

impl AlertRule for Overpower {
    fn check(&self, sample: &Sample, rating: f64) -> Option<NewAlert> {
        if rating <= 0.0 {
            return None;
        }
        let limit = rating * self.tolerance;
        (sample.power > limit).then(|| {
            alert(
                sample,
                AlertType::Overpower,
                AlertSeverity::Medium,
                format!(
                    "Power above rating: {:.2}W (rated {:.0}W, limit {:.2}W)",
                    sample.power, rating, limit
                ),
            )
        })
    }
}
