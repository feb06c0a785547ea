//! Threshold alerting, driven by newly persisted samples.
//!
//! The engine holds an open list of [`AlertRule`]s. Each rule that fires for
//! a sample yields exactly one alert; there is no deduplication across
//! consecutive samples, so a sustained fault produces one alert per sample.

pub mod rules;

use tracing::warn;

use crate::{
    db::models::{Alert, NewAlert, Sample},
    error::ServiceResult,
    store::PowerStore,
};

pub use rules::AlertThresholds;

/// A single independent check of one sample.
pub trait AlertRule: Send + Sync {
    /// `rating` is the device's rated power in watts (0 when unknown).
    fn check(&self, sample: &Sample, rating: f64) -> Option<NewAlert>;
}

pub struct AlertEngine {
    rules: Vec<Box<dyn AlertRule>>,
}

impl AlertEngine {
    pub fn new(rules: Vec<Box<dyn AlertRule>>) -> Self {
        Self { rules }
    }

    /// Engine with the built-in voltage, current and power rules.
    pub fn with_thresholds(t: &AlertThresholds) -> Self {
        Self::new(vec![
            Box::new(rules::Overvoltage { limit: t.overvoltage_v }),
            Box::new(rules::Undervoltage { limit: t.undervoltage_v }),
            Box::new(rules::Overcurrent { limit: t.overcurrent_a }),
            Box::new(rules::Overpower { tolerance: t.overpower_tolerance }),
        ])
    }

    /// Add a rule after construction.
    pub fn push_rule(&mut self, rule: Box<dyn AlertRule>) {
        self.rules.push(rule);
    }

    pub fn evaluate(&self, sample: &Sample, rating: f64) -> Vec<NewAlert> {
        self.rules
            .iter()
            .filter_map(|rule| rule.check(sample, rating))
            .collect()
    }

    /// Evaluate `sample` and persist every alert it raises.
    pub async fn process(
        &self,
        store: &dyn PowerStore,
        sample: &Sample,
        rating: f64,
    ) -> ServiceResult<Vec<Alert>> {
        let raised = self.evaluate(sample, rating);
        if raised.is_empty() {
            return Ok(Vec::new());
        }

        let created = store.insert_alerts(&raised).await?;
        for a in &created {
            warn!(
                device_id = ?a.device_id,
                alert_id = a.id,
                kind = %a.kind,
                severity = ?a.severity,
                "{}",
                a.message
            );
        }
        Ok(created)
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::with_thresholds(&AlertThresholds::default())
    }
}
