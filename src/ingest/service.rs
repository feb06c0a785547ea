use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    alerts::AlertEngine,
    db::models::{Alert, NewSample, Sample},
    error::{ServiceError, ServiceResult},
    store::PowerStore,
};

/// What a single ingested sample produced.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestOutcome {
    pub sample: Sample,
    pub alerts: Vec<Alert>,
}

/// The only writer of samples. Every persisted sample is handed straight to
/// the alert engine.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn PowerStore>,
    engine: Arc<AlertEngine>,
}

impl IngestService {
    pub fn new(store: Arc<dyn PowerStore>, engine: Arc<AlertEngine>) -> Self {
        Self { store, engine }
    }

    /// Validates `sample`, appends it, then evaluates alert rules against the
    /// device's rating.
    pub async fn ingest(&self, sample: NewSample) -> ServiceResult<IngestOutcome> {
        validate(&sample)?;

        let device = self
            .store
            .active_device(sample.device_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("device {} does not exist", sample.device_id))
            })?;

        let sample = self.store.insert_sample(&sample).await?;
        let alerts = self
            .engine
            .process(self.store.as_ref(), &sample, device.power_rating)
            .await?;

        info!(
            device_id = sample.device_id,
            sample_id = sample.id,
            power = sample.power,
            alerts = alerts.len(),
            "Sample ingested"
        );
        Ok(IngestOutcome { sample, alerts })
    }
}

fn validate(sample: &NewSample) -> ServiceResult<()> {
    if sample.device_id <= 0 {
        return Err(ServiceError::invalid("deviceId must be a positive integer"));
    }

    let fields = [
        ("voltage", sample.voltage),
        ("current", sample.current),
        ("power", sample.power),
        ("energy", sample.energy),
        ("powerFactor", sample.power_factor),
        ("frequency", sample.frequency),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(ServiceError::invalid(format!("{name} must be a finite number")));
        }
        if value < 0.0 {
            return Err(ServiceError::invalid(format!("{name} must not be negative")));
        }
    }
    Ok(())
}
