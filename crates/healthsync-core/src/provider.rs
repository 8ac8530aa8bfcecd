use crate::health_types::{HealthDataResponse, HealthDataType};
use chrono::{DateTime, Utc};

/// The engine's only dependency on a concrete health data source. A
/// HealthKit-backed adapter is an external collaborator; this crate only
/// defines the boundary and ships a simulated implementation for the
/// service binary and its tests.
///
/// Every outcome, including "the underlying health framework is
/// unavailable", is modeled as data in the returned `HealthDataResponse`
/// rather than as a Rust-level error: the engine always has exactly one
/// response to audit and send back, with no separate error path to thread
/// through the handler or forget to audit.
#[async_trait::async_trait]
pub trait HealthProvider: Send + Sync {
    async fn fetch_samples(
        &self,
        types: &[HealthDataType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> HealthDataResponse;
}
