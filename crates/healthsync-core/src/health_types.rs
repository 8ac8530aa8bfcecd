use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Closed, versioned enumeration of supported sample kinds. Adding a variant
/// is a minor version bump of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthDataType {
    StepCount,
    DistanceWalkingRunning,
    DistanceCycling,
    ActiveEnergyBurned,
    BasalEnergyBurned,
    ExerciseMinutes,
    StandHours,
    FlightsClimbed,
    Workouts,
    HeartRate,
    RestingHeartRate,
    WalkingHeartRateAverage,
    HeartRateVariability,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    BloodOxygen,
    RespiratoryRate,
    BodyTemperature,
    Vo2Max,
    SleepAnalysis,
    SleepInBed,
    SleepAsleep,
    SleepAwake,
    SleepRem,
    SleepCore,
    SleepDeep,
    Weight,
    Height,
    BodyMassIndex,
    BodyFatPercentage,
    LeanBodyMass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSample {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub sample_type: HealthDataType,
    pub value: f64,
    pub unit: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthDataStatus {
    Ok,
    NoPermission,
    Locked,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDataResponse {
    pub status: HealthDataStatus,
    pub samples: Vec<HealthSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub has_more: bool,
    pub returned_count: usize,
}

impl HealthDataResponse {
    pub fn ok(samples: Vec<HealthSample>, has_more: bool) -> Self {
        let returned_count = samples.len();
        Self {
            status: HealthDataStatus::Ok,
            samples,
            message: None,
            has_more,
            returned_count,
        }
    }

    pub fn locked() -> Self {
        Self {
            status: HealthDataStatus::Locked,
            samples: vec![],
            message: None,
            has_more: false,
            returned_count: 0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthDataStatus::Error,
            samples: vec![],
            message: Some(message.into()),
            has_more: false,
            returned_count: 0,
        }
    }
}
