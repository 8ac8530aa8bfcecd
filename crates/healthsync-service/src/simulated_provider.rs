//! A dev/test stand-in for a HealthKit-backed adapter living outside this
//! crate. Generates deterministic, in-memory samples so
//! the service binary and its integration tests are runnable end-to-end
//! without a real device. No raw provider-native value crosses this
//! boundary — every sample is already a `HealthSample` DTO.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use healthsync_core::health_types::{HealthDataResponse, HealthDataStatus, HealthDataType, HealthSample};
use healthsync_core::provider::HealthProvider;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

const MAX_LIMIT: usize = 10_000;
const SAMPLE_INTERVAL_MINUTES: i64 = 60;
const MAX_SAMPLES_PER_TYPE: usize = 2_000;

/// Six-stage sleep cycle the simulated provider rotates through to answer
/// both `sleepAnalysis` (all stages) and the five stage-specific variants.
const SLEEP_CYCLE: &[HealthDataType] = &[
    HealthDataType::SleepInBed,
    HealthDataType::SleepAsleep,
    HealthDataType::SleepCore,
    HealthDataType::SleepRem,
    HealthDataType::SleepDeep,
    HealthDataType::SleepAwake,
];

pub struct SimulatedHealthProvider {
    unavailable: AtomicBool,
}

impl SimulatedHealthProvider {
    pub fn new() -> Self {
        Self { unavailable: AtomicBool::new(false) }
    }

    /// Test/dev hook: flips the provider into its "underlying health
    /// framework is unavailable" failure mode.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

impl Default for SimulatedHealthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProvider for SimulatedHealthProvider {
    async fn fetch_samples(
        &self,
        types: &[HealthDataType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> HealthDataResponse {
        if self.unavailable.load(Ordering::Relaxed) {
            return HealthDataResponse::error("Health data is unavailable");
        }

        let limit = limit.min(MAX_LIMIT);
        let mut all: Vec<HealthSample> = Vec::new();
        for &sample_type in types {
            all.extend(synthesize(sample_type, start, end));
        }
        all.sort_by(|a, b| b.start.cmp(&a.start));

        // has_more iff a sample exists past offset+limit — equivalent to
        // fetching limit+offset+1 and detecting overflow.
        let has_more = all.len() > offset.saturating_add(limit);
        let page: Vec<HealthSample> = all.into_iter().skip(offset).take(limit).collect();

        HealthDataResponse::ok(page, has_more)
    }
}

fn synthesize(sample_type: HealthDataType, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<HealthSample> {
    if start >= end {
        return vec![];
    }
    match sleep_stage_filter(sample_type) {
        Some(stage_filter) => synthesize_sleep(stage_filter, start, end),
        None if sample_type == HealthDataType::Workouts => synthesize_workouts(start, end),
        None => synthesize_scalar(sample_type, start, end),
    }
}

/// Returns `Some(stage)` for a specific sleep-stage variant, `Some(None)`-
/// shaped as "match everything" for `sleepAnalysis`, or `None` for non-sleep
/// types. Modeled as an `Option<Option<HealthDataType>>` would be awkward, so
/// this returns an `Option<SleepFilter>` enum instead.
fn sleep_stage_filter(sample_type: HealthDataType) -> Option<SleepFilter> {
    match sample_type {
        HealthDataType::SleepAnalysis => Some(SleepFilter::All),
        HealthDataType::SleepInBed => Some(SleepFilter::Stage(HealthDataType::SleepInBed)),
        HealthDataType::SleepAsleep => Some(SleepFilter::Stage(HealthDataType::SleepAsleep)),
        HealthDataType::SleepAwake => Some(SleepFilter::Stage(HealthDataType::SleepAwake)),
        HealthDataType::SleepRem => Some(SleepFilter::Stage(HealthDataType::SleepRem)),
        HealthDataType::SleepCore => Some(SleepFilter::Stage(HealthDataType::SleepCore)),
        HealthDataType::SleepDeep => Some(SleepFilter::Stage(HealthDataType::SleepDeep)),
        _ => None,
    }
}

enum SleepFilter {
    All,
    Stage(HealthDataType),
}

fn synthesize_sleep(filter: SleepFilter, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<HealthSample> {
    let mut samples = Vec::new();
    let mut cursor = start;
    let mut stage_idx = 0usize;
    let stage_len = ChronoDuration::minutes(30);
    while cursor < end && samples.len() < MAX_SAMPLES_PER_TYPE {
        let stage = SLEEP_CYCLE[stage_idx % SLEEP_CYCLE.len()];
        let segment_end = (cursor + stage_len).min(end);
        let matches = match filter {
            SleepFilter::All => true,
            SleepFilter::Stage(wanted) => wanted == stage,
        };
        if matches {
            samples.push(HealthSample {
                id: Uuid::new_v4(),
                sample_type: match filter {
                    SleepFilter::All => HealthDataType::SleepAnalysis,
                    SleepFilter::Stage(wanted) => wanted,
                },
                value: (segment_end - cursor).num_minutes() as f64,
                unit: "min".to_string(),
                start: cursor,
                end: segment_end,
                source: "Simulated".to_string(),
                metadata: Some(HashMap::from([("stage".to_string(), stage_label(stage))])),
            });
        }
        cursor = segment_end;
        stage_idx += 1;
    }
    samples
}

fn stage_label(stage: HealthDataType) -> String {
    match stage {
        HealthDataType::SleepInBed => "inBed",
        HealthDataType::SleepAsleep => "asleep",
        HealthDataType::SleepAwake => "awake",
        HealthDataType::SleepRem => "rem",
        HealthDataType::SleepCore => "core",
        HealthDataType::SleepDeep => "deep",
        _ => "unknown",
    }
    .to_string()
}

/// Folds duration and optional totals into metadata rather than the scalar
/// value: a workout's "value" alone can't carry energy and distance, so both
/// ride along as metadata strings.
fn synthesize_workouts(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<HealthSample> {
    let mut samples = Vec::new();
    let mut cursor = start;
    let workout_len = ChronoDuration::minutes(45);
    let gap = ChronoDuration::hours(6);
    let mut i: u64 = 0;
    while cursor + workout_len <= end && samples.len() < MAX_SAMPLES_PER_TYPE {
        let workout_end = cursor + workout_len;
        let energy_kcal = 180.0 + (i % 5) as f64 * 40.0;
        let distance_km = 2.0 + (i % 3) as f64 * 1.5;
        samples.push(HealthSample {
            id: Uuid::new_v4(),
            sample_type: HealthDataType::Workouts,
            value: 1.0,
            unit: "count".to_string(),
            start: cursor,
            end: workout_end,
            source: "Simulated".to_string(),
            metadata: Some(HashMap::from([
                ("durationMinutes".to_string(), workout_len.num_minutes().to_string()),
                ("energyKcal".to_string(), format!("{energy_kcal:.1}")),
                ("distanceKm".to_string(), format!("{distance_km:.2}")),
            ])),
        });
        cursor = workout_end + gap;
        i += 1;
    }
    samples
}

fn synthesize_scalar(sample_type: HealthDataType, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<HealthSample> {
    let mut samples = Vec::new();
    let mut cursor = start;
    let step = ChronoDuration::minutes(SAMPLE_INTERVAL_MINUTES);
    let mut i: u64 = 0;
    while cursor < end && samples.len() < MAX_SAMPLES_PER_TYPE {
        let segment_end = (cursor + step).min(end);
        samples.push(HealthSample {
            id: Uuid::new_v4(),
            sample_type,
            value: base_value(sample_type) + (i % 7) as f64,
            unit: unit_for(sample_type).to_string(),
            start: cursor,
            end: segment_end,
            source: "Simulated".to_string(),
            metadata: None,
        });
        cursor = segment_end;
        i += 1;
    }
    samples
}

fn base_value(sample_type: HealthDataType) -> f64 {
    match sample_type {
        HealthDataType::StepCount => 400.0,
        HealthDataType::DistanceWalkingRunning | HealthDataType::DistanceCycling => 0.8,
        HealthDataType::ActiveEnergyBurned | HealthDataType::BasalEnergyBurned => 60.0,
        HealthDataType::ExerciseMinutes => 12.0,
        HealthDataType::StandHours => 1.0,
        HealthDataType::FlightsClimbed => 2.0,
        HealthDataType::HeartRate | HealthDataType::RestingHeartRate | HealthDataType::WalkingHeartRateAverage => 68.0,
        HealthDataType::HeartRateVariability => 42.0,
        HealthDataType::BloodPressureSystolic => 118.0,
        HealthDataType::BloodPressureDiastolic => 76.0,
        HealthDataType::BloodOxygen => 97.0,
        HealthDataType::RespiratoryRate => 14.0,
        HealthDataType::BodyTemperature => 36.6,
        HealthDataType::Vo2Max => 38.0,
        HealthDataType::Weight => 70.0,
        HealthDataType::Height => 175.0,
        HealthDataType::BodyMassIndex => 22.5,
        HealthDataType::BodyFatPercentage => 18.0,
        HealthDataType::LeanBodyMass => 57.0,
        _ => 1.0,
    }
}

fn unit_for(sample_type: HealthDataType) -> &'static str {
    match sample_type {
        HealthDataType::StepCount | HealthDataType::FlightsClimbed => "count",
        HealthDataType::DistanceWalkingRunning | HealthDataType::DistanceCycling => "km",
        HealthDataType::ActiveEnergyBurned | HealthDataType::BasalEnergyBurned => "kcal",
        HealthDataType::ExerciseMinutes | HealthDataType::StandHours => "min",
        HealthDataType::HeartRate
        | HealthDataType::RestingHeartRate
        | HealthDataType::WalkingHeartRateAverage => "bpm",
        HealthDataType::HeartRateVariability => "ms",
        HealthDataType::BloodPressureSystolic | HealthDataType::BloodPressureDiastolic => "mmHg",
        HealthDataType::BloodOxygen | HealthDataType::BodyFatPercentage => "%",
        HealthDataType::RespiratoryRate => "breaths/min",
        HealthDataType::BodyTemperature => "degC",
        HealthDataType::Vo2Max => "mL/kg/min",
        HealthDataType::Weight | HealthDataType::LeanBodyMass => "kg",
        HealthDataType::Height => "cm",
        HealthDataType::BodyMassIndex => "index",
        _ => "unit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(n: i64) -> ChronoDuration {
        ChronoDuration::hours(n)
    }

    #[tokio::test]
    async fn fetch_samples_sorts_descending_by_start() {
        let provider = SimulatedHealthProvider::new();
        let end = Utc::now();
        let start = end - hours(6);
        let response = provider
            .fetch_samples(&[HealthDataType::StepCount], start, end, 1000, 0)
            .await;
        let starts: Vec<_> = response.samples.iter().map(|s| s.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(starts, sorted);
    }

    #[tokio::test]
    async fn unavailable_provider_returns_error_kind() {
        let provider = SimulatedHealthProvider::new();
        provider.set_unavailable(true);
        let end = Utc::now();
        let response = provider
            .fetch_samples(&[HealthDataType::StepCount], end - hours(1), end, 10, 0)
            .await;
        assert_eq!(response.status, HealthDataStatus::Error);
        assert_eq!(response.message.as_deref(), Some("Health data is unavailable"));
    }

    #[tokio::test]
    async fn sleep_variant_filters_to_single_stage() {
        let provider = SimulatedHealthProvider::new();
        let end = Utc::now();
        let start = end - hours(8);
        let response = provider
            .fetch_samples(&[HealthDataType::SleepRem], start, end, 1000, 0)
            .await;
        assert!(response.samples.iter().all(|s| s.sample_type == HealthDataType::SleepRem));
        assert!(!response.samples.is_empty());
    }

    #[tokio::test]
    async fn sleep_analysis_returns_all_stages() {
        let provider = SimulatedHealthProvider::new();
        let end = Utc::now();
        let start = end - hours(8);
        let response = provider
            .fetch_samples(&[HealthDataType::SleepAnalysis], start, end, 1000, 0)
            .await;
        assert!(response
            .samples
            .iter()
            .all(|s| s.sample_type == HealthDataType::SleepAnalysis));
        assert!(response.samples.len() > 5);
    }

    #[tokio::test]
    async fn workouts_fold_totals_into_metadata() {
        let provider = SimulatedHealthProvider::new();
        let end = Utc::now();
        let start = end - hours(24);
        let response = provider
            .fetch_samples(&[HealthDataType::Workouts], start, end, 1000, 0)
            .await;
        assert!(!response.samples.is_empty());
        for sample in &response.samples {
            let metadata = sample.metadata.as_ref().unwrap();
            assert!(metadata.contains_key("durationMinutes"));
            assert!(metadata.contains_key("energyKcal"));
        }
    }

    #[tokio::test]
    async fn limit_and_offset_paginate_and_report_has_more() {
        let provider = SimulatedHealthProvider::new();
        let end = Utc::now();
        let start = end - hours(20);
        let first_page = provider
            .fetch_samples(&[HealthDataType::StepCount], start, end, 2, 0)
            .await;
        assert_eq!(first_page.returned_count, 2);
        assert!(first_page.has_more);
    }
}
