//! types/indicators.rs
//!
//! Defines the IndicatorSample struct, the Normal/Warning category
//! classification against the fixed reference ranges, and the AlertRecord
//! entries kept in the session's alert history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive reference range for body temperature, °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (35.0, 37.0);
/// Inclusive reference range for heart rate, bpm.
pub const HEARTRATE_RANGE: (i32, i32) = (60, 100);
/// Inclusive reference range for blood oxygen saturation, percent.
pub const SPO2_RANGE: (i32, i32) = (96, 100);

/// One timestamped reading of heartrate, temperature and SpO2 for a patient.
///
/// Wire format matches the backend DTO (camelCase field names).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSample {
    pub heartrate: i32,
    pub temperature: f64,
    pub spo2: i32,
    pub patient_id: i64,
    pub timestamp: DateTime<Utc>,
}

impl IndicatorSample {
    pub fn new(heartrate: i32, temperature: f64, spo2: i32, patient_id: i64) -> Self {
        Self {
            heartrate,
            temperature,
            spo2,
            patient_id,
            timestamp: Utc::now(),
        }
    }
}

/// Classification of a sample against the reference ranges.
///
/// Intentionally binary: a sample is Normal only when every indicator is
/// inside its (inclusive) range, otherwise Warning. There are no
/// intermediate severity tiers on the monitoring side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Normal,
    Warning,
}

impl Category {
    /// Classify a sample. Pure function; boundary values are Normal.
    pub fn of(sample: &IndicatorSample) -> Category {
        let temperature_normal = sample.temperature >= TEMPERATURE_RANGE.0
            && sample.temperature <= TEMPERATURE_RANGE.1;
        let heartrate_normal =
            sample.heartrate >= HEARTRATE_RANGE.0 && sample.heartrate <= HEARTRATE_RANGE.1;
        let spo2_normal = sample.spo2 >= SPO2_RANGE.0 && sample.spo2 <= SPO2_RANGE.1;

        if temperature_normal && heartrate_normal && spo2_normal {
            Category::Normal
        } else {
            Category::Warning
        }
    }

    /// Short human-readable status line for this category.
    pub fn description(self) -> &'static str {
        match self {
            Category::Normal => "All indicators within normal range",
            Category::Warning => "Requires a doctor's attention",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Normal => write!(f, "Normal"),
            Category::Warning => write!(f, "Warning"),
        }
    }
}

/// Compose the alert message for a Warning sample: one clause per violated
/// bound, each citing the out-of-range value and the reference range.
/// Returns None for Normal samples.
pub fn alert_message(sample: &IndicatorSample) -> Option<String> {
    let mut clauses = Vec::new();

    if sample.temperature < TEMPERATURE_RANGE.0 {
        clauses.push(format!(
            "Low temperature: {}°C (normal: {:.1}-{:.1}°C)",
            sample.temperature, TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1
        ));
    } else if sample.temperature > TEMPERATURE_RANGE.1 {
        clauses.push(format!(
            "High temperature: {}°C (normal: {:.1}-{:.1}°C)",
            sample.temperature, TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1
        ));
    }

    if sample.heartrate < HEARTRATE_RANGE.0 {
        clauses.push(format!(
            "Low heart rate: {} bpm (normal: {}-{} bpm)",
            sample.heartrate, HEARTRATE_RANGE.0, HEARTRATE_RANGE.1
        ));
    } else if sample.heartrate > HEARTRATE_RANGE.1 {
        clauses.push(format!(
            "High heart rate: {} bpm (normal: {}-{} bpm)",
            sample.heartrate, HEARTRATE_RANGE.0, HEARTRATE_RANGE.1
        ));
    }

    if sample.spo2 < SPO2_RANGE.0 {
        clauses.push(format!(
            "Low SpO2: {}% (normal: {}-{}%)",
            sample.spo2, SPO2_RANGE.0, SPO2_RANGE.1
        ));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(". "))
    }
}

/// One entry in the session's alert history. Created only for Warning
/// samples; the category is always the one derived from `sample`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub sample: IndicatorSample,
    pub message: String,
}

impl AlertRecord {
    /// Build the history entry for a non-Normal sample.
    /// Returns None when the sample classifies as Normal.
    pub fn for_sample(sample: &IndicatorSample) -> Option<AlertRecord> {
        let category = Category::of(sample);
        if category == Category::Normal {
            return None;
        }
        let message = alert_message(sample).unwrap_or_default();
        Some(AlertRecord {
            timestamp: sample.timestamp,
            category,
            sample: sample.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(heartrate: i32, temperature: f64, spo2: i32) -> IndicatorSample {
        IndicatorSample::new(heartrate, temperature, spo2, 1001)
    }

    #[test]
    fn test_normal_sample_classification() {
        let s = sample(72, 36.6, 99);
        assert_eq!(Category::of(&s), Category::Normal);
        assert!(alert_message(&s).is_none());
        assert!(AlertRecord::for_sample(&s).is_none());
    }

    #[test]
    fn test_boundary_values_are_normal() {
        assert_eq!(Category::of(&sample(60, 35.0, 96)), Category::Normal);
        assert_eq!(Category::of(&sample(100, 37.0, 100)), Category::Normal);
    }

    #[test]
    fn test_just_outside_boundary_is_warning() {
        assert_eq!(Category::of(&sample(72, 34.9, 99)), Category::Warning);
        assert_eq!(Category::of(&sample(72, 37.1, 99)), Category::Warning);
        assert_eq!(Category::of(&sample(59, 36.6, 99)), Category::Warning);
        assert_eq!(Category::of(&sample(101, 36.6, 99)), Category::Warning);
        assert_eq!(Category::of(&sample(72, 36.6, 95)), Category::Warning);
    }

    #[test]
    fn test_single_violation_yields_warning() {
        let s = sample(72, 38.4, 99);
        assert_eq!(Category::of(&s), Category::Warning);
        let message = alert_message(&s).unwrap();
        assert!(message.contains("High temperature"));
        assert!(!message.contains("heart rate"));
        assert!(!message.contains("SpO2"));
    }

    #[test]
    fn test_multiple_violations_all_reported() {
        // Critical scenario: bradycardia + fever + hypoxemia.
        let s = sample(45, 39.2, 88);
        assert_eq!(Category::of(&s), Category::Warning);
        let message = alert_message(&s).unwrap();
        assert!(message.contains("High temperature: 39.2°C"));
        assert!(message.contains("Low heart rate: 45 bpm"));
        assert!(message.contains("Low SpO2: 88%"));
        assert_eq!(message.matches(" (normal: ").count(), 3);
    }

    #[test]
    fn test_low_temperature_clause() {
        let message = alert_message(&sample(72, 34.2, 99)).unwrap();
        assert!(message.contains("Low temperature: 34.2°C"));
        assert!(message.contains("35.0-37.0"));
    }

    #[test]
    fn test_alert_record_carries_sample_and_message() {
        let s = sample(110, 36.6, 99);
        let record = AlertRecord::for_sample(&s).unwrap();
        assert_eq!(record.category, Category::Warning);
        assert_eq!(record.timestamp, s.timestamp);
        assert_eq!(record.sample.heartrate, 110);
        assert!(record.message.contains("High heart rate: 110 bpm"));
    }

    #[test]
    fn test_wire_format_field_names() {
        let s = sample(75, 36.8, 98);
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("patientId").is_some());
        assert!(json.get("heartrate").is_some());
        assert!(json.get("spo2").is_some());

        let parsed: IndicatorSample = serde_json::from_value(serde_json::json!({
            "heartrate": 75,
            "temperature": 36.8,
            "spo2": 98,
            "patientId": 12345,
            "timestamp": "2025-01-15T10:30:00Z"
        }))
        .unwrap();
        assert_eq!(parsed.patient_id, 12345);
    }
}
