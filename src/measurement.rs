use crate::engine::Frame;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const REASON_NOT_ACTIVE: &str = "AR session not active";
pub const REASON_NO_FRAME: &str = "No frame available";
pub const REASON_NOT_TRACKING: &str = "Camera not tracking";

/// Scan progress reported alongside measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Scanning,
    Active,
    Inactive,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Scanning => "scanning",
            ScanStatus::Active => "active",
            ScanStatus::Inactive => "inactive",
        }
    }
}

/// Scan pass named by the host when it marks a scan completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    Front,
    Side,
    Other(String),
}

impl ScanKind {
    pub fn parse(scan_type: &str) -> Self {
        match scan_type.trim().to_ascii_lowercase().as_str() {
            "front" => ScanKind::Front,
            "side" => ScanKind::Side,
            _ => ScanKind::Other(scan_type.to_string()),
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanKind::Front => f.write_str("front"),
            ScanKind::Side => f.write_str("side"),
            ScanKind::Other(name) => f.write_str(name),
        }
    }
}

impl Serialize for ScanKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Raw body estimate for a tracked frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyEstimate {
    pub shoulder_width_cm: f64,
    pub height_cm: f64,
    pub confidence: f64,
}

impl BodyEstimate {
    pub fn new(shoulder_width_cm: f64, height_cm: f64, confidence: f64) -> Self {
        Self {
            shoulder_width_cm,
            height_cm,
            confidence,
        }
    }
}

/// A valid measurement, as delivered to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyMeasurements {
    pub shoulder_width_cm: f64,
    pub height_cm: f64,
    pub confidence: f64,
    pub timestamp_millis: i64,
    pub front_scan_completed: bool,
    pub side_scan_completed: bool,
    pub scan_status: ScanStatus,
}

impl BodyMeasurements {
    /// Stamp an estimate with the capture time and the scan flags.
    pub fn from_estimate(estimate: BodyEstimate, timestamp_millis: i64) -> Self {
        Self {
            shoulder_width_cm: estimate.shoulder_width_cm,
            height_cm: estimate.height_cm,
            confidence: estimate.confidence,
            timestamp_millis,
            front_scan_completed: true,
            side_scan_completed: false,
            scan_status: ScanStatus::Scanning,
        }
    }
}

/// Result of a measurement query
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementSample {
    Invalid { reason: &'static str },
    Valid(BodyMeasurements),
}

impl MeasurementSample {
    pub fn not_active() -> Self {
        MeasurementSample::Invalid {
            reason: REASON_NOT_ACTIVE,
        }
    }

    pub fn no_frame() -> Self {
        MeasurementSample::Invalid {
            reason: REASON_NO_FRAME,
        }
    }

    pub fn not_tracking() -> Self {
        MeasurementSample::Invalid {
            reason: REASON_NOT_TRACKING,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, MeasurementSample::Valid(_))
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            MeasurementSample::Invalid { reason } => Some(*reason),
            MeasurementSample::Valid(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Flat wire shape: {valid:false, reason} or {valid:true, ...measurements}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SampleWire<'a> {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(flatten)]
    measurements: Option<&'a BodyMeasurements>,
}

impl Serialize for MeasurementSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            MeasurementSample::Invalid { reason } => SampleWire {
                valid: false,
                reason: Some(*reason),
                measurements: None,
            },
            MeasurementSample::Valid(m) => SampleWire {
                valid: true,
                reason: None,
                measurements: Some(m),
            },
        };
        wire.serialize(serializer)
    }
}

/// Turns a tracked frame into body measurements
pub trait MeasurementEstimator {
    fn estimate(&self, frame: &Frame) -> BodyEstimate;
}

/// Fixed mid-range values standing in for body tracking
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEstimator;

impl MeasurementEstimator for PlaceholderEstimator {
    fn estimate(&self, _frame: &Frame) -> BodyEstimate {
        // TODO: replace with landmark-based estimation once body tracking lands in the engine wrapper
        BodyEstimate::new(50.0, 180.0, 0.9)
    }
}
