use crate::gateway::SessionState;
use crate::measurement::ScanStatus;
use serde::{Deserialize, Serialize};

/// Descriptive answer to a body-tracking support query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub supported: bool,
    pub available: bool,
    pub reason: String,
    pub platform_version: i32,
    pub engine_version: String,
}

impl CapabilityReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Snapshot of the gateway's session flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub is_active: bool,
    pub has_valid_measurements: bool,
    pub body_count: u32,
    pub retry_count: u32,
    pub front_scan_completed: bool,
    pub side_scan_completed: bool,
    pub scan_status: ScanStatus,
}

impl StatusReport {
    pub fn for_state(state: SessionState) -> Self {
        let active = state == SessionState::Active;
        StatusReport {
            is_active: active,
            has_valid_measurements: active,
            body_count: if active { 1 } else { 0 },
            retry_count: 0,
            front_scan_completed: active,
            side_scan_completed: false,
            scan_status: if active {
                ScanStatus::Active
            } else {
                ScanStatus::Inactive
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
