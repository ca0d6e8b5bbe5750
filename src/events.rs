use crate::error::JResult;
use crate::measurement::{BodyMeasurements, ScanKind};
use serde_json::json;

/// Notifications pushed to the host outside the request/reply flow
#[derive(Debug, Clone, PartialEq)]
pub enum ArEvent {
    SessionStarted,
    SessionStopped,
    MeasurementUpdate(BodyMeasurements),
    ScanCompleted(ScanKind),
}

impl ArEvent {
    /// Event name the host application listens for
    pub fn name(&self) -> &'static str {
        match self {
            ArEvent::SessionStarted => "onARSessionStarted",
            ArEvent::SessionStopped => "onARSessionStopped",
            ArEvent::MeasurementUpdate(_) => "onARMeasurementUpdate",
            ArEvent::ScanCompleted(_) => "onARScanCompleted",
        }
    }

    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        let payload = match self {
            ArEvent::SessionStarted => json!({ "isActive": true }),
            ArEvent::SessionStopped => json!({ "isActive": false }),
            ArEvent::MeasurementUpdate(m) => serde_json::to_value(m)?,
            ArEvent::ScanCompleted(kind) => json!({ "scanType": kind }),
        };
        serde_json::to_string(&payload)
    }
}

/// Destination for [`ArEvent`]s
pub trait EventSink {
    fn emit(&self, event: &ArEvent) -> JResult<()>;
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &ArEvent) -> JResult<()> {
        Ok(())
    }
}
