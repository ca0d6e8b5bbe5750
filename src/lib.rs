// AR Session Bridge Android JNI Library
// Exposes the AR session lifecycle gateway to the Kotlin host module via JNI

pub mod android_jni;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod measurement;
pub mod report;

#[cfg(test)]
mod testing;

pub use config::BridgeConfig;
pub use engine::{ArEngine, ArSession, Availability, Frame, SessionConfig, TrackingState};
pub use error::{BridgeError, EngineError, JResult};
pub use events::{ArEvent, EventSink};
pub use gateway::{SessionGateway, SessionState};
pub use measurement::{BodyMeasurements, MeasurementEstimator, MeasurementSample, ScanStatus};
pub use report::{CapabilityReport, StatusReport};

/// Logcat tag for everything this library logs
pub const LOG_TAG: &str = "ARSessionManager";

/// Route `log` records to logcat. Safe to call more than once.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        // Err only means a logger is already installed.
        let _ = android_log::init(LOG_TAG);
    }
}
