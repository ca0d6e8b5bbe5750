//! Seam between the gateway and the AR engine.
//!
//! The gateway never talks to ARCore directly. It goes through [`ArEngine`]
//! (availability probe and session construction) and [`ArSession`] (configure,
//! frame updates and release), so the lifecycle logic runs against a scripted
//! engine in tests and against the Kotlin-side ARCore wrapper on device.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device availability reported by the engine's compatibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    UnknownError,
    UnknownChecking,
    UnknownTimedOut,
    UnsupportedDeviceNotCapable,
    SupportedNotInstalled,
    SupportedApkTooOld,
    SupportedInstalled,
}

impl Availability {
    pub const ALL: [Availability; 7] = [
        Availability::UnknownError,
        Availability::UnknownChecking,
        Availability::UnknownTimedOut,
        Availability::UnsupportedDeviceNotCapable,
        Availability::SupportedNotInstalled,
        Availability::SupportedApkTooOld,
        Availability::SupportedInstalled,
    ];

    /// Installed, or installed with an outdated APK.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Availability::SupportedInstalled | Availability::SupportedApkTooOld
        )
    }

    /// Only a fully installed engine can open a session.
    pub fn can_start_session(self) -> bool {
        self == Availability::SupportedInstalled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Availability::UnknownError => "UNKNOWN_ERROR",
            Availability::UnknownChecking => "UNKNOWN_CHECKING",
            Availability::UnknownTimedOut => "UNKNOWN_TIMED_OUT",
            Availability::UnsupportedDeviceNotCapable => "UNSUPPORTED_DEVICE_NOT_CAPABLE",
            Availability::SupportedNotInstalled => "SUPPORTED_NOT_INSTALLED",
            Availability::SupportedApkTooOld => "SUPPORTED_APK_TOO_OLD",
            Availability::SupportedInstalled => "SUPPORTED_INSTALLED",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Availability::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| EngineError::Other(format!("Unknown availability value: {}", s)))
    }
}

/// Camera tracking state of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

impl FromStr for TrackingState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRACKING" => Ok(TrackingState::Tracking),
            "PAUSED" => Ok(TrackingState::Paused),
            "STOPPED" => Ok(TrackingState::Stopped),
            other => Err(EngineError::Other(format!("Unknown tracking state: {}", other))),
        }
    }
}

/// Snapshot of the latest camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub tracking_state: TrackingState,
}

impl Frame {
    pub fn new(tracking_state: TrackingState) -> Self {
        Self { tracking_state }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking_state == TrackingState::Tracking
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Auto,
    Fixed,
}

impl FocusMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FocusMode::Auto => "AUTO",
            FocusMode::Fixed => "FIXED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    LatestCameraImage,
    Blocking,
}

impl UpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateMode::LatestCameraImage => "LATEST_CAMERA_IMAGE",
            UpdateMode::Blocking => "BLOCKING",
        }
    }
}

/// Session configuration applied on start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub focus_mode: FocusMode,
    pub update_mode: UpdateMode,
}

impl SessionConfig {
    /// The only configuration the gateway ever applies.
    pub const BODY_TRACKING: SessionConfig = SessionConfig {
        focus_mode: FocusMode::Auto,
        update_mode: UpdateMode::LatestCameraImage,
    };
}

/// Live engine session owned by the gateway while active
pub trait ArSession {
    fn is_supported(&self, config: &SessionConfig) -> Result<bool, EngineError>;

    fn configure(&mut self, config: &SessionConfig) -> Result<(), EngineError>;

    /// Latest frame, or `None` if the engine has none yet.
    fn update(&mut self) -> Result<Option<Frame>, EngineError>;

    /// Release the engine session. Consumes the handle even on failure.
    fn close(self) -> Result<(), EngineError>;
}

/// AR engine capability interface
pub trait ArEngine {
    type Session: ArSession;

    fn check_availability(&self) -> Result<Availability, EngineError>;

    /// Construct a new session. `Ok(None)` means the engine produced no session
    /// object without raising an error.
    fn create_session(&self) -> Result<Option<Self::Session>, EngineError>;

    /// Host OS API level reported in capability reports.
    fn platform_version(&self) -> i32;
}
