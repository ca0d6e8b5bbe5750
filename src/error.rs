use jni::objects::JValue;
use jni::JNIEnv;
use std::fmt;
use thiserror::Error;

/// Java class thrown for every classified bridge failure.
pub const BRIDGE_EXCEPTION_CLASS: &str = "com/fitform/arbodymeasurements/ArBridgeException";

/// Failures reported by an AR engine implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("ARCore is not installed")]
    NotInstalled,

    #[error("ARCore APK is too old")]
    ApkTooOld,

    #[error("ARCore SDK is too old")]
    SdkTooOld,

    #[error("Device is not compatible with ARCore")]
    DeviceNotCompatible,

    #[error("User declined ARCore installation")]
    UserDeclinedInstallation,

    #[error("Camera is not available: {0}")]
    CameraNotAvailable(String),

    #[error("{0}")]
    Other(String),
}

/// Gateway operation a generic failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CheckSupport,
    StartSession,
    StopSession,
    Measurements,
    Status,
    MarkScanCompleted,
}

impl Operation {
    fn code(self) -> &'static str {
        match self {
            Operation::CheckSupport => "ARCore_CHECK_ERROR",
            Operation::StartSession => "SESSION_START_ERROR",
            Operation::StopSession => "SESSION_STOP_ERROR",
            Operation::Measurements => "MEASUREMENTS_ERROR",
            Operation::Status => "STATUS_ERROR",
            Operation::MarkScanCompleted => "SCAN_COMPLETE_ERROR",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Operation::CheckSupport => "check ARCore support",
            Operation::StartSession => "start AR session",
            Operation::StopSession => "stop AR session",
            Operation::Measurements => "get measurements",
            Operation::Status => "get session status",
            Operation::MarkScanCompleted => "mark scan completed",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Classified failures surfaced to the host application
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("ARCore is not available: {0}")]
    EngineUnavailable(String),

    #[error("ARCore is not installed on this device")]
    EngineNotInstalled,

    #[error("ARCore APK is too old, please update")]
    EngineApkTooOld,

    #[error("ARCore SDK is too old, please update")]
    EngineSdkTooOld,

    #[error("This device is not compatible with ARCore")]
    DeviceIncompatible,

    #[error("Failed to create AR session")]
    SessionCreationFailed,

    #[error("ARCore configuration not supported on this device")]
    ConfigurationNotSupported,

    #[error("Camera is not available: {0}")]
    CameraUnavailable(String),

    #[error("Failed to {operation}: {message}")]
    Failed { operation: Operation, message: String },

    #[error("JNI error: {0}")]
    Jni(String),
}

impl BridgeError {
    pub fn failed(operation: Operation, message: impl Into<String>) -> Self {
        BridgeError::Failed {
            operation,
            message: message.into(),
        }
    }

    /// Stable code the host rejects its promise with
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::EngineUnavailable(_) => "ARCore_UNAVAILABLE",
            BridgeError::EngineNotInstalled => "ARCore_NOT_INSTALLED",
            BridgeError::EngineApkTooOld => "ARCore_APK_TOO_OLD",
            BridgeError::EngineSdkTooOld => "ARCore_SDK_TOO_OLD",
            BridgeError::DeviceIncompatible => "DEVICE_NOT_COMPATIBLE",
            BridgeError::SessionCreationFailed => "SESSION_CREATION_FAILED",
            BridgeError::ConfigurationNotSupported => "CONFIG_NOT_SUPPORTED",
            BridgeError::CameraUnavailable(_) => "CAMERA_NOT_AVAILABLE",
            BridgeError::Failed { operation, .. } => operation.code(),
            BridgeError::Jni(_) => "JNI_ERROR",
        }
    }

    /// Classify an engine failure raised while starting a session.
    pub(crate) fn from_session_start(err: EngineError) -> Self {
        match err {
            EngineError::NotInstalled => BridgeError::EngineNotInstalled,
            EngineError::ApkTooOld => BridgeError::EngineApkTooOld,
            EngineError::SdkTooOld => BridgeError::EngineSdkTooOld,
            EngineError::DeviceNotCompatible => BridgeError::DeviceIncompatible,
            other => BridgeError::failed(Operation::StartSession, other.to_string()),
        }
    }

    /// Classify an engine failure raised while fetching a frame.
    pub(crate) fn from_frame_request(err: EngineError) -> Self {
        match err {
            EngineError::CameraNotAvailable(msg) => BridgeError::CameraUnavailable(msg),
            other => BridgeError::failed(Operation::Measurements, other.to_string()),
        }
    }
}

impl From<jni::errors::Error> for BridgeError {
    fn from(err: jni::errors::Error) -> Self {
        BridgeError::Jni(err.to_string())
    }
}

/// Result type for bridge operations
pub type JResult<T> = Result<T, BridgeError>;

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &BridgeError) -> JResult<()> {
    if env.exception_check()? {
        // An exception is already pending; throwing again would replace it.
        return Ok(());
    }

    let message = error.to_string();
    if throw_bridge_exception(env, error.code(), &message).is_err() {
        // The bridge exception class may be missing from a stripped host build.
        let _ = env.exception_clear();
        env.throw_new("java/lang/RuntimeException", format!("[{}] {}", error.code(), message))
            .map_err(|_| BridgeError::Jni("Failed to throw exception".to_string()))?;
    }

    Ok(())
}

fn throw_bridge_exception(env: &mut JNIEnv, code: &str, message: &str) -> jni::errors::Result<()> {
    let code = env.new_string(code)?;
    let message = env.new_string(message)?;
    let exception = env.new_object(
        BRIDGE_EXCEPTION_CLASS,
        "(Ljava/lang/String;Ljava/lang/String;)V",
        &[JValue::from(&code), JValue::from(&message)],
    )?;
    env.throw(jni::objects::JThrowable::from(exception))
}
