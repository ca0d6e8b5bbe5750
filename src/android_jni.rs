use crate::config::BridgeConfig;
use crate::engine::{ArEngine, ArSession, Availability, Frame, SessionConfig, TrackingState};
use crate::error::{throw_java_exception, BridgeError, EngineError, JResult, Operation};
use crate::events::{ArEvent, EventSink};
use crate::gateway::SessionGateway;
use jni::objects::{GlobalRef, JClass, JObject, JString, JThrowable, JValue, JValueOwned};
use jni::sys::{jboolean, jint, jlong, jstring, JNI_FALSE, JNI_TRUE, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use log::{error, info};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

const ARCORE_EXCEPTIONS: &str = "com/google/ar/core/exceptions/";

/// Gateway type owned by the Kotlin `ArSessionBridge`
pub type BridgeGateway = SessionGateway<JniEngine>;

/// Kotlin-side engine wrapper reached through JNI
struct JniBridge {
    vm: JavaVM,
    engine: GlobalRef,
}

impl JniBridge {
    fn new(env: &mut JNIEnv, engine: &JObject) -> JResult<Self> {
        if engine.is_null() {
            return Err(BridgeError::Jni("Engine object is null".to_string()));
        }
        Ok(JniBridge {
            vm: env.get_java_vm()?,
            engine: env.new_global_ref(engine)?,
        })
    }

    /// Run `f` on an attached thread, classifying any Java exception it raises.
    fn with_env<T>(
        &self,
        f: impl FnOnce(&mut JNIEnv) -> jni::errors::Result<T>,
    ) -> Result<T, EngineError> {
        let mut guard = self
            .vm
            .attach_current_thread()
            .map_err(|e| EngineError::Other(format!("Failed to attach JNI thread: {}", e)))?;
        let env: &mut JNIEnv = &mut guard;

        match f(env) {
            Ok(value) => Ok(value),
            Err(jni::errors::Error::JavaException) => Err(take_exception(env)),
            Err(e) => Err(EngineError::Other(e.to_string())),
        }
    }
}

fn java_string(env: &mut JNIEnv, obj: JObject) -> jni::errors::Result<String> {
    let s = JString::from(obj);
    let text: String = env.get_string(&s)?.into();
    Ok(text)
}

/// Clear the pending exception and map its class to an engine error.
fn take_exception(env: &mut JNIEnv) -> EngineError {
    let throwable = match env.exception_occurred() {
        Ok(t) if !t.is_null() => t,
        _ => return EngineError::Other("Unknown Java exception".to_string()),
    };
    let _ = env.exception_clear();
    classify_exception(env, &throwable)
}

fn classify_exception(env: &mut JNIEnv, throwable: &JThrowable) -> EngineError {
    let message = describe_throwable(env, throwable);
    let known = [
        ("UnavailableArcoreNotInstalledException", EngineError::NotInstalled),
        ("UnavailableApkTooOldException", EngineError::ApkTooOld),
        ("UnavailableSdkTooOldException", EngineError::SdkTooOld),
        ("UnavailableDeviceNotCompatibleException", EngineError::DeviceNotCompatible),
        (
            "UnavailableUserDeclinedInstallationException",
            EngineError::UserDeclinedInstallation,
        ),
        (
            "CameraNotAvailableException",
            EngineError::CameraNotAvailable(message.clone()),
        ),
    ];

    for (name, err) in known {
        let class = format!("{}{}", ARCORE_EXCEPTIONS, name);
        let matched = env.is_instance_of(throwable, class.as_str()).unwrap_or_else(|_| {
            // Missing class leaves a NoClassDefFoundError pending.
            let _ = env.exception_clear();
            false
        });
        if matched {
            return err;
        }
    }
    EngineError::Other(message)
}

fn describe_throwable(env: &mut JNIEnv, throwable: &JThrowable) -> String {
    let described = env
        .call_method(throwable, "toString", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l());
    match described {
        Ok(obj) if !obj.is_null() => {
            java_string(env, obj).unwrap_or_else(|_| "Java exception".to_string())
        }
        _ => {
            let _ = env.exception_clear();
            "Java exception".to_string()
        }
    }
}

/// [`ArEngine`] backed by the Kotlin ARCore wrapper
pub struct JniEngine {
    bridge: Arc<JniBridge>,
}

impl ArEngine for JniEngine {
    type Session = JniSession;

    fn check_availability(&self) -> Result<Availability, EngineError> {
        let name = self.bridge.with_env(|env| {
            let obj = env
                .call_method(&self.bridge.engine, "checkAvailability", "()Ljava/lang/String;", &[])?
                .l()?;
            java_string(env, obj)
        })?;
        name.parse()
    }

    fn create_session(&self) -> Result<Option<JniSession>, EngineError> {
        let handle = self.bridge.with_env(|env| {
            let obj = env
                .call_method(&self.bridge.engine, "createSession", "()Ljava/lang/Object;", &[])?
                .l()?;
            if obj.is_null() {
                return Ok(None);
            }
            env.new_global_ref(obj).map(Some)
        })?;

        Ok(handle.map(|handle| JniSession {
            bridge: Arc::clone(&self.bridge),
            handle,
        }))
    }

    fn platform_version(&self) -> i32 {
        self.bridge
            .with_env(|env| {
                env.call_method(&self.bridge.engine, "platformVersion", "()I", &[])?
                    .i()
            })
            .unwrap_or_else(|e| {
                error!("Failed to read platform version: {}", e);
                0
            })
    }
}

/// Engine session held as a global reference to the Kotlin-side object
pub struct JniSession {
    bridge: Arc<JniBridge>,
    handle: GlobalRef,
}

impl JniSession {
    /// Call `method(session, focusMode, updateMode)` on the engine wrapper.
    fn call_with_config<T>(
        &self,
        method: &str,
        sig: &str,
        config: &SessionConfig,
        read: impl FnOnce(JValueOwned<'_>) -> jni::errors::Result<T>,
    ) -> Result<T, EngineError> {
        self.bridge.with_env(|env| {
            let focus = env.new_string(config.focus_mode.as_str())?;
            let update = env.new_string(config.update_mode.as_str())?;
            let value = env.call_method(
                &self.bridge.engine,
                method,
                sig,
                &[
                    JValue::from(self.handle.as_obj()),
                    JValue::from(&focus),
                    JValue::from(&update),
                ],
            )?;
            read(value)
        })
    }
}

impl ArSession for JniSession {
    fn is_supported(&self, config: &SessionConfig) -> Result<bool, EngineError> {
        self.call_with_config(
            "isConfigSupported",
            "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)Z",
            config,
            |v| v.z(),
        )
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), EngineError> {
        self.call_with_config(
            "configure",
            "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V",
            config,
            |v| v.v(),
        )
    }

    fn update(&mut self) -> Result<Option<Frame>, EngineError> {
        let state = self.bridge.with_env(|env| {
            let obj = env
                .call_method(
                    &self.bridge.engine,
                    "update",
                    "(Ljava/lang/Object;)Ljava/lang/String;",
                    &[JValue::from(self.handle.as_obj())],
                )?
                .l()?;
            if obj.is_null() {
                return Ok(None);
            }
            java_string(env, obj).map(Some)
        })?;

        state
            .map(|s| s.parse::<TrackingState>().map(Frame::new))
            .transpose()
    }

    fn close(self) -> Result<(), EngineError> {
        self.bridge.with_env(|env| {
            env.call_method(
                &self.bridge.engine,
                "closeSession",
                "(Ljava/lang/Object;)V",
                &[JValue::from(self.handle.as_obj())],
            )?
            .v()
        })
    }
}

/// Forwards events to the Kotlin wrapper's `emit(name, payloadJson)`
pub struct JniEventSink {
    bridge: Arc<JniBridge>,
}

impl EventSink for JniEventSink {
    fn emit(&self, event: &ArEvent) -> JResult<()> {
        let payload = event
            .payload_json()
            .map_err(|e| BridgeError::Jni(format!("Failed to encode event payload: {}", e)))?;

        self.bridge
            .with_env(|env| {
                let name = env.new_string(event.name())?;
                let payload = env.new_string(&payload)?;
                env.call_method(
                    &self.bridge.engine,
                    "emit",
                    "(Ljava/lang/String;Ljava/lang/String;)V",
                    &[JValue::from(&name), JValue::from(&payload)],
                )?
                .v()
            })
            .map_err(|e| BridgeError::Jni(e.to_string()))
    }
}

/// Borrow the gateway behind a handle returned by `nativeCreate`.
///
/// Handle contract with the Kotlin `ArSessionBridge`: the handle is owned by
/// exactly one bridge instance, every native call on it returns before
/// `nativeDestroy` is called, `nativeDestroy` is called at most once, and the
/// bridge zeroes its handle field afterwards so later calls arrive as 0 and
/// fail with `JNI_ERROR` instead of touching freed memory.
fn gateway_ref<'a>(handle: jlong) -> JResult<&'a BridgeGateway> {
    if handle == 0 {
        return Err(BridgeError::Jni("Bridge handle is null".to_string()));
    }
    // SAFETY: non-zero handles come from `nativeCreate` and stay valid until `nativeDestroy`.
    Ok(unsafe { &*(handle as *const BridgeGateway) })
}

/// Run a bridge call, turning errors and panics into a pending Java exception.
fn run<T>(env: &mut JNIEnv, fallback: T, f: impl FnOnce(&mut JNIEnv) -> JResult<T>) -> T {
    let result = catch_unwind(AssertUnwindSafe(|| f(env)))
        .unwrap_or_else(|_| Err(BridgeError::Jni("Panic in native bridge".to_string())));

    match result {
        Ok(value) => value,
        Err(e) => {
            error!("[{}] {}", e.code(), e);
            let _ = throw_java_exception(env, &e);
            fallback
        }
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn to_jstring(env: &mut JNIEnv, value: &str) -> JResult<jstring> {
    Ok(env.new_string(value)?.into_raw())
}

#[no_mangle]
pub extern "C" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    crate::init_logging();
    info!("AR session bridge loaded");
    JNI_VERSION_1_6
}

/// JNI: Create a gateway bound to a Kotlin engine wrapper
/// Returns: opaque handle, or 0 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeCreate(
    mut env: JNIEnv,
    _class: JClass,
    engine: JObject,
    config_json: JString,
) -> jlong {
    run(&mut env, 0, |env| create_impl(env, &engine, &config_json))
}

fn create_impl(env: &mut JNIEnv, engine: &JObject, config_json: &JString) -> JResult<jlong> {
    let config = if config_json.is_null() {
        BridgeConfig::default()
    } else {
        let json: String = env.get_string(config_json)?.into();
        BridgeConfig::from_json(&json)?
    };

    let bridge = Arc::new(JniBridge::new(env, engine)?);
    let events = JniEventSink {
        bridge: Arc::clone(&bridge),
    };
    let gateway = SessionGateway::new(JniEngine { bridge }, config).with_event_sink(events);

    info!("Created {} gateway", gateway.config().module_name);
    Ok(Box::into_raw(Box::new(gateway)) as jlong)
}

/// JNI: Tear down and free a gateway (module shutdown)
///
/// Must be the last call on `handle` and made once; see [`gateway_ref`] for the
/// contract the Kotlin side upholds. A 0 handle is ignored.
#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeDestroy(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    run(&mut env, (), |_| {
        if handle != 0 {
            // SAFETY: the host calls destroy once per handle returned by `nativeCreate`.
            drop(unsafe { Box::from_raw(handle as *mut BridgeGateway) });
            info!("Gateway destroyed");
        }
        Ok(())
    })
}

/// JNI: Exported module constants as JSON
#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeGetConstants(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    run(&mut env, std::ptr::null_mut(), |env| {
        let constants = gateway_ref(handle)?.constants();
        let json = serde_json::to_string(&constants)
            .map_err(|e| BridgeError::Jni(format!("JSON serialization failed: {}", e)))?;
        to_jstring(env, &json)
    })
}

#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeIsEngineSupported(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jboolean {
    run(&mut env, JNI_FALSE, |_| {
        gateway_ref(handle)?.is_engine_supported().map(to_jboolean)
    })
}

#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeIsAlternateEngineSupported(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jboolean {
    run(&mut env, JNI_FALSE, |_| {
        Ok(to_jboolean(gateway_ref(handle)?.is_alternate_engine_supported()))
    })
}

/// JNI: Capability report as JSON
#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeIsBodyTrackingSupported(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    run(&mut env, std::ptr::null_mut(), |env| {
        let json = gateway_ref(handle)?
            .is_body_tracking_supported()
            .to_json()
            .map_err(|e| BridgeError::failed(Operation::CheckSupport, e.to_string()))?;
        to_jstring(env, &json)
    })
}

#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeStartSession(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jboolean {
    run(&mut env, JNI_FALSE, |_| {
        gateway_ref(handle)?.start_session().map(to_jboolean)
    })
}

#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeStopSession(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jboolean {
    run(&mut env, JNI_FALSE, |_| {
        gateway_ref(handle)?.stop_session().map(to_jboolean)
    })
}

/// JNI: Measurement sample as JSON
#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeGetMeasurements(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    run(&mut env, std::ptr::null_mut(), |env| {
        let json = gateway_ref(handle)?
            .get_measurements()?
            .to_json()
            .map_err(|e| BridgeError::failed(Operation::Measurements, e.to_string()))?;
        to_jstring(env, &json)
    })
}

/// JNI: Status report as JSON
#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeGetSessionStatus(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    run(&mut env, std::ptr::null_mut(), |env| {
        let json = gateway_ref(handle)?
            .get_session_status()
            .to_json()
            .map_err(|e| BridgeError::failed(Operation::Status, e.to_string()))?;
        to_jstring(env, &json)
    })
}

#[no_mangle]
pub extern "C" fn Java_com_fitform_arbodymeasurements_ArSessionBridge_nativeMarkScanCompleted(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    scan_type: JString,
) -> jboolean {
    run(&mut env, JNI_FALSE, |env| {
        let gateway = gateway_ref(handle)?;
        let scan_type: String = env
            .get_string(&scan_type)
            .map_err(|e| BridgeError::failed(Operation::MarkScanCompleted, e.to_string()))?
            .into();
        gateway.mark_scan_completed(&scan_type).map(to_jboolean)
    })
}
