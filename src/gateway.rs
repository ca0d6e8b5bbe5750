use crate::config::BridgeConfig;
use crate::engine::{ArEngine, ArSession, SessionConfig};
use crate::error::{BridgeError, JResult, Operation};
use crate::events::{ArEvent, EventSink, NullEventSink};
use crate::measurement::{
    BodyMeasurements, MeasurementEstimator, MeasurementSample, PlaceholderEstimator, ScanKind,
};
use crate::report::{CapabilityReport, StatusReport};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Gateway session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine session held
    Inactive,
    /// Engine session open and configured
    Active,
}

/// The handle lives inside the active variant, so it exists iff the session is active.
enum Slot<S> {
    Inactive,
    Active(S),
}

impl<S> Slot<S> {
    fn state(&self) -> SessionState {
        match self {
            Slot::Inactive => SessionState::Inactive,
            Slot::Active(_) => SessionState::Active,
        }
    }
}

/// Session lifecycle gateway
///
/// Holds at most one engine session and translates host requests into engine
/// calls. Every call that touches the session holds the slot lock for its whole
/// duration, so a start and a stop never interleave.
pub struct SessionGateway<E: ArEngine> {
    engine: E,
    config: BridgeConfig,
    estimator: Box<dyn MeasurementEstimator + Send + Sync>,
    events: Box<dyn EventSink + Send + Sync>,
    slot: Mutex<Slot<E::Session>>,
}

impl<E: ArEngine> SessionGateway<E> {
    /// Create gateway in Inactive state
    pub fn new(engine: E, config: BridgeConfig) -> Self {
        SessionGateway {
            engine,
            config,
            estimator: Box::new(PlaceholderEstimator),
            events: Box::new(NullEventSink),
            slot: Mutex::new(Slot::Inactive),
        }
    }

    pub fn with_estimator(
        mut self,
        estimator: impl MeasurementEstimator + Send + Sync + 'static,
    ) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn with_event_sink(mut self, events: impl EventSink + Send + Sync + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn constants(&self) -> HashMap<&'static str, String> {
        self.config.constants()
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.lock_slot().state()
    }

    /// Engine installed, or installed with an outdated APK. Probe failures are errors.
    pub fn is_engine_supported(&self) -> JResult<bool> {
        let availability = self.engine.check_availability().map_err(|e| {
            error!("Error checking ARCore support: {}", e);
            BridgeError::failed(Operation::CheckSupport, e.to_string())
        })?;
        Ok(availability.is_supported())
    }

    /// The alternate platform engine never exists on this platform.
    pub fn is_alternate_engine_supported(&self) -> bool {
        false
    }

    /// Describe body-tracking support. Never fails.
    pub fn is_body_tracking_supported(&self) -> CapabilityReport {
        let platform_version = self.engine.platform_version();

        match self.engine.check_availability() {
            Ok(availability) => {
                let available = availability.is_supported();
                let reason = if available {
                    "ARCore is available and supported".to_string()
                } else {
                    format!("ARCore is not available: {}", availability)
                };
                CapabilityReport {
                    supported: available,
                    available,
                    reason,
                    platform_version,
                    engine_version: self.config.engine_version_for(available).to_string(),
                }
            }
            Err(e) => {
                warn!("Error checking ARCore body tracking support: {}", e);
                CapabilityReport {
                    supported: false,
                    available: false,
                    reason: format!("Error checking ARCore support: {}", e),
                    platform_version,
                    engine_version: self.config.engine_version_for(false).to_string(),
                }
            }
        }
    }

    /// Transition Inactive → Active. Idempotent while active.
    pub fn start_session(&self) -> JResult<bool> {
        let mut slot = self.lock_slot();
        if let Slot::Active(_) = *slot {
            debug!("AR session already active");
            return Ok(true);
        }

        let availability = self.engine.check_availability().map_err(|e| {
            error!("Error starting AR session: {}", e);
            BridgeError::from_session_start(e)
        })?;
        if !availability.can_start_session() {
            warn!("ARCore is not available: {}", availability);
            return Err(BridgeError::EngineUnavailable(availability.to_string()));
        }

        let mut session = match self.engine.create_session() {
            Ok(Some(session)) => session,
            Ok(None) => {
                error!("ARCore returned no session object");
                return Err(BridgeError::SessionCreationFailed);
            }
            Err(e) => {
                error!("Error creating AR session: {}", e);
                return Err(BridgeError::from_session_start(e));
            }
        };

        if let Err(err) = apply_config(&mut session, &SessionConfig::BODY_TRACKING) {
            error!("Error configuring AR session: {}", err);
            release(session, "after failed configuration");
            return Err(err);
        }

        *slot = Slot::Active(session);
        drop(slot);

        info!("AR session started successfully");
        self.emit(ArEvent::SessionStarted);
        Ok(true)
    }

    /// Transition to Inactive, releasing the handle. Idempotent while inactive.
    ///
    /// State is cleared even when the engine fails to release the session; the
    /// failure is still reported.
    pub fn stop_session(&self) -> JResult<bool> {
        let mut slot = self.lock_slot();
        let closed = match std::mem::replace(&mut *slot, Slot::Inactive) {
            Slot::Inactive => {
                debug!("AR session already stopped");
                return Ok(true);
            }
            Slot::Active(session) => session.close(),
        };
        drop(slot);

        self.emit(ArEvent::SessionStopped);
        match closed {
            Ok(()) => {
                info!("AR session stopped");
                Ok(true)
            }
            Err(e) => {
                error!("Error stopping AR session: {}", e);
                Err(BridgeError::failed(Operation::StopSession, e.to_string()))
            }
        }
    }

    /// Fetch a measurement sample from the latest frame.
    pub fn get_measurements(&self) -> JResult<MeasurementSample> {
        let mut slot = self.lock_slot();
        let session = match &mut *slot {
            Slot::Inactive => return Ok(MeasurementSample::not_active()),
            Slot::Active(session) => session,
        };

        let frame = match session.update() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(MeasurementSample::no_frame()),
            Err(e) => {
                error!("Error getting measurements: {}", e);
                return Err(BridgeError::from_frame_request(e));
            }
        };
        if !frame.is_tracking() {
            debug!("Frame tracking state {:?}", frame.tracking_state);
            return Ok(MeasurementSample::not_tracking());
        }

        let estimate = self.estimator.estimate(&frame);
        drop(slot);

        let measurements =
            BodyMeasurements::from_estimate(estimate, Utc::now().timestamp_millis());
        self.emit(ArEvent::MeasurementUpdate(measurements.clone()));
        Ok(MeasurementSample::Valid(measurements))
    }

    /// Summarize the current flags. Never fails.
    pub fn get_session_status(&self) -> StatusReport {
        StatusReport::for_state(self.state())
    }

    /// Record that the host finished a scan pass. Does not change session state.
    pub fn mark_scan_completed(&self, scan_type: &str) -> JResult<bool> {
        let kind = ScanKind::parse(scan_type);
        info!("Scan completed: {}", kind);
        self.emit(ArEvent::ScanCompleted(kind));
        Ok(true)
    }

    /// Release any held session and reset to Inactive.
    pub fn teardown(&self) {
        let mut slot = self.lock_slot();
        if let Slot::Active(session) = std::mem::replace(&mut *slot, Slot::Inactive) {
            info!("Releasing AR session on teardown");
            release(session, "during teardown");
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot<E::Session>> {
        // The slot is only ever replaced whole, so a poisoned lock still holds a consistent value.
        self.slot.lock().unwrap_or_else(|poisoned| {
            warn!("Session lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn emit(&self, event: ArEvent) {
        if !self.config.emit_events {
            return;
        }
        if let Err(e) = self.events.emit(&event) {
            warn!("Failed to emit {}: {}", event.name(), e);
        }
    }
}

impl<E: ArEngine> Drop for SessionGateway<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn apply_config<S: ArSession>(session: &mut S, config: &SessionConfig) -> JResult<()> {
    let supported = session
        .is_supported(config)
        .map_err(BridgeError::from_session_start)?;
    if !supported {
        return Err(BridgeError::ConfigurationNotSupported);
    }
    session
        .configure(config)
        .map_err(BridgeError::from_session_start)
}

fn release<S: ArSession>(session: S, context: &str) {
    if let Err(e) = session.close() {
        warn!("Failed to close AR session {}: {}", context, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Availability, TrackingState};
    use crate::error::EngineError;
    use crate::testing::{FakeEngine, RecordingSink};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn gateway(engine: &FakeEngine) -> SessionGateway<FakeEngine> {
        let _ = env_logger::builder().is_test(true).try_init();
        SessionGateway::new(engine.clone(), BridgeConfig::default())
    }

    #[test]
    fn test_start_and_stop() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);
        assert_eq!(gw.state(), SessionState::Inactive);

        assert!(gw.start_session().unwrap());
        assert_eq!(gw.state(), SessionState::Active);
        assert_eq!(engine.open_handles(), 1);
        assert_eq!(
            engine.script.lock().unwrap().configured,
            vec![SessionConfig::BODY_TRACKING]
        );

        assert!(gw.stop_session().unwrap());
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.open_handles(), 0);
        assert_eq!(gw.get_measurements().unwrap(), MeasurementSample::not_active());
    }

    #[test]
    fn test_start_is_idempotent() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);

        assert!(gw.start_session().unwrap());
        assert!(gw.start_session().unwrap());
        assert_eq!(engine.open_handles(), 1);
        assert_eq!(engine.script.lock().unwrap().created, 1);
    }

    #[test]
    fn test_stop_while_inactive() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);

        assert!(gw.stop_session().unwrap());
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.script.lock().unwrap().closed, 0);
    }

    #[test]
    fn test_start_when_engine_not_installed() {
        let engine = FakeEngine::new().with(|s| s.create = Err(EngineError::NotInstalled));
        let gw = gateway(&engine);

        assert_eq!(gw.start_session().unwrap_err(), BridgeError::EngineNotInstalled);
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn test_install_failures_are_classified() {
        let cases = [
            (EngineError::NotInstalled, "ARCore_NOT_INSTALLED"),
            (EngineError::ApkTooOld, "ARCore_APK_TOO_OLD"),
            (EngineError::SdkTooOld, "ARCore_SDK_TOO_OLD"),
            (EngineError::DeviceNotCompatible, "DEVICE_NOT_COMPATIBLE"),
            (EngineError::Other("boom".to_string()), "SESSION_START_ERROR"),
        ];
        for (engine_error, code) in cases {
            let engine = FakeEngine::new().with(|s| s.create = Err(engine_error));
            let gw = gateway(&engine);
            assert_eq!(gw.start_session().unwrap_err().code(), code);
            assert_eq!(gw.state(), SessionState::Inactive);
        }
    }

    #[test]
    fn test_start_requires_fully_installed_engine() {
        let engine =
            FakeEngine::new().with(|s| s.availability = Ok(Availability::SupportedApkTooOld));
        let gw = gateway(&engine);

        let err = gw.start_session().unwrap_err();
        assert_eq!(err, BridgeError::EngineUnavailable("SUPPORTED_APK_TOO_OLD".to_string()));
        assert_eq!(err.code(), "ARCore_UNAVAILABLE");
        assert_eq!(engine.script.lock().unwrap().created, 0);
    }

    #[test]
    fn test_null_session_is_creation_failure() {
        let engine = FakeEngine::new().with(|s| s.create = Ok(false));
        let gw = gateway(&engine);

        assert_eq!(gw.start_session().unwrap_err(), BridgeError::SessionCreationFailed);
        assert_eq!(gw.state(), SessionState::Inactive);
    }

    #[test]
    fn test_unsupported_config_releases_handle() {
        let engine = FakeEngine::new().with(|s| s.config_supported = false);
        let gw = gateway(&engine);

        assert_eq!(gw.start_session().unwrap_err(), BridgeError::ConfigurationNotSupported);
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.open_handles(), 0);
        assert!(engine.script.lock().unwrap().configured.is_empty());
    }

    #[test]
    fn test_stop_failure_still_clears_state() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);
        gw.start_session().unwrap();
        engine.edit(|s| s.close_error = Some(EngineError::Other("busy".to_string())));

        let err = gw.stop_session().unwrap_err();
        assert_eq!(err.code(), "SESSION_STOP_ERROR");
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.open_handles(), 0);
        assert!(gw.stop_session().unwrap());
    }

    #[test]
    fn test_measurements_while_inactive_never_touch_engine() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);

        let sample = gw.get_measurements().unwrap();
        assert!(!sample.is_valid());
        assert!(sample.reason().unwrap().contains("not active"));
        assert_eq!(engine.frame_requests(), 0);
    }

    #[test]
    fn test_measurements_frame_states() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);
        gw.start_session().unwrap();

        engine.edit(|s| s.frame = Ok(Some(TrackingState::Paused)));
        assert!(gw.get_measurements().unwrap().reason().unwrap().contains("not tracking"));

        engine.edit(|s| s.frame = Ok(None));
        assert_eq!(gw.get_measurements().unwrap(), MeasurementSample::no_frame());

        engine.edit(|s| s.frame = Ok(Some(TrackingState::Tracking)));
        match gw.get_measurements().unwrap() {
            MeasurementSample::Valid(m) => {
                assert!(m.front_scan_completed);
                assert!(!m.side_scan_completed);
                assert_eq!(m.scan_status, crate::measurement::ScanStatus::Scanning);
                assert!(m.timestamp_millis > 0);
            }
            other => panic!("expected valid sample, got {:?}", other),
        }
        assert_eq!(engine.frame_requests(), 3);
    }

    #[test]
    fn test_camera_unavailable_is_classified() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);
        gw.start_session().unwrap();

        engine.edit(|s| s.frame = Err(EngineError::CameraNotAvailable("in use".to_string())));
        assert_eq!(gw.get_measurements().unwrap_err().code(), "CAMERA_NOT_AVAILABLE");

        engine.edit(|s| s.frame = Err(EngineError::Other("fatal".to_string())));
        assert_eq!(gw.get_measurements().unwrap_err().code(), "MEASUREMENTS_ERROR");
        assert_eq!(gw.state(), SessionState::Active);
    }

    #[test]
    fn test_capability_queries() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);
        assert!(gw.is_engine_supported().unwrap());
        assert!(!gw.is_alternate_engine_supported());

        let report = gw.is_body_tracking_supported();
        assert!(report.supported && report.available);
        assert_eq!(report.engine_version, "1.40.0");
        assert_eq!(report.platform_version, 34);

        engine.edit(|s| s.availability = Ok(Availability::UnsupportedDeviceNotCapable));
        assert!(!gw.is_engine_supported().unwrap());
        let report = gw.is_body_tracking_supported();
        assert!(!report.supported);
        assert_eq!(report.reason, "ARCore is not available: UNSUPPORTED_DEVICE_NOT_CAPABLE");
        assert_eq!(report.engine_version, "0.0.0");
    }

    #[test]
    fn test_probe_failure_degrades_report_but_fails_check() {
        let engine = FakeEngine::new()
            .with(|s| s.availability = Err(EngineError::Other("no context".to_string())));
        let gw = gateway(&engine);

        assert_eq!(gw.is_engine_supported().unwrap_err().code(), "ARCore_CHECK_ERROR");

        let report = gw.is_body_tracking_supported();
        assert!(!report.supported && !report.available);
        assert!(report.reason.contains("no context"));
    }

    #[test]
    fn test_probe_failure_on_start_is_generic_start_error() {
        let engine = FakeEngine::new()
            .with(|s| s.availability = Err(EngineError::Other("no context".to_string())));
        let gw = gateway(&engine);

        let err = gw.start_session().unwrap_err();
        assert_eq!(err.code(), "SESSION_START_ERROR");
        assert!(err.to_string().contains("no context"));
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.script.lock().unwrap().created, 0);
    }

    #[test]
    fn test_alternate_engine_never_supported() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);
        assert!(!gw.is_alternate_engine_supported());
        gw.start_session().unwrap();
        assert!(!gw.is_alternate_engine_supported());
    }

    #[test]
    fn test_mark_scan_completed_keeps_state() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine);

        assert!(gw.mark_scan_completed("front").unwrap());
        assert_eq!(gw.get_session_status(), StatusReport::for_state(SessionState::Inactive));
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let engine = FakeEngine::new();
        let sink = RecordingSink::default();
        let gw = gateway(&engine).with_event_sink(sink.clone());

        gw.start_session().unwrap();
        gw.get_measurements().unwrap();
        gw.mark_scan_completed("side").unwrap();
        gw.stop_session().unwrap();

        assert_eq!(
            sink.names(),
            vec![
                "onARSessionStarted",
                "onARMeasurementUpdate",
                "onARScanCompleted",
                "onARSessionStopped"
            ]
        );
    }

    #[test]
    fn test_events_disabled_by_config() {
        let engine = FakeEngine::new();
        let sink = RecordingSink::default();
        let config = BridgeConfig {
            emit_events: false,
            ..BridgeConfig::default()
        };
        let gw = SessionGateway::new(engine.clone(), config).with_event_sink(sink.clone());

        gw.start_session().unwrap();
        assert!(sink.names().is_empty());
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _event: &ArEvent) -> JResult<()> {
            Err(BridgeError::Jni("host listener gone".to_string()))
        }
    }

    #[test]
    fn test_failing_event_sink_does_not_change_results() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine).with_event_sink(FailingSink);

        assert!(gw.start_session().unwrap());
        assert!(gw.get_measurements().unwrap().is_valid());
        assert!(gw.mark_scan_completed("front").unwrap());
        assert!(gw.stop_session().unwrap());
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.open_handles(), 0);
    }

    struct PanickingEstimator;

    impl MeasurementEstimator for PanickingEstimator {
        fn estimate(&self, _frame: &crate::engine::Frame) -> crate::measurement::BodyEstimate {
            panic!("estimator bug");
        }
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let engine = FakeEngine::new();
        let gw = gateway(&engine).with_estimator(PanickingEstimator);
        gw.start_session().unwrap();

        // The estimator runs with the slot lock held, so this poisons it.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = gw.get_measurements();
        }));
        assert!(result.is_err());
        assert!(gw.slot.is_poisoned());

        assert_eq!(gw.state(), SessionState::Active);
        assert!(gw.get_session_status().is_active);
        assert!(gw.stop_session().unwrap());
        assert_eq!(gw.state(), SessionState::Inactive);
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn test_drop_releases_handle() {
        let engine = FakeEngine::new();
        {
            let gw = gateway(&engine);
            gw.start_session().unwrap();
            assert_eq!(engine.open_handles(), 1);
        }
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn test_panic_unwind_releases_handle() {
        let engine = FakeEngine::new();
        let inner = engine.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let gw = gateway(&inner);
            gw.start_session().unwrap();
            panic!("host crashed");
        }));

        assert!(result.is_err());
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn test_concurrent_start_stop_never_orphans_handle() {
        let engine = FakeEngine::new();
        let gw = Arc::new(gateway(&engine));

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let gw = Arc::clone(&gw);
                std::thread::spawn(move || {
                    for n in 0..50 {
                        if (i + n) % 2 == 0 {
                            gw.start_session().unwrap();
                        } else {
                            gw.stop_session().unwrap();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let expected = usize::from(gw.state() == SessionState::Active);
        assert_eq!(engine.open_handles(), expected);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Stop,
        Measure,
        Status,
        MarkScan,
        Teardown,
        SetAvailability(Availability),
        SetTracking(bool),
        SetConfigSupported(bool),
        FailNextClose,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Stop),
            Just(Op::Measure),
            Just(Op::Status),
            Just(Op::MarkScan),
            Just(Op::Teardown),
            prop::sample::select(Availability::ALL.to_vec()).prop_map(Op::SetAvailability),
            any::<bool>().prop_map(Op::SetTracking),
            any::<bool>().prop_map(Op::SetConfigSupported),
            Just(Op::FailNextClose),
        ]
    }

    proptest! {
        #[test]
        fn handle_exists_iff_active(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let engine = FakeEngine::new();
            let gw = gateway(&engine);

            for op in ops {
                match op {
                    Op::Start => { let _ = gw.start_session(); }
                    Op::Stop => { let _ = gw.stop_session(); }
                    Op::Measure => {
                        let before = engine.frame_requests();
                        let inactive = gw.state() == SessionState::Inactive;
                        let _ = gw.get_measurements();
                        if inactive {
                            prop_assert_eq!(engine.frame_requests(), before);
                        }
                    }
                    Op::Status => { let _ = gw.get_session_status(); }
                    Op::MarkScan => { prop_assert!(gw.mark_scan_completed("front").unwrap()); }
                    Op::Teardown => gw.teardown(),
                    Op::SetAvailability(a) => engine.edit(|s| s.availability = Ok(a)),
                    Op::SetTracking(tracking) => {
                        let state = if tracking { TrackingState::Tracking } else { TrackingState::Stopped };
                        engine.edit(|s| s.frame = Ok(Some(state)));
                    }
                    Op::SetConfigSupported(supported) => {
                        engine.edit(|s| s.config_supported = supported);
                    }
                    Op::FailNextClose => {
                        engine.edit(|s| s.close_error = Some(EngineError::Other("busy".to_string())));
                    }
                }

                let active = gw.state() == SessionState::Active;
                prop_assert_eq!(engine.open_handles(), usize::from(active));
                prop_assert_eq!(gw.get_session_status().is_active, active);
                prop_assert!(!gw.is_alternate_engine_supported());
            }

            drop(gw);
            prop_assert_eq!(engine.open_handles(), 0);
        }
    }
}
