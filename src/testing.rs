//! Scripted engine and event recorder for gateway tests.

use crate::engine::{ArEngine, ArSession, Availability, Frame, SessionConfig, TrackingState};
use crate::error::{EngineError, JResult};
use crate::events::{ArEvent, EventSink};
use std::sync::{Arc, Mutex};

/// Behaviour and counters shared by a fake engine and its sessions
#[derive(Debug)]
pub struct Script {
    pub availability: Result<Availability, EngineError>,
    pub create: Result<bool, EngineError>,
    pub config_supported: bool,
    pub frame: Result<Option<TrackingState>, EngineError>,
    pub close_error: Option<EngineError>,
    pub open_handles: usize,
    pub created: usize,
    pub closed: usize,
    pub frame_requests: usize,
    pub configured: Vec<SessionConfig>,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            availability: Ok(Availability::SupportedInstalled),
            create: Ok(true),
            config_supported: true,
            frame: Ok(Some(TrackingState::Tracking)),
            close_error: None,
            open_handles: 0,
            created: 0,
            closed: 0,
            frame_requests: 0,
            configured: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    pub script: Arc<Mutex<Script>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, edit: impl FnOnce(&mut Script)) -> Self {
        edit(&mut self.script.lock().unwrap());
        self
    }

    pub fn edit(&self, edit: impl FnOnce(&mut Script)) {
        edit(&mut self.script.lock().unwrap());
    }

    pub fn open_handles(&self) -> usize {
        self.script.lock().unwrap().open_handles
    }

    pub fn frame_requests(&self) -> usize {
        self.script.lock().unwrap().frame_requests
    }
}

pub struct FakeSession {
    script: Arc<Mutex<Script>>,
}

impl ArSession for FakeSession {
    fn is_supported(&self, _config: &SessionConfig) -> Result<bool, EngineError> {
        Ok(self.script.lock().unwrap().config_supported)
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), EngineError> {
        self.script.lock().unwrap().configured.push(*config);
        Ok(())
    }

    fn update(&mut self) -> Result<Option<Frame>, EngineError> {
        let mut script = self.script.lock().unwrap();
        script.frame_requests += 1;
        script.frame.clone().map(|state| state.map(Frame::new))
    }

    fn close(self) -> Result<(), EngineError> {
        let mut script = self.script.lock().unwrap();
        script.open_handles -= 1;
        script.closed += 1;
        match script.close_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ArEngine for FakeEngine {
    type Session = FakeSession;

    fn check_availability(&self) -> Result<Availability, EngineError> {
        self.script.lock().unwrap().availability.clone()
    }

    fn create_session(&self) -> Result<Option<FakeSession>, EngineError> {
        let mut script = self.script.lock().unwrap();
        match script.create.clone()? {
            true => {
                script.open_handles += 1;
                script.created += 1;
                Ok(Some(FakeSession {
                    script: Arc::clone(&self.script),
                }))
            }
            false => Ok(None),
        }
    }

    fn platform_version(&self) -> i32 {
        34
    }
}

/// Collects emitted events
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<ArEvent>>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(ArEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ArEvent) -> JResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
