use crate::error::{BridgeError, JResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MODULE_NAME: &str = "ARSessionManager";

/// Bridge settings handed over by the host when the gateway is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Name the host registers the module under
    pub module_name: String,
    /// Engine version advertised when the engine is available
    pub engine_version: String,
    /// Engine version advertised when it is not
    pub unavailable_engine_version: String,
    pub emit_events: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module_name: DEFAULT_MODULE_NAME.to_string(),
            engine_version: "1.40.0".to_string(),
            unavailable_engine_version: "0.0.0".to_string(),
            emit_events: true,
        }
    }
}

impl BridgeConfig {
    /// Parse host-supplied JSON. Blank input yields the defaults.
    pub fn from_json(json: &str) -> JResult<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
            .map_err(|e| BridgeError::Jni(format!("Invalid bridge config: {}", e)))
    }

    /// Constants exported to the host module
    pub fn constants(&self) -> HashMap<&'static str, String> {
        HashMap::from([("MODULE_NAME", self.module_name.clone())])
    }

    pub fn engine_version_for(&self, available: bool) -> &str {
        if available {
            &self.engine_version
        } else {
            &self.unavailable_engine_version
        }
    }
}
