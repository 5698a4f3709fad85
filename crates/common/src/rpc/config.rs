use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where conductor requests are sent and how long callers wait for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConductorConfig {
    pub topic: String,
    pub queue_group: String,
    pub rpc_timeout_secs: u64,
}

impl ConductorConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            topic: "iot.conductor".to_string(),
            queue_group: "iot-conductor".to_string(),
            rpc_timeout_secs: 30,
        }
    }
}
