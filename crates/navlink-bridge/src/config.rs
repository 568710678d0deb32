//! Bridge construction parameters.

use serde::{Deserialize, Serialize};

/// Everything the bridge needs to reach one remote unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Gateway host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Gateway WebSocket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix prepended to every topic and service name on the wire,
    /// addressing a specific remote unit (e.g. `"/r1"`). May be empty.
    #[serde(default)]
    pub namespace: String,

    /// Topic the command publisher writes to.
    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    /// Service the map-manager convenience calls go through.
    #[serde(default = "default_map_service")]
    pub map_service: String,

    /// Access token forwarded in map-manager call arguments. May be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9090
}
fn default_command_topic() -> String {
    "/cmd_vel".to_string()
}
fn default_map_service() -> String {
    "/map_manager".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            namespace: String::new(),
            command_topic: default_command_topic(),
            map_service: default_map_service(),
            access_token: String::new(),
        }
    }
}

impl BridgeConfig {
    /// WebSocket endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Effective wire name for a caller-supplied topic or service.
    pub fn wire_name(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }
}
