//! Configuration Vault – reads/writes `~/.navlink/config.toml`.

use navlink_bridge::BridgeConfig;
use navlink_types::TopicKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// One topic the CLI subscribes to at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSub {
    /// Topic name without the namespace prefix (e.g. `/map`).
    pub topic: String,
    /// Full middleware message type (e.g. `nav_msgs/msg/OccupancyGrid`).
    pub message_type: String,
    /// Decoder applied to inbound payloads on this topic.
    pub kind: TopicKind,
}

/// Persisted user configuration stored in `~/.navlink/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway hostname or IP.
    #[serde(default = "default_host")]
    pub host: String,

    /// Gateway WebSocket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Namespace prefix applied to every topic and service name.
    #[serde(default)]
    pub namespace: String,

    /// Topic the velocity command publisher writes to.
    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    /// Map-manager service name.
    #[serde(default = "default_map_service")]
    pub map_service: String,

    /// Access token forwarded in map-manager requests (stored as plain text –
    /// the vault restricts file permissions on `~/.navlink/config.toml`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,

    /// Topics subscribed at startup.
    #[serde(default = "default_subscriptions")]
    pub subscriptions: Vec<TopicSub>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("namespace", &self.namespace)
            .field("command_topic", &self.command_topic)
            .field("map_service", &self.map_service)
            .field(
                "access_token",
                if self.access_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
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

fn default_subscriptions() -> Vec<TopicSub> {
    vec![
        TopicSub {
            topic: "/map".to_string(),
            message_type: "nav_msgs/msg/OccupancyGrid".to_string(),
            kind: TopicKind::OccupancyGrid,
        },
        TopicSub {
            topic: "/odom".to_string(),
            message_type: "nav_msgs/msg/Odometry".to_string(),
            kind: TopicKind::Odometry,
        },
        TopicSub {
            topic: "/scan".to_string(),
            message_type: "sensor_msgs/msg/LaserScan".to_string(),
            kind: TopicKind::LaserScan,
        },
        TopicSub {
            topic: "/tf".to_string(),
            message_type: "tf2_msgs/msg/TFMessage".to_string(),
            kind: TopicKind::TransformTree,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            namespace: String::new(),
            command_topic: default_command_topic(),
            map_service: default_map_service(),
            access_token: String::new(),
            subscriptions: default_subscriptions(),
        }
    }
}

impl Config {
    /// Project the persisted config onto the bridge construction parameters.
    pub fn bridge(&self) -> BridgeConfig {
        BridgeConfig {
            host: self.host.clone(),
            port: self.port,
            namespace: self.namespace.clone(),
            command_topic: self.command_topic.clone(),
            map_service: self.map_service.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

/// Return the path to `~/.navlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".navlink").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `NAVLINK_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVLINK_HOST` | `host` |
/// | `NAVLINK_PORT` | `port` |
/// | `NAVLINK_NAMESPACE` | `namespace` |
/// | `NAVLINK_TOKEN` | `access_token` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("NAVLINK_HOST") {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("NAVLINK_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.port = port;
        }
    if let Ok(v) = std::env::var("NAVLINK_NAMESPACE") {
        cfg.namespace = v;
    }
    if let Ok(v) = std::env::var("NAVLINK_TOKEN") {
        cfg.access_token = v;
    }
}

/// Save the config to disk, creating `~/.navlink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
