//! The typed surface the bridge exposes upward, plus the service vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Pose2D;
use crate::msg::{GridMap, LaserScan, Odometry, TransformPair};

/// Lifecycle of the WebSocket link, owned by the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Decoder selection for a subscribed topic, declared at subscribe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicKind {
    OccupancyGrid,
    LaserScan,
    Odometry,
    TransformTree,
    PlanarPose,
    /// No typed decoder; the raw JSON payload is forwarded as-is.
    Raw,
}

/// The remote procedures the map-manager service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Fetch the current occupancy grid.
    FetchMap,
    /// Initial hello; the reply carries the map catalogue.
    Handshake,
    NavigationMode,
    MappingMode,
    RemappingMode,
    ListMaps,
    SaveMap,
    SelectMap,
    SendWaypoints,
}

impl ServiceKind {
    /// Stable label used as the request-id prefix on the wire. Unique per
    /// kind so that an id alone identifies the originating call.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::FetchMap => "get_map",
            ServiceKind::Handshake => "get_hs",
            ServiceKind::NavigationMode => "get_navi",
            ServiceKind::MappingMode => "get_mapping",
            ServiceKind::RemappingMode => "get_remap",
            ServiceKind::ListMaps => "get_maps",
            ServiceKind::SaveMap => "get_savemap",
            ServiceKind::SelectMap => "get_selmap",
            ServiceKind::SendWaypoints => "get_wp",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One named stop on a route, in map coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub pose: Pose2D,
}

/// Catalogue of stored maps, returned by handshake and list-maps calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapCatalog {
    #[serde(default)]
    pub total_maps: i64,
    #[serde(default)]
    pub map_names: Vec<String>,
    #[serde(default)]
    pub robot_namespace: String,
    #[serde(default = "missing_status")]
    pub status: i32,
}

/// Status code reported when the gateway omits or garbles the field.
pub const STATUS_MISSING: i32 = -2;

fn missing_status() -> i32 {
    STATUS_MISSING
}

/// Decoded body of a `service_response`, specific to the originating kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceOutcome {
    /// Fetched occupancy grid ([`ServiceKind::FetchMap`]).
    Map(GridMap),
    /// Map catalogue ([`ServiceKind::Handshake`], [`ServiceKind::ListMaps`]).
    Catalog(MapCatalog),
    /// Bare status code (mode switches, save/select, waypoints).
    Status(i32),
    /// Response did not decode as any known shape; raw values preserved.
    Raw(serde_json::Value),
}

/// Unified event wrapper for everything the bridge emits upward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub payload: BridgePayload,
}

impl BridgeEvent {
    pub fn new(payload: BridgePayload) -> Self {
        Self { id: Uuid::new_v4(), at: Utc::now(), payload }
    }
}

/// Variants of data the bridge emits to its consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgePayload {
    /// The socket opened and the active subscription set was replayed.
    Connected,
    /// The socket closed or failed.
    Disconnected,
    /// A transport-level error, carried as the transport's message.
    Error { message: String },
    /// Occupancy grid from a subscribed map topic.
    Map(GridMap),
    /// Laser scan from a subscribed scan topic.
    Laser(LaserScan),
    /// Odometry, tagged with the wire topic it arrived on.
    Odometry { topic: String, odom: Odometry },
    /// Both halves of the localisation chain, emitted atomically.
    Transform(TransformPair),
    /// Planar pose, tagged with the wire topic it arrived on.
    PlanarPose { topic: String, pose: Pose2D },
    /// Publish on a topic with no typed decoder.
    Topic { topic: String, payload: serde_json::Value },
    /// Correlated reply to an earlier service call.
    Service { kind: ServiceKind, outcome: ServiceOutcome },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_kind_labels_are_unique() {
        let kinds = [
            ServiceKind::FetchMap,
            ServiceKind::Handshake,
            ServiceKind::NavigationMode,
            ServiceKind::MappingMode,
            ServiceKind::RemappingMode,
            ServiceKind::ListMaps,
            ServiceKind::SaveMap,
            ServiceKind::SelectMap,
            ServiceKind::SendWaypoints,
        ];
        let mut labels: Vec<&str> = kinds.iter().map(|k| k.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), kinds.len(), "duplicate request-id prefix");
    }

    #[test]
    fn map_catalog_missing_status_decodes_as_sentinel() {
        let cat: MapCatalog = serde_json::from_str(
            r#"{"total_maps":2,"map_names":["lab","hall"],"robot_namespace":"/r1"}"#,
        )
        .unwrap();
        assert_eq!(cat.total_maps, 2);
        assert_eq!(cat.map_names, vec!["lab", "hall"]);
        assert_eq!(cat.status, STATUS_MISSING);
    }

    #[test]
    fn bridge_event_roundtrip() {
        let event = BridgeEvent::new(BridgePayload::Error {
            message: "connection refused".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: BridgeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert!(matches!(back.payload, BridgePayload::Error { .. }));
    }

    #[test]
    fn connection_state_defaults_to_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
