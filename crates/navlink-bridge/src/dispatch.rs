//! Typed decoding of inbound publishes and service responses.
//!
//! The dispatch layer turns raw JSON payloads into the typed event payloads
//! the bridge emits upward. It is deliberately tolerant: a payload that does
//! not decode for its declared kind is dropped with a warning, never an
//! error, and unknown response shapes are preserved as raw values.

use navlink_types::{
    BridgePayload, GridMap, LaserScan, MapCatalog, Odometry, Pose2D, STATUS_MISSING, ServiceKind,
    ServiceOutcome, TopicKind, TransformPair, TransformStamped, TransformTree,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Pairs the two halves of the localisation chain.
///
/// `map→odom` is cached as it arrives; a composed [`TransformPair`] is
/// produced only when `odom→base_footprint` arrives while a cached half
/// exists, so consumers never observe a half-updated tree.
#[derive(Debug, Default)]
pub struct TransformComposer {
    map_odom: Option<TransformStamped>,
}

impl TransformComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound transform batch; returns a composed pair when the
    /// second half completes the chain. Unrelated transforms are ignored.
    pub fn ingest(&mut self, tree: &TransformTree) -> Option<TransformPair> {
        let mut pair = None;
        for tf in &tree.transforms {
            let parent = frame_leaf(&tf.header.frame_id);
            let child = frame_leaf(&tf.child_frame_id);
            match (parent, child) {
                ("map", "odom") => self.map_odom = Some(tf.clone()),
                ("odom", "base_footprint") => {
                    if let Some(map_odom) = &self.map_odom {
                        pair = Some(TransformPair {
                            map_odom: map_odom.clone(),
                            odom_base: tf.clone(),
                        });
                    } else {
                        debug!("odom->base_footprint before any map->odom, pair withheld");
                    }
                }
                _ => {}
            }
        }
        pair
    }
}

/// Frame ids may arrive namespaced (`r1/odom`); comparisons use the final
/// path segment.
fn frame_leaf(frame_id: &str) -> &str {
    frame_id.rsplit('/').next().unwrap_or(frame_id)
}

/// Decode one inbound `publish` into the event payload for its topic kind.
///
/// Returns `None` when the payload does not decode (dropped with a warning)
/// or when a transform batch does not yet complete a pair.
pub fn dispatch_publish(
    kind: TopicKind,
    topic: &str,
    msg: Value,
    composer: &mut TransformComposer,
) -> Option<BridgePayload> {
    match kind {
        TopicKind::OccupancyGrid => decode_as::<GridMap>(topic, msg).map(BridgePayload::Map),
        TopicKind::LaserScan => decode_as::<LaserScan>(topic, msg).map(BridgePayload::Laser),
        TopicKind::Odometry => decode_as::<Odometry>(topic, msg)
            .map(|odom| BridgePayload::Odometry { topic: topic.to_string(), odom }),
        TopicKind::TransformTree => decode_as::<TransformTree>(topic, msg)
            .and_then(|tree| composer.ingest(&tree))
            .map(BridgePayload::Transform),
        TopicKind::PlanarPose => decode_as::<Pose2D>(topic, msg)
            .map(|pose| BridgePayload::PlanarPose { topic: topic.to_string(), pose }),
        TopicKind::Raw => {
            Some(BridgePayload::Topic { topic: topic.to_string(), payload: msg })
        }
    }
}

fn decode_as<T: serde::de::DeserializeOwned>(topic: &str, msg: Value) -> Option<T> {
    match serde_json::from_value(msg) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(topic, error = %e, "undecodable payload dropped");
            None
        }
    }
}

/// Decode the body of a correlated `service_response` for its kind.
pub fn decode_service_outcome(
    kind: ServiceKind,
    values: Option<Value>,
    result: Option<Value>,
) -> ServiceOutcome {
    match kind {
        // The map-fetch service answers under `result.map` instead of `values`.
        ServiceKind::FetchMap => {
            let map = result
                .as_ref()
                .and_then(|r| r.get("map").cloned())
                .and_then(|m| serde_json::from_value::<GridMap>(m).ok());
            match map {
                Some(grid) => ServiceOutcome::Map(grid),
                None => {
                    warn!(kind = %kind, "map response without a decodable result.map");
                    ServiceOutcome::Raw(result.or(values).unwrap_or(Value::Null))
                }
            }
        }
        ServiceKind::Handshake | ServiceKind::ListMaps => {
            match values.clone().and_then(|v| serde_json::from_value::<MapCatalog>(v).ok()) {
                Some(catalog) => ServiceOutcome::Catalog(catalog),
                None => ServiceOutcome::Raw(values.unwrap_or(Value::Null)),
            }
        }
        ServiceKind::NavigationMode
        | ServiceKind::MappingMode
        | ServiceKind::RemappingMode
        | ServiceKind::SaveMap
        | ServiceKind::SelectMap
        | ServiceKind::SendWaypoints => {
            let status = values
                .as_ref()
                .and_then(|v| v.get("status"))
                .and_then(Value::as_i64)
                .map(|s| s as i32)
                .unwrap_or(STATUS_MISSING);
            ServiceOutcome::Status(status)
        }
    }
}
