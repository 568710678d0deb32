//! Inbound message types, shaped to the gateway's JSON.
//!
//! Decoding is tolerant by construction: every field has a default, the
//! legacy `nsec` stamp key is accepted alongside `nanosec`, grid cells are
//! wrapped back into signed range, and covariance rows are zero-filled when
//! the gateway sends a short array.

use serde::{Deserialize, Deserializer, Serialize};

use crate::geometry::{Pose, Quaternion, Twist, Vec3};

/// Grid cells at or above this value are reported as [`Occupancy::Occupied`].
pub const OCCUPIED_THRESHOLD: i8 = 65;

/// Message timestamp (`builtin_interfaces/msg/Time` shape).
///
/// Older gateways emit the nanoseconds member as `nsec`; both keys decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    #[serde(default)]
    pub sec: i64,
    #[serde(default, alias = "nsec")]
    pub nanosec: u32,
}

/// Standard message header (`std_msgs/msg/Header` shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub stamp: Stamp,
    #[serde(default)]
    pub frame_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Occupancy grid
// ─────────────────────────────────────────────────────────────────────────────

/// Grid metadata (`nav_msgs/msg/MapMetaData` shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    #[serde(default)]
    pub resolution: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub origin: Pose,
}

/// Occupancy grid (`nav_msgs/msg/OccupancyGrid` shape).
///
/// Cell values follow the map-server convention: `-1` unknown, `0..=100`
/// occupancy probability. The gateway serialises cells as unsigned bytes, so
/// raw values above 127 are wrapped back into signed range during decode
/// (`255` becomes `-1`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridMap {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub info: GridInfo,
    #[serde(default, deserialize_with = "signed_cells")]
    pub data: Vec<i8>,
}

/// Classification of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    Unknown,
    Free,
    Occupied,
}

impl GridMap {
    /// Raw cell value at `(x, y)`, row-major from the grid origin.
    pub fn cell(&self, x: u32, y: u32) -> Option<i8> {
        if x >= self.info.width || y >= self.info.height {
            return None;
        }
        self.data.get((y * self.info.width + x) as usize).copied()
    }

    /// Classified occupancy at `(x, y)`.
    pub fn occupancy(&self, x: u32, y: u32) -> Option<Occupancy> {
        self.cell(x, y).map(|v| {
            if v < 0 {
                Occupancy::Unknown
            } else if v >= OCCUPIED_THRESHOLD {
                Occupancy::Occupied
            } else {
                Occupancy::Free
            }
        })
    }
}

fn signed_cells<'de, D>(deserializer: D) -> Result<Vec<i8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<i64>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|v| if v > 127 { (v - 256) as i8 } else { v as i8 })
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Laser scan
// ─────────────────────────────────────────────────────────────────────────────

/// Planar laser scan (`sensor_msgs/msg/LaserScan` shape).
///
/// The gateway serialises out-of-range readings as JSON `null`; those decode
/// as `NaN` so that index positions stay aligned with the beam angles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub angle_min: f64,
    #[serde(default)]
    pub angle_max: f64,
    #[serde(default)]
    pub angle_increment: f64,
    #[serde(default)]
    pub range_min: f64,
    #[serde(default)]
    pub range_max: f64,
    #[serde(default, deserialize_with = "nullable_readings")]
    pub ranges: Vec<f64>,
    #[serde(default, deserialize_with = "nullable_readings")]
    pub intensities: Vec<f64>,
}

fn nullable_readings<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Odometry
// ─────────────────────────────────────────────────────────────────────────────

/// Pose plus row-major 6×6 covariance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    #[serde(default)]
    pub pose: Pose,
    #[serde(default = "zero_covariance", deserialize_with = "covariance36")]
    pub covariance: Vec<f64>,
}

/// Twist plus row-major 6×6 covariance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    #[serde(default)]
    pub twist: Twist,
    #[serde(default = "zero_covariance", deserialize_with = "covariance36")]
    pub covariance: Vec<f64>,
}

/// Odometry estimate (`nav_msgs/msg/Odometry` shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub child_frame_id: String,
    #[serde(default)]
    pub pose: PoseWithCovariance,
    #[serde(default)]
    pub twist: TwistWithCovariance,
}

fn zero_covariance() -> Vec<f64> {
    vec![0.0; 36]
}

/// Zero-fill (or truncate) the covariance array to exactly 36 entries.
fn covariance36<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut raw = Vec::<f64>::deserialize(deserializer)?;
    raw.resize(36, 0.0);
    Ok(raw)
}

// ─────────────────────────────────────────────────────────────────────────────
// Transforms
// ─────────────────────────────────────────────────────────────────────────────

/// Rigid transform (`geometry_msgs/msg/Transform` shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub translation: Vec3,
    #[serde(default)]
    pub rotation: Quaternion,
}

/// A single parent→child transform (`geometry_msgs/msg/TransformStamped`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub child_frame_id: String,
    #[serde(default)]
    pub transform: Transform,
}

/// Batch of transforms as published on a `/tf` topic (`tf2_msgs/msg/TFMessage`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformTree {
    #[serde(default)]
    pub transforms: Vec<TransformStamped>,
}

/// The two halves of the localisation chain, emitted together so that
/// consumers never observe a half-updated tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformPair {
    /// `map` → `odom` (localisation correction).
    pub map_odom: TransformStamped,
    /// `odom` → `base_footprint` (dead-reckoned base pose).
    pub odom_base: TransformStamped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_grid(width: u32, height: u32, data: &str) -> GridMap {
        let json = format!(
            r#"{{"info":{{"width":{width},"height":{height},"resolution":1.0,
                 "origin":{{"position":{{"x":0,"y":0}}}}}},"data":{data}}}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn grid_cells_wrap_into_signed_range() {
        let grid = make_grid(4, 1, "[0, 100, 255, 128]");
        assert_eq!(grid.data, vec![0, 100, -1, -128]);
    }

    #[test]
    fn grid_occupancy_classifies_free_and_occupied() {
        let grid = make_grid(2, 1, "[0, 100]");
        assert_eq!(grid.occupancy(0, 0), Some(Occupancy::Free));
        assert_eq!(grid.occupancy(1, 0), Some(Occupancy::Occupied));
    }

    #[test]
    fn grid_occupancy_reports_unknown_for_negative_cells() {
        let grid = make_grid(1, 1, "[255]");
        assert_eq!(grid.cell(0, 0), Some(-1));
        assert_eq!(grid.occupancy(0, 0), Some(Occupancy::Unknown));
    }

    #[test]
    fn grid_cell_out_of_bounds_is_none() {
        let grid = make_grid(2, 1, "[0, 100]");
        assert_eq!(grid.cell(2, 0), None);
        assert_eq!(grid.cell(0, 1), None);
    }

    #[test]
    fn stamp_accepts_legacy_nsec_key() {
        let s: Stamp = serde_json::from_str(r#"{"sec": 12, "nsec": 500}"#).unwrap();
        assert_eq!(s.sec, 12);
        assert_eq!(s.nanosec, 500);

        let s2: Stamp = serde_json::from_str(r#"{"sec": 12, "nanosec": 700}"#).unwrap();
        assert_eq!(s2.nanosec, 700);
    }

    #[test]
    fn odometry_short_covariance_is_zero_filled() {
        let odom: Odometry = serde_json::from_str(
            r#"{"header":{"frame_id":"odom"},
                "child_frame_id":"base_footprint",
                "pose":{"pose":{"position":{"x":1.0}},"covariance":[0.1,0.2]},
                "twist":{"twist":{"linear":{"x":0.5}}}}"#,
        )
        .unwrap();
        assert_eq!(odom.pose.covariance.len(), 36);
        assert!((odom.pose.covariance[0] - 0.1).abs() < f64::EPSILON);
        assert_eq!(odom.pose.covariance[35], 0.0);
        assert_eq!(odom.twist.covariance.len(), 36);
    }

    #[test]
    fn laser_scan_null_readings_become_nan() {
        let scan: LaserScan = serde_json::from_str(
            r#"{"angle_min":-1.57,"angle_max":1.57,"angle_increment":0.01,
                "range_min":0.1,"range_max":10.0,
                "ranges":[1.0,null,2.5],"intensities":[]}"#,
        )
        .unwrap();
        assert_eq!(scan.ranges.len(), 3);
        assert!(scan.ranges[1].is_nan());
        assert!((scan.ranges[2] - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn transform_tree_decodes_batch() {
        let tree: TransformTree = serde_json::from_str(
            r#"{"transforms":[
                 {"header":{"frame_id":"map","stamp":{"sec":1,"nanosec":2}},
                  "child_frame_id":"odom",
                  "transform":{"translation":{"x":1.0},"rotation":{"w":1.0}}}]}"#,
        )
        .unwrap();
        assert_eq!(tree.transforms.len(), 1);
        assert_eq!(tree.transforms[0].header.frame_id, "map");
        assert_eq!(tree.transforms[0].child_frame_id, "odom");
        assert_eq!(tree.transforms[0].transform.translation.x, 1.0);
    }
}
