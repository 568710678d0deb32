//! Wire-shaped geometric value types.
//!
//! Field names match the gateway's JSON exactly so that `serde_json` can map
//! frames straight into these structs. Every field carries a default because
//! the gateway omits zero-valued members on some topics.

use serde::{Deserialize, Serialize};

/// 3-component vector (`geometry_msgs/msg/Vector3` shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Unit quaternion (`geometry_msgs/msg/Quaternion` shape). Defaults to the
/// identity rotation, not the zero quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "quat_w_identity")]
    pub w: f64,
}

fn quat_w_identity() -> f64 {
    1.0
}

impl Default for Quaternion {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 }
    }
}

impl Quaternion {
    /// Quaternion for a pure rotation of `theta` radians about the vertical
    /// axis.
    pub fn from_yaw(theta: f64) -> Self {
        let half = theta * 0.5;
        Self { x: 0.0, y: 0.0, z: half.sin(), w: half.cos() }
    }
}

/// Velocity command pair (`geometry_msgs/msg/Twist` shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    #[serde(default)]
    pub linear: Vec3,
    #[serde(default)]
    pub angular: Vec3,
}

impl Twist {
    /// Convenience constructor for the two components a differential base
    /// actually uses.
    pub fn planar(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear: Vec3::new(linear_x, 0.0, 0.0),
            angular: Vec3::new(0.0, 0.0, angular_z),
        }
    }

    /// True when every component is exactly zero (bit-for-bit stop command).
    pub fn is_zero(&self) -> bool {
        self.linear == Vec3::default() && self.angular == Vec3::default()
    }
}

/// Full 6-DOF pose (`geometry_msgs/msg/Pose` shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub orientation: Quaternion,
}

/// Planar pose (`geometry_msgs/msg/Pose2D` shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub theta: f64,
}
