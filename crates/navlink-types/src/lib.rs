//! `navlink-types` – shared vocabulary of the navlink workspace.
//!
//! Everything that crosses a crate boundary lives here:
//!
//! - [`geometry`] – small value types shaped like the gateway's wire JSON
//!   (vectors, quaternions, twists, planar poses).
//! - [`msg`] – full inbound message types (occupancy grid, laser scan,
//!   odometry, transform tree) with tolerant decoding helpers.
//! - [`event`] – the typed event surface the bridge emits upward, plus the
//!   service-call vocabulary.
//! - [`error`] – the crate-wide [`BridgeError`] enum.

pub mod error;
pub mod event;
pub mod geometry;
pub mod msg;

pub use error::BridgeError;
pub use event::{
    BridgeEvent, BridgePayload, ConnectionState, MapCatalog, ServiceKind, ServiceOutcome,
    TopicKind, Waypoint, STATUS_MISSING,
};
pub use geometry::{Pose, Pose2D, Quaternion, Twist, Vec3};
pub use msg::{
    GridMap, Header, LaserScan, Occupancy, Odometry, Stamp, TransformPair, TransformStamped,
    TransformTree,
};
