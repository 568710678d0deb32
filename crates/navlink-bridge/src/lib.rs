//! `navlink-bridge` – client-side bridge to a robotic middleware gateway.
//!
//! Speaks the JSON-over-WebSocket publish/subscribe/RPC protocol of a
//! rosbridge-style gateway and exposes typed events to the application.
//!
//! # Modules
//!
//! - [`codec`] – pure encode/decode of the wire protocol's JSON frames.
//! - [`registry`] – idempotent subscription bookkeeping and reconnect replay.
//! - [`correlator`] – request ids and pending-call tracking for service RPC.
//! - [`publisher`] – the 20 Hz change-detecting command publisher.
//! - [`dispatch`] – typed decoding of inbound publishes and responses,
//!   including transform-pair composition.
//! - [`core`] – the synchronous connection state machine owning all state.
//! - [`client`] – the Tokio IO task plus the cheap-clone [`BridgeHandle`].
//! - [`config`] – [`BridgeConfig`], the construction parameters.
//!
//! # Example
//!
//! ```rust,no_run
//! use navlink_bridge::{BridgeConfig, spawn};
//! use navlink_types::TopicKind;
//!
//! # async fn demo() -> Result<(), navlink_types::BridgeError> {
//! let handle = spawn(BridgeConfig::default());
//! let mut events = handle.events();
//! handle.subscribe("/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid).await?;
//! handle.connect().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event.payload);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod core;
pub mod correlator;
pub mod dispatch;
pub mod publisher;
pub mod registry;

pub use client::{BridgeHandle, RECONNECT_DELAY, spawn};
pub use config::BridgeConfig;
pub use core::{BridgeCore, Command, Directive};
