//! Connection-manager brain.
//!
//! [`BridgeCore`] owns every piece of bridge state: the subscription
//! registry, the request correlator, the command publisher and the transform
//! composer. It is fully synchronous; the surrounding task in [`crate::client`]
//! feeds it marshalled commands, socket lifecycle events, inbound frames and
//! timer ticks, then writes whatever lands in the outbound frame queue to the
//! socket. Keeping the brain free of IO means every state-machine property
//! can be exercised without a socket.

use chrono::Duration;
use navlink_types::{
    BridgeError, BridgeEvent, BridgePayload, ConnectionState, ServiceKind, TopicKind, Twist,
};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::BridgeConfig;
use crate::correlator::{REQUEST_TIMEOUT_SECS, RequestCorrelator};
use crate::dispatch::{self, TransformComposer};
use crate::publisher::CommandPublisher;
use crate::registry::SubscriptionRegistry;

/// Public API calls, marshalled onto the bridge task's command channel.
#[derive(Debug)]
pub enum Command {
    Connect,
    Disconnect,
    Subscribe { topic: String, message_type: String, kind: TopicKind },
    Unsubscribe { topic: String },
    SetCommand(Twist),
    SetCommandStreamEnabled(bool),
    CallService {
        kind: ServiceKind,
        service: String,
        args: Value,
        reply: oneshot::Sender<Result<String, BridgeError>>,
    },
}

/// What the surrounding IO task must do after the core handled an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    None,
    /// Initiate a WebSocket connect to [`BridgeCore::endpoint`].
    OpenSocket,
    /// Drop the socket and cancel any pending reconnect.
    CloseSocket,
}

/// The single-writer state machine behind the bridge.
pub struct BridgeCore {
    config: BridgeConfig,
    state: ConnectionState,
    registry: SubscriptionRegistry,
    correlator: RequestCorrelator,
    publisher: CommandPublisher,
    composer: TransformComposer,
    outbox: Vec<String>,
    events: broadcast::Sender<BridgeEvent>,
    manual_disconnect: bool,
}

impl BridgeCore {
    pub fn new(config: BridgeConfig, events: broadcast::Sender<BridgeEvent>) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            registry: SubscriptionRegistry::new(),
            correlator: RequestCorrelator::new(),
            publisher: CommandPublisher::new(),
            composer: TransformComposer::new(),
            outbox: Vec::new(),
            events,
            manual_disconnect: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> String {
        self.config.endpoint()
    }

    /// Frames queued since the last call, oldest first.
    pub fn take_outbox(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Command handling
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle_command(&mut self, command: Command) -> Directive {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Subscribe { topic, message_type, kind } => {
                self.subscribe(&topic, &message_type, kind);
                Directive::None
            }
            Command::Unsubscribe { topic } => {
                self.unsubscribe(&topic);
                Directive::None
            }
            Command::SetCommand(twist) => {
                self.publisher.set_desired(twist);
                Directive::None
            }
            Command::SetCommandStreamEnabled(enabled) => {
                self.publisher.set_enabled(enabled);
                Directive::None
            }
            Command::CallService { kind, service, args, reply } => {
                let _ = reply.send(self.call_service(kind, &service, &args));
                Directive::None
            }
        }
    }

    fn connect(&mut self) -> Directive {
        if self.state != ConnectionState::Disconnected {
            return Directive::None;
        }
        self.manual_disconnect = false;
        self.state = ConnectionState::Connecting;
        Directive::OpenSocket
    }

    fn disconnect(&mut self) -> Directive {
        self.manual_disconnect = true;
        if self.state == ConnectionState::Disconnected {
            return Directive::CloseSocket;
        }
        self.state = ConnectionState::Disconnected;
        self.correlator.clear();
        self.emit(BridgePayload::Disconnected);
        Directive::CloseSocket
    }

    /// The one-shot reconnect timer fired. Reconnect only while demand
    /// still exists and the user has not explicitly disconnected.
    pub fn reconnect_due(&mut self) -> Directive {
        if self.state != ConnectionState::Disconnected
            || self.manual_disconnect
            || !self.registry.has_active()
        {
            return Directive::None;
        }
        debug!("reconnect timer fired, retrying");
        self.state = ConnectionState::Connecting;
        Directive::OpenSocket
    }

    fn subscribe(&mut self, topic: &str, message_type: &str, kind: TopicKind) {
        let wire_topic = self.config.wire_name(topic);
        if self.registry.activate(&wire_topic, message_type, kind)
            && self.state == ConnectionState::Connected
        {
            self.outbox.push(codec::encode_subscribe(&wire_topic, message_type));
        }
    }

    fn unsubscribe(&mut self, topic: &str) {
        let wire_topic = self.config.wire_name(topic);
        if self.registry.deactivate(&wire_topic) && self.state == ConnectionState::Connected {
            self.outbox.push(codec::encode_unsubscribe(&wire_topic));
        }
    }

    /// Register and send a one-shot service call, returning its wire id.
    ///
    /// # Errors
    ///
    /// Fails fast with [`BridgeError::NotConnected`] while the socket is not
    /// open; service calls are never queued.
    pub fn call_service(
        &mut self,
        kind: ServiceKind,
        service: &str,
        args: &Value,
    ) -> Result<String, BridgeError> {
        if self.state != ConnectionState::Connected {
            return Err(BridgeError::NotConnected);
        }
        let id = self.correlator.begin(kind);
        let wire_service = self.config.wire_name(service);
        self.outbox.push(codec::encode_call_service(&wire_service, args, &id));
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Socket lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// The socket opened: replay every active subscription and announce the
    /// connection upward.
    pub fn on_socket_open(&mut self) {
        self.state = ConnectionState::Connected;
        let mut replayed = 0usize;
        for sub in self.registry.active() {
            self.outbox.push(codec::encode_subscribe(&sub.wire_topic, &sub.message_type));
            replayed += 1;
        }
        info!(endpoint = self.config.endpoint(), replayed, "gateway connected");
        self.emit(BridgePayload::Connected);
    }

    /// The socket closed or failed. Returns `true` when the IO task must arm
    /// the one-shot reconnect timer.
    pub fn on_socket_closed(&mut self, error: Option<String>) -> bool {
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        // Abandoned calls never see a completion.
        self.correlator.clear();

        if let Some(message) = error {
            warn!(error = message, "gateway link lost");
            self.emit(BridgePayload::Error { message });
        }
        if previous != ConnectionState::Disconnected {
            self.emit(BridgePayload::Disconnected);
        }
        self.registry.has_active() && !self.manual_disconnect
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timers and inbound frames
    // ─────────────────────────────────────────────────────────────────────

    /// One 20 Hz tick: publish a dirty command and prune stale calls.
    pub fn on_tick(&mut self) {
        if let Some(twist) = self.publisher.on_tick(self.state == ConnectionState::Connected)
            && let Ok(msg) = serde_json::to_value(twist)
        {
            let wire_topic = self.config.wire_name(&self.config.command_topic);
            self.outbox.push(codec::encode_publish(&wire_topic, &msg));
        }
        self.correlator.prune(Duration::seconds(REQUEST_TIMEOUT_SECS));
    }

    /// Process one inbound text frame in arrival order.
    pub fn handle_frame(&mut self, text: &str) {
        let envelope = match codec::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "inbound frame dropped");
                return;
            }
        };

        match envelope.op.as_str() {
            "publish" => {
                let Some(topic) = envelope.topic else {
                    debug!("publish without a topic dropped");
                    return;
                };
                let msg = envelope.msg.unwrap_or(Value::Null);
                let kind =
                    self.registry.get(&topic).map(|s| s.kind).unwrap_or(TopicKind::Raw);
                if let Some(payload) =
                    dispatch::dispatch_publish(kind, &topic, msg, &mut self.composer)
                {
                    self.emit(payload);
                }
            }
            "service_response" => {
                let Some(id) = envelope.id else {
                    debug!("service_response without an id dropped");
                    return;
                };
                match self.correlator.resolve(&id) {
                    Some(kind) => {
                        let outcome = dispatch::decode_service_outcome(
                            kind,
                            envelope.values,
                            envelope.result,
                        );
                        self.emit(BridgePayload::Service { kind, outcome });
                    }
                    None => debug!(id, "unmatched service_response dropped"),
                }
            }
            other => debug!(op = other, "unknown op ignored"),
        }
    }

    fn emit(&self, payload: BridgePayload) {
        // No receivers is fine; consumers come and go.
        let _ = self.events.send(BridgeEvent::new(payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navlink_types::{Occupancy, ServiceOutcome};
    use serde_json::json;

    fn make_core() -> (BridgeCore, broadcast::Receiver<BridgeEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let config = BridgeConfig { namespace: "/r1".to_string(), ..Default::default() };
        (BridgeCore::new(config, tx), rx)
    }

    fn open(core: &mut BridgeCore) {
        assert_eq!(core.handle_command(Command::Connect), Directive::OpenSocket);
        core.on_socket_open();
    }

    fn subscribe(core: &mut BridgeCore, topic: &str, message_type: &str, kind: TopicKind) {
        core.handle_command(Command::Subscribe {
            topic: topic.to_string(),
            message_type: message_type.to_string(),
            kind,
        });
    }

    fn payloads(rx: &mut broadcast::Receiver<BridgeEvent>) -> Vec<BridgePayload> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.payload);
        }
        out
    }

    #[test]
    fn subscribe_twice_sends_one_frame() {
        let (mut core, _rx) = make_core();
        open(&mut core);
        core.take_outbox();

        subscribe(&mut core, "/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid);
        subscribe(&mut core, "/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid);

        let frames = core.take_outbox();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains(r#""op":"subscribe""#));
        assert!(frames[0].contains("/r1/map"));
    }

    #[test]
    fn subscribe_while_disconnected_flushes_on_connect() {
        let (mut core, _rx) = make_core();
        subscribe(&mut core, "/scan", "sensor_msgs/msg/LaserScan", TopicKind::LaserScan);
        assert!(core.take_outbox().is_empty(), "no socket, no frame");

        open(&mut core);
        let frames = core.take_outbox();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("/r1/scan"));
    }

    #[test]
    fn reconnect_replays_active_set_only() {
        let (mut core, _rx) = make_core();
        open(&mut core);
        subscribe(&mut core, "/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid);
        subscribe(&mut core, "/odom", "nav_msgs/msg/Odometry", TopicKind::Odometry);
        core.handle_command(Command::Unsubscribe { topic: "/odom".to_string() });
        core.take_outbox();

        assert!(core.on_socket_closed(Some("broken pipe".to_string())));
        core.reconnect_due();
        core.on_socket_open();

        let frames = core.take_outbox();
        assert_eq!(frames.len(), 1, "exactly one frame per active topic");
        assert!(frames[0].contains("/r1/map"));
    }

    #[test]
    fn connect_is_noop_while_connecting_or_connected() {
        let (mut core, _rx) = make_core();
        assert_eq!(core.handle_command(Command::Connect), Directive::OpenSocket);
        assert_eq!(core.state(), ConnectionState::Connecting);
        assert_eq!(core.handle_command(Command::Connect), Directive::None);

        core.on_socket_open();
        assert_eq!(core.handle_command(Command::Connect), Directive::None);
    }

    #[test]
    fn transport_loss_arms_reconnect_only_with_demand() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        assert!(
            !core.on_socket_closed(Some("reset by peer".to_string())),
            "no active subscription, no reconnect"
        );

        let events = payloads(&mut rx);
        assert!(events.iter().any(|p| matches!(p, BridgePayload::Error { .. })));
        assert!(events.iter().any(|p| matches!(p, BridgePayload::Disconnected)));

        core.handle_command(Command::Connect);
        core.on_socket_open();
        subscribe(&mut core, "/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid);
        assert!(core.on_socket_closed(None), "active subscription must arm reconnect");
    }

    #[test]
    fn manual_disconnect_suppresses_reconnect() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        subscribe(&mut core, "/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid);

        assert_eq!(core.handle_command(Command::Disconnect), Directive::CloseSocket);
        assert_eq!(core.state(), ConnectionState::Disconnected);
        assert!(payloads(&mut rx).iter().any(|p| matches!(p, BridgePayload::Disconnected)));

        assert_eq!(core.reconnect_due(), Directive::None);

        // An explicit reconnect still works and resumes the same set.
        open(&mut core);
        let frames = core.take_outbox();
        assert!(frames.iter().any(|f| f.contains("/r1/map")));
    }

    #[test]
    fn call_service_fails_fast_while_disconnected() {
        let (mut core, _rx) = make_core();
        let err = core.call_service(ServiceKind::Handshake, "/map_manager", &json!({}));
        assert_eq!(err, Err(BridgeError::NotConnected));
    }

    #[test]
    fn service_response_resolves_exactly_once() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        payloads(&mut rx);

        let id = core
            .call_service(ServiceKind::SaveMap, "/map_manager", &json!({"request_string": "SaveMap"}))
            .unwrap();
        let frames = core.take_outbox();
        assert!(frames.iter().any(|f| f.contains(&id) && f.contains("/r1/map_manager")));

        let frame =
            format!(r#"{{"op":"service_response","id":"{id}","values":{{"status":1}}}}"#);
        core.handle_frame(&frame);
        core.handle_frame(&frame);

        let events = payloads(&mut rx);
        let services: Vec<_> = events
            .iter()
            .filter(|p| matches!(p, BridgePayload::Service { .. }))
            .collect();
        assert_eq!(services.len(), 1, "the completion must fire exactly once");
        let BridgePayload::Service { kind, outcome } = services[0] else {
            unreachable!();
        };
        assert_eq!(*kind, ServiceKind::SaveMap);
        assert_eq!(*outcome, ServiceOutcome::Status(1));
    }

    #[test]
    fn unknown_response_id_emits_nothing() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        payloads(&mut rx);

        core.call_service(ServiceKind::ListMaps, "/map_manager", &json!({})).unwrap();
        core.handle_frame(r#"{"op":"service_response","id":"get_maps_0","values":{}}"#);
        assert!(payloads(&mut rx).is_empty());
    }

    #[test]
    fn disconnect_abandons_pending_calls() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        let id = core.call_service(ServiceKind::FetchMap, "/map_server/map", &json!({})).unwrap();

        core.on_socket_closed(None);
        core.reconnect_due();
        core.on_socket_open();
        payloads(&mut rx);

        core.handle_frame(&format!(
            r#"{{"op":"service_response","id":"{id}","result":{{"map":{{}}}}}}"#
        ));
        assert!(payloads(&mut rx).is_empty(), "a pre-disconnect id must not resolve");
    }

    #[test]
    fn dirty_command_publishes_once_on_tick() {
        let (mut core, _rx) = make_core();
        open(&mut core);
        core.take_outbox();

        core.handle_command(Command::SetCommand(Twist::planar(0.5, 0.0)));
        core.on_tick();

        let frames = core.take_outbox();
        assert_eq!(frames.len(), 1);
        let v: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(v["op"], "publish");
        assert_eq!(v["topic"], "/r1/cmd_vel");
        assert_eq!(v["msg"]["linear"]["x"], 0.5);

        core.on_tick();
        assert!(core.take_outbox().is_empty(), "clean state must not republish");
    }

    #[test]
    fn command_stream_gate_holds_publishes() {
        let (mut core, _rx) = make_core();
        open(&mut core);
        core.take_outbox();

        core.handle_command(Command::SetCommandStreamEnabled(false));
        core.handle_command(Command::SetCommand(Twist::planar(0.2, 0.0)));
        core.on_tick();
        assert!(core.take_outbox().is_empty());

        core.handle_command(Command::SetCommandStreamEnabled(true));
        core.on_tick();
        assert_eq!(core.take_outbox().len(), 1);
    }

    #[test]
    fn malformed_frame_changes_nothing() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        payloads(&mut rx);

        core.handle_frame("not json");
        core.handle_frame("[1,2,3]");

        assert!(payloads(&mut rx).is_empty());
        assert_eq!(core.state(), ConnectionState::Connected);
        assert!(core.take_outbox().is_empty());
    }

    #[test]
    fn unregistered_topic_arrives_as_raw_event() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        payloads(&mut rx);

        core.handle_frame(r#"{"op":"publish","topic":"/r1/battery","msg":{"level":0.9}}"#);
        let events = payloads(&mut rx);
        assert_eq!(events.len(), 1);
        let BridgePayload::Topic { topic, payload } = &events[0] else {
            panic!("expected a raw topic event");
        };
        assert_eq!(topic, "/r1/battery");
        assert_eq!(payload["level"], 0.9);
    }

    #[test]
    fn transform_frames_pair_before_emitting() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        subscribe(&mut core, "/tf", "tf2_msgs/msg/TFMessage", TopicKind::TransformTree);
        payloads(&mut rx);

        let odom_base = r#"{"op":"publish","topic":"/r1/tf","msg":{"transforms":[
            {"header":{"frame_id":"odom"},"child_frame_id":"base_footprint",
             "transform":{"translation":{"x":3.0},"rotation":{"w":1.0}}}]}}"#;
        let map_odom = r#"{"op":"publish","topic":"/r1/tf","msg":{"transforms":[
            {"header":{"frame_id":"map"},"child_frame_id":"odom",
             "transform":{"translation":{"x":2.0},"rotation":{"w":1.0}}}]}}"#;

        core.handle_frame(odom_base);
        assert!(payloads(&mut rx).is_empty(), "half a chain must stay silent");

        core.handle_frame(map_odom);
        core.handle_frame(odom_base);
        let events = payloads(&mut rx);
        assert_eq!(events.len(), 1);
        let BridgePayload::Transform(pair) = &events[0] else {
            panic!("expected a composed transform");
        };
        assert_eq!(pair.map_odom.transform.translation.x, 2.0);
        assert_eq!(pair.odom_base.transform.translation.x, 3.0);
    }

    #[test]
    fn subscribed_map_topic_delivers_typed_grid() {
        let (mut core, mut rx) = make_core();
        open(&mut core);
        subscribe(&mut core, "/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid);
        payloads(&mut rx);

        core.handle_frame(
            r#"{"op":"publish","topic":"/r1/map","msg":{
                "info":{"width":2,"height":1,"resolution":1.0,
                        "origin":{"position":{"x":0,"y":0}}},
                "data":[0,100]}}"#,
        );

        let events = payloads(&mut rx);
        assert_eq!(events.len(), 1);
        let BridgePayload::Map(grid) = &events[0] else {
            panic!("expected a map event");
        };
        assert_eq!(grid.info.width, 2);
        assert_eq!(grid.info.height, 1);
        assert_eq!(grid.occupancy(0, 0), Some(Occupancy::Free));
        assert_eq!(grid.occupancy(1, 0), Some(Occupancy::Occupied));
    }
}
