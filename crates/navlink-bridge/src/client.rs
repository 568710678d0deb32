//! Bridge task and the cloneable [`BridgeHandle`].
//!
//! [`spawn`] starts one Tokio task that owns the [`BridgeCore`] and performs
//! all IO: it selects over the command channel, the WebSocket stream, the
//! 20 Hz publish tick and the one-shot reconnect timer, and flushes the
//! core's outbound frames after every step. All public calls are marshalled
//! through the command channel, so no lock ever guards bridge state.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use navlink_types::{
    BridgeError, BridgeEvent, ConnectionState, Quaternion, ServiceKind, TopicKind, Twist, Waypoint,
};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, interval, sleep_until};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::core::{BridgeCore, Command, Directive};
use crate::publisher::PUBLISH_PERIOD_MS;

/// Delay of the one-shot reconnect timer.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawn the bridge task. Must be called from within a Tokio runtime.
pub fn spawn(config: BridgeConfig) -> BridgeHandle {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, _) = broadcast::channel(256);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let core = BridgeCore::new(config.clone(), event_tx.clone());
    tokio::spawn(run(core, command_rx, state_tx));

    BridgeHandle { config, commands: command_tx, events: event_tx, state: state_rx }
}

/// Cheap-clone front door of the bridge.
///
/// Every method marshals its call onto the bridge task; decoded traffic
/// flows back on the broadcast channel returned by [`BridgeHandle::events`].
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    config: BridgeConfig,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<BridgeEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl BridgeHandle {
    /// Subscribe to the bridge's event stream. Slow consumers may lag and
    /// lose events; the stream itself never blocks the bridge.
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub async fn connect(&self) -> Result<(), BridgeError> {
        self.send(Command::Connect).await
    }

    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        self.send(Command::Disconnect).await
    }

    pub async fn subscribe(
        &self,
        topic: &str,
        message_type: &str,
        kind: TopicKind,
    ) -> Result<(), BridgeError> {
        self.send(Command::Subscribe {
            topic: topic.to_string(),
            message_type: message_type.to_string(),
            kind,
        })
        .await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), BridgeError> {
        self.send(Command::Unsubscribe { topic: topic.to_string() }).await
    }

    /// Update the desired base velocity; the 20 Hz tick publishes it once if
    /// it differs from the previous desired value.
    pub async fn set_command(&self, twist: Twist) -> Result<(), BridgeError> {
        self.send(Command::SetCommand(twist)).await
    }

    pub async fn set_command_stream_enabled(&self, enabled: bool) -> Result<(), BridgeError> {
        self.send(Command::SetCommandStreamEnabled(enabled)).await
    }

    /// Issue a one-shot service call and return its wire id. The decoded
    /// reply arrives later as a service event.
    pub async fn call_service(
        &self,
        kind: ServiceKind,
        service: &str,
        args: Value,
    ) -> Result<String, BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::CallService {
            kind,
            service: service.to_string(),
            args,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| BridgeError::ChannelClosed)?
    }

    // ─────────────────────────────────────────────────────────────────────
    // Map-manager convenience calls
    // ─────────────────────────────────────────────────────────────────────

    pub async fn handshake(&self) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::Handshake, "GetHandshake", "", "").await
    }

    pub async fn set_navigation_mode(&self) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::NavigationMode, "SetNavigationMode", "", "").await
    }

    pub async fn set_mapping_mode(&self) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::MappingMode, "SetMappingMode", "", "").await
    }

    pub async fn set_remapping_mode(&self) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::RemappingMode, "SetRemappingMode", "", "").await
    }

    pub async fn list_maps(&self) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::ListMaps, "GetMapList", "", "").await
    }

    pub async fn save_map(&self, name: &str) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::SaveMap, "SaveMap", name, "").await
    }

    pub async fn select_map(&self, name: &str) -> Result<String, BridgeError> {
        self.map_manager(ServiceKind::SelectMap, "SelectMap", "", name).await
    }

    /// Fetch the current occupancy grid from the map server.
    pub async fn fetch_map(&self) -> Result<String, BridgeError> {
        self.call_service(ServiceKind::FetchMap, "/map_server/map", json!({})).await
    }

    /// Send an ordered waypoint route to the task constructor service. The
    /// reply is a bare status code.
    pub async fn send_waypoints(&self, waypoints: &[Waypoint]) -> Result<String, BridgeError> {
        self.call_service(
            ServiceKind::SendWaypoints,
            "/construct_yaml_and_bt",
            route_args(waypoints),
        )
        .await
    }

    async fn map_manager(
        &self,
        kind: ServiceKind,
        request_string: &str,
        save_name: &str,
        select_name: &str,
    ) -> Result<String, BridgeError> {
        let args = json!({
            "request_string": request_string,
            "map_name_to_save": save_name,
            "map_name_to_select": select_name,
            "login_access_token": self.config.access_token,
        });
        self.call_service(kind, &self.config.map_service, args).await
    }

    async fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.commands.send(command).await.map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Argument object of the waypoint-route service: parallel arrays of pose
/// names and map-frame stamped poses, with the planar heading converted to a
/// quaternion.
fn route_args(waypoints: &[Waypoint]) -> Value {
    let pose_names: Vec<&str> = waypoints.iter().map(|w| w.name.as_str()).collect();
    let poses: Vec<Value> = waypoints
        .iter()
        .map(|w| {
            let q = Quaternion::from_yaw(w.pose.theta);
            json!({
                "header": {"stamp": {"sec": 0, "nanosec": 0}, "frame_id": "map"},
                "pose": {
                    "position": {"x": w.pose.x, "y": w.pose.y, "z": 0.0},
                    "orientation": q,
                },
            })
        })
        .collect();
    json!({
        "pose_names": pose_names,
        "poses": poses,
        "mode": "waypoints_mode",
        "loop": false,
        "command": "",
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// The IO task
// ─────────────────────────────────────────────────────────────────────────────

async fn run(
    mut core: BridgeCore,
    mut commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut socket: Option<WsStream> = None;
    let mut reconnect_at: Option<Instant> = None;
    let mut tick = interval(Duration::from_millis(PUBLISH_PERIOD_MS));

    loop {
        state_tx.send_replace(core.state());

        tokio::select! {
            command = commands.recv() => {
                // All handles dropped: the bridge winds down.
                let Some(command) = command else { break };
                match core.handle_command(command) {
                    Directive::OpenSocket => {
                        open_socket(&mut core, &mut socket, &mut reconnect_at).await;
                    }
                    Directive::CloseSocket => {
                        socket = None;
                        reconnect_at = None;
                    }
                    Directive::None => {}
                }
            }
            frame = next_frame(&mut socket) => {
                match frame {
                    Some(Ok(Message::Text(text))) => core.handle_frame(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        socket = None;
                        if core.on_socket_closed(None) {
                            reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
                        }
                    }
                    Some(Err(e)) => {
                        socket = None;
                        if core.on_socket_closed(Some(e.to_string())) {
                            reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
                        }
                    }
                    // Binary, ping and pong frames carry nothing for us.
                    Some(Ok(_)) => {}
                }
            }
            _ = tick.tick() => core.on_tick(),
            _ = fire_at(reconnect_at) => {
                reconnect_at = None;
                if core.reconnect_due() == Directive::OpenSocket {
                    open_socket(&mut core, &mut socket, &mut reconnect_at).await;
                }
            }
        }

        flush(&mut core, &mut socket, &mut reconnect_at).await;
    }

    debug!("bridge task stopped");
}

/// Next inbound frame, or pending forever while there is no socket.
async fn next_frame(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the reconnect deadline, or pending forever while unarmed.
async fn fire_at(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn open_socket(
    core: &mut BridgeCore,
    socket: &mut Option<WsStream>,
    reconnect_at: &mut Option<Instant>,
) {
    let endpoint = core.endpoint();
    debug!(endpoint, "opening gateway socket");
    match connect_async(&endpoint).await {
        Ok((stream, _)) => {
            *socket = Some(stream);
            core.on_socket_open();
        }
        Err(e) => {
            warn!(endpoint, error = %e, "gateway connect failed");
            if core.on_socket_closed(Some(e.to_string())) {
                *reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
            }
        }
    }
}

/// Write every queued frame; a write failure counts as a transport loss.
async fn flush(
    core: &mut BridgeCore,
    socket: &mut Option<WsStream>,
    reconnect_at: &mut Option<Instant>,
) {
    let frames = core.take_outbox();
    if frames.is_empty() {
        return;
    }
    let Some(stream) = socket.as_mut() else {
        debug!(dropped = frames.len(), "outbound frames dropped, no socket");
        return;
    };

    let mut failure: Option<String> = None;
    for frame in frames {
        if let Err(e) = stream.send(Message::Text(frame.into())).await {
            failure = Some(e.to_string());
            break;
        }
    }
    if let Some(message) = failure {
        *socket = None;
        if core.on_socket_closed(Some(message)) {
            *reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navlink_types::{BridgePayload, Pose2D};
    use tokio_tungstenite::accept_async;

    fn test_config(port: u16) -> BridgeConfig {
        BridgeConfig { port, namespace: "/r1".to_string(), ..Default::default() }
    }

    #[test]
    fn route_args_builds_parallel_pose_arrays() {
        let route = vec![
            Waypoint { name: "dock".to_string(), pose: Pose2D { x: 1.0, y: 2.0, theta: 0.0 } },
            Waypoint {
                name: "door".to_string(),
                pose: Pose2D { x: 3.0, y: 4.0, theta: std::f64::consts::PI },
            },
        ];
        let args = route_args(&route);

        assert_eq!(args["pose_names"], json!(["dock", "door"]));
        assert_eq!(args["poses"][0]["header"]["frame_id"], "map");
        assert_eq!(args["poses"][0]["pose"]["position"]["x"], 1.0);
        assert_eq!(args["poses"][0]["pose"]["orientation"]["w"], 1.0);
        let half_turn_z = args["poses"][1]["pose"]["orientation"]["z"].as_f64().unwrap();
        assert!((half_turn_z - 1.0).abs() < 1e-12, "pi yaw must map to z=1");
        assert_eq!(args["mode"], "waypoints_mode");
        assert_eq!(args["loop"], false);
    }

    #[tokio::test]
    async fn handle_starts_disconnected() {
        let handle = spawn(test_config(9090));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn call_service_without_connection_fails_fast() {
        let handle = spawn(test_config(9090));
        let result = handle.handshake().await;
        assert_eq!(result, Err(BridgeError::NotConnected));
    }

    #[tokio::test]
    async fn refused_connect_surfaces_an_error_event() {
        // Port 1 is never a WebSocket server on loopback.
        let handle = spawn(test_config(1));
        let mut events = handle.events();

        handle.connect().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(
            matches!(event.payload, BridgePayload::Error { .. }),
            "expected an error event, got {:?}",
            event.payload
        );
    }

    #[tokio::test]
    async fn queued_subscription_replays_to_a_live_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Minimal gateway: accept one client, hand back the first frame it
        // sends, then push one map publish.
        let gateway = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let first = loop {
                match ws.next().await.unwrap().unwrap() {
                    Message::Text(text) => break text.to_string(),
                    _ => continue,
                }
            };
            ws.send(Message::Text(
                r#"{"op":"publish","topic":"/r1/map","msg":{
                    "info":{"width":2,"height":1,"resolution":1.0,
                            "origin":{"position":{"x":0,"y":0}}},
                    "data":[0,100]}}"#
                    .into(),
            ))
            .await
            .unwrap();
            first
        });

        let handle = spawn(test_config(port));
        let mut events = handle.events();

        handle
            .subscribe("/map", "nav_msgs/msg/OccupancyGrid", TopicKind::OccupancyGrid)
            .await
            .unwrap();
        handle.connect().await.unwrap();

        // First the connected event, then the decoded grid.
        let mut saw_connected = false;
        let grid = loop {
            let event = events.recv().await.unwrap();
            match event.payload {
                BridgePayload::Connected => saw_connected = true,
                BridgePayload::Map(grid) => break grid,
                other => panic!("unexpected event: {other:?}"),
            }
        };
        assert!(saw_connected);
        assert_eq!(grid.info.width, 2);

        let replayed = gateway.await.unwrap();
        assert!(replayed.contains(r#""op":"subscribe""#));
        assert!(replayed.contains("/r1/map"));
    }
}
