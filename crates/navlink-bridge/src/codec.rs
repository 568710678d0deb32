//! Wire codec for the gateway's JSON protocol.
//!
//! Encoders build the four outbound operation records as compact JSON text;
//! [`decode`] parses inbound frames into an [`InboundEnvelope`]. Both
//! directions are pure functions with no side effects.

use navlink_types::BridgeError;
use serde::Deserialize;
use serde_json::{Value, json};

/// Build a `subscribe` frame for an already-namespaced wire topic.
pub fn encode_subscribe(wire_topic: &str, message_type: &str) -> String {
    json!({
        "op": "subscribe",
        "topic": wire_topic,
        "type": message_type,
    })
    .to_string()
}

/// Build an `unsubscribe` frame.
pub fn encode_unsubscribe(wire_topic: &str) -> String {
    json!({
        "op": "unsubscribe",
        "topic": wire_topic,
    })
    .to_string()
}

/// Build a `publish` frame carrying `msg` verbatim.
pub fn encode_publish(wire_topic: &str, msg: &Value) -> String {
    json!({
        "op": "publish",
        "topic": wire_topic,
        "msg": msg,
    })
    .to_string()
}

/// Build a `call_service` frame with the caller-supplied correlation id.
pub fn encode_call_service(service: &str, args: &Value, id: &str) -> String {
    json!({
        "op": "call_service",
        "service": service,
        "args": args,
        "id": id,
    })
    .to_string()
}

/// One decoded inbound frame. Transient; never retained across frames.
///
/// Unknown `op` values decode successfully with the op preserved and all
/// other members absent, so the dispatch layer can drop them silently. The
/// `result` member exists because the remote map-fetch service answers with
/// `{"result":{"map":{...}}}` instead of `values`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub msg: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub values: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedFrame`] when `text` is not valid JSON or
/// not a JSON object.
pub fn decode(text: &str) -> Result<InboundEnvelope, BridgeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| BridgeError::MalformedFrame(e.to_string()))?;
    if !value.is_object() {
        return Err(BridgeError::MalformedFrame("frame is not a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| BridgeError::MalformedFrame(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_value(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn subscribe_frame_has_op_topic_and_type() {
        let frame = encode_subscribe("/r1/map", "nav_msgs/msg/OccupancyGrid");
        let v = as_value(&frame);
        assert_eq!(v["op"], "subscribe");
        assert_eq!(v["topic"], "/r1/map");
        assert_eq!(v["type"], "nav_msgs/msg/OccupancyGrid");
    }

    #[test]
    fn unsubscribe_frame_omits_type() {
        let frame = encode_unsubscribe("/r1/map");
        let v = as_value(&frame);
        assert_eq!(v["op"], "unsubscribe");
        assert_eq!(v["topic"], "/r1/map");
        assert!(v.get("type").is_none());
    }

    #[test]
    fn publish_frame_carries_msg_verbatim() {
        let msg = json!({"linear": {"x": 0.5}, "angular": {"z": -0.2}});
        let frame = encode_publish("/r1/cmd_vel", &msg);
        let v = as_value(&frame);
        assert_eq!(v["op"], "publish");
        assert_eq!(v["msg"]["linear"]["x"], 0.5);
        assert_eq!(v["msg"]["angular"]["z"], -0.2);
    }

    #[test]
    fn call_service_frame_carries_id() {
        let args = json!({"request_string": "GetHandshake"});
        let frame = encode_call_service("/r1/map_manager", &args, "get_hs_1700000000000");
        let v = as_value(&frame);
        assert_eq!(v["op"], "call_service");
        assert_eq!(v["service"], "/r1/map_manager");
        assert_eq!(v["id"], "get_hs_1700000000000");
        assert_eq!(v["args"]["request_string"], "GetHandshake");
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedFrame(_)));
    }

    #[test]
    fn decode_rejects_non_object_frames() {
        let err = decode("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedFrame(_)));
    }

    #[test]
    fn decode_accepts_unknown_op() {
        let env = decode(r#"{"op":"png_fragment","data":"AAAA"}"#).unwrap();
        assert_eq!(env.op, "png_fragment");
        assert!(env.topic.is_none());
        assert!(env.msg.is_none());
    }

    #[test]
    fn decode_publish_envelope() {
        let env = decode(r#"{"op":"publish","topic":"/r1/odom","msg":{"pose":{}}}"#).unwrap();
        assert_eq!(env.op, "publish");
        assert_eq!(env.topic.as_deref(), Some("/r1/odom"));
        assert!(env.msg.is_some());
    }

    #[test]
    fn decode_service_response_with_values_or_result() {
        let env =
            decode(r#"{"op":"service_response","id":"get_hs_1","values":{"status":1}}"#).unwrap();
        assert_eq!(env.id.as_deref(), Some("get_hs_1"));
        assert!(env.values.is_some());
        assert!(env.result.is_none());

        let env2 =
            decode(r#"{"op":"service_response","id":"get_map_2","result":{"map":{}}}"#).unwrap();
        assert!(env2.values.is_none());
        assert!(env2.result.is_some());
    }
}
