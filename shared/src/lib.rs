//! Wire protocol shared by the relay, the authority and observer tools.
//!
//! Every message is a JSON text frame wrapped in an [`Envelope`]:
//! `{"type": <string>, "data": <object|omitted>, "timestamp": <int64 millis, optional>}`.
//! Payload keys are camelCase. Inbound payloads are decoded field by field:
//! a missing or malformed field becomes `None` instead of failing the whole
//! message, so partial payloads from older clients still dispatch.

pub mod vector;

pub use vector::Vec3;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_WS_PORT: u16 = 8081;
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Message type names carried in [`Envelope::kind`].
pub mod msg {
    pub const REGISTER: &str = "register";
    pub const REGISTER_SUCCESS: &str = "register_success";
    pub const AUTH: &str = "auth";
    pub const AUTH_SUCCESS: &str = "auth_success";
    pub const PLAYER_JOINED: &str = "player_joined";
    pub const PLAYER_LEFT: &str = "player_left";
    pub const THROW: &str = "throw";
    pub const THROW_RESULT: &str = "throw_result";
    pub const FLIP_ACTIVITY: &str = "flip_activity";
    pub const COMMENT: &str = "comment";
    pub const SKIP_COMMENT: &str = "skip_comment";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn timestamp_millis() -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(i64::MAX as u128) as i64
}

/// Tagged message wrapper exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Envelope {
    /// Builds an envelope from a typed payload.
    pub fn new<T: Serialize>(kind: &str, data: &T) -> Self {
        Envelope {
            kind: kind.to_string(),
            data: serde_json::to_value(data).ok(),
            timestamp: None,
        }
    }

    /// Builds an envelope with no `data` member.
    pub fn bare(kind: &str) -> Self {
        Envelope {
            kind: kind.to_string(),
            data: None,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes `data` into a typed payload. Absent or non-object data yields
    /// the payload's default.
    pub fn payload<T: DeserializeOwned + Default>(&self) -> T {
        match &self.data {
            Some(value @ Value::Object(_)) => {
                serde_json::from_value(value.clone()).unwrap_or_default()
            }
            _ => T::default(),
        }
    }
}

/// Deserializes a field, mapping any type mismatch to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Client kind announced in `register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Observer device (phone web client).
    #[serde(alias = "observer")]
    Web,
    /// Authority process that simulates and renders outcomes.
    #[serde(alias = "authority")]
    Main,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_type: Option<ClientType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
}

/// Aggregate relay state handed to an authority on registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    #[serde(rename = "webClients", default)]
    pub observers: usize,
    #[serde(rename = "mainClients", default)]
    pub authorities: usize,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSuccessData {
    #[serde(default)]
    pub connection_id: String,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<GameStateSnapshot>,
}

/// Identity payload used by `auth`, `auth_success`, `player_joined` and
/// `player_left`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub bottle_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub intensity: Option<f32>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub acceleration: Option<Vec3>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowResultData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub success: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub coins_earned: Option<u32>,
}

/// Public, reduced view of a throw result broadcast to every session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipActivityData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub success: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCommentData {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PongData {
    #[serde(default)]
    pub timestamp: i64,
}

/// A throw submitted by an observer, as seen by the judge.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrowIntent {
    pub player_id: String,
    pub player_name: String,
    pub bottle_id: String,
    pub acceleration: Vec3,
    /// Redundant with the acceleration magnitude; kept for older clients.
    pub intensity: f32,
}

impl From<ThrowData> for ThrowIntent {
    fn from(data: ThrowData) -> Self {
        let intensity = data.intensity;
        let acceleration = data
            .acceleration
            .unwrap_or_else(|| Vec3::new(0.0, intensity.unwrap_or(0.0), 0.0));
        ThrowIntent {
            player_id: data.player_id.unwrap_or_default(),
            player_name: data.player_name.unwrap_or_default(),
            bottle_id: data.bottle_id.unwrap_or_default(),
            intensity: intensity.unwrap_or_else(|| acceleration.magnitude()),
            acceleration,
        }
    }
}

/// Authoritative result of judging one throw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrowOutcome {
    pub player_id: String,
    pub player_name: String,
    pub success: bool,
    pub coins_earned: u32,
}

impl ThrowOutcome {
    /// The `throw_result` message an authority sends back through the relay.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(
            msg::THROW_RESULT,
            &ThrowResultData {
                player_id: Some(self.player_id.clone()),
                player_name: Some(self.player_name.clone()),
                success: Some(self.success),
                coins_earned: Some(self.coins_earned),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    #[test]
    fn test_envelope_decode_without_data() {
        let envelope = Envelope::decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.kind, msg::PING);
        assert!(envelope.data.is_none());
        assert!(envelope.timestamp.is_none());
    }

    #[test]
    fn test_envelope_decode_failures() {
        assert!(Envelope::decode("not json").is_err());
        assert!(Envelope::decode(r#"{"data":{}}"#).is_err());
        assert!(Envelope::decode(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn test_envelope_encode_omits_empty_members() {
        let text = Envelope::bare(msg::SKIP_COMMENT).encode().unwrap();
        assert_eq!(text, r#"{"type":"skip_comment"}"#);

        let text = Envelope::bare(msg::PING)
            .with_timestamp(42)
            .encode()
            .unwrap();
        assert_eq!(text, r#"{"type":"ping","timestamp":42}"#);
    }

    #[test]
    fn test_payload_tolerates_malformed_fields() {
        let envelope = Envelope {
            kind: msg::AUTH.to_string(),
            data: Some(json!({"playerId": 17, "playerName": "Ann"})),
            timestamp: None,
        };
        let auth: PlayerData = envelope.payload();
        assert_eq!(auth.player_id, None);
        assert_eq!(auth.player_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_payload_defaults_for_non_object_data() {
        let envelope = Envelope {
            kind: msg::REGISTER.to_string(),
            data: Some(json!("main")),
            timestamp: None,
        };
        let register: RegisterData = envelope.payload();
        assert_eq!(register.client_type, None);

        let register: RegisterData = Envelope::bare(msg::REGISTER).payload();
        assert_eq!(register.client_type, None);
    }

    #[test]
    fn test_client_type_aliases() {
        let parse = |v: Value| -> Option<ClientType> {
            Envelope::new(msg::REGISTER, &json!({ "clientType": v }))
                .payload::<RegisterData>()
                .client_type
        };
        assert_eq!(parse(json!("web")), Some(ClientType::Web));
        assert_eq!(parse(json!("observer")), Some(ClientType::Web));
        assert_eq!(parse(json!("main")), Some(ClientType::Main));
        assert_eq!(parse(json!("authority")), Some(ClientType::Main));
        assert_eq!(parse(json!("admin")), None);
    }

    #[test]
    fn test_throw_intent_reconstructs_acceleration() {
        let data = ThrowData {
            player_id: Some("p1".into()),
            bottle_id: Some("B001".into()),
            intensity: Some(5.0),
            ..Default::default()
        };
        let intent = ThrowIntent::from(data);
        assert_eq!(intent.acceleration, Vec3::new(0.0, 5.0, 0.0));
        assert_approx_eq!(intent.intensity, 5.0, 1e-6);
        assert_eq!(intent.player_name, "");
    }

    #[test]
    fn test_throw_intent_derives_missing_intensity() {
        let data = ThrowData {
            acceleration: Some(Vec3::new(3.0, 4.0, 0.0)),
            ..Default::default()
        };
        let intent = ThrowIntent::from(data);
        assert_approx_eq!(intent.intensity, 5.0, 1e-5);
    }

    #[test]
    fn test_throw_data_reads_camel_case_wire_format() {
        let envelope = Envelope::decode(
            r#"{"type":"throw","data":{"playerId":"p1","playerName":"Ann","bottleId":"B001",
                "intensity":5,"acceleration":{"x":0.2,"y":5,"z":0.1},"timestamp":1700000000000}}"#,
        )
        .unwrap();
        let data: ThrowData = envelope.payload();
        assert_eq!(data.player_id.as_deref(), Some("p1"));
        assert_eq!(data.bottle_id.as_deref(), Some("B001"));
        assert_eq!(data.timestamp, Some(1_700_000_000_000));
        let accel = data.acceleration.unwrap();
        assert_approx_eq!(accel.x, 0.2, 1e-6);
        assert_approx_eq!(accel.z, 0.1, 1e-6);
    }

    #[test]
    fn test_outcome_envelope_shape() {
        let outcome = ThrowOutcome {
            player_id: "p1".into(),
            player_name: "Ann".into(),
            success: true,
            coins_earned: 50,
        };
        let value: Value = serde_json::from_str(&outcome.to_envelope().encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "throw_result",
                "data": {"playerId": "p1", "playerName": "Ann", "success": true, "coinsEarned": 50}
            })
        );
    }

    #[test]
    fn test_snapshot_wire_names() {
        let snapshot = GameStateSnapshot {
            observers: 2,
            authorities: 1,
            players: vec![PlayerInfo {
                id: "p1".into(),
                name: "Ann".into(),
            }],
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["webClients"], 2);
        assert_eq!(value["mainClients"], 1);
        assert_eq!(value["players"][0]["name"], "Ann");
    }

    #[test]
    fn test_timestamp_is_plausible() {
        let now = timestamp_millis();
        // 2020-01-01 .. 2200-01-01 in Unix milliseconds
        assert!(now > 1_577_836_800_000);
        assert!(now < 7_258_118_400_000);
    }
}
