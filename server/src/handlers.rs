//! Per-message-type protocol handlers
//!
//! Each handler tolerates partial payloads and never blocks: every effect is
//! either a registry update or a queued send. Messages from a session whose
//! role does not permit them are logged and dropped.

use crate::session_registry::{Role, SessionRegistry, SessionUpdate};
use log::{info, warn};
use serde_json::{Map, Value};
use shared::{
    msg, timestamp_millis, ClientType, CommentData, Envelope, FlipActivityData, PlayerData,
    PongData, RegisterData, RegisterSuccessData, SkipCommentData, ThrowResultData,
};

/// Identity of the sender, copied out so the registry can be mutated freely.
struct Sender {
    role: Role,
    player_id: Option<String>,
    player_name: Option<String>,
}

fn sender(registry: &SessionRegistry, session_id: &str) -> Option<Sender> {
    registry.get(session_id).map(|session| Sender {
        role: session.role,
        player_id: session.player_id.clone(),
        player_name: session.player_name.clone(),
    })
}

/// Looks up the sender and checks it holds `role`.
fn sender_with_role(
    registry: &SessionRegistry,
    session_id: &str,
    role: Role,
    kind: &str,
) -> Option<Sender> {
    let sender = sender(registry, session_id)?;
    if sender.role != role {
        warn!(
            "Ignoring {} from {} session {}",
            kind,
            format!("{:?}", sender.role).to_lowercase(),
            session_id
        );
        return None;
    }
    Some(sender)
}

pub fn handle_register(registry: &mut SessionRegistry, session_id: &str, envelope: &Envelope) {
    let data: RegisterData = envelope.payload();
    let Some(client_type) = data.client_type else {
        warn!("Register from {} without a known clientType", session_id);
        return;
    };
    let requested = match client_type {
        ClientType::Web => Role::Observer,
        ClientType::Main => Role::Authority,
    };

    let Some(current) = sender(registry, session_id) else {
        return;
    };
    if current.role != Role::Unassigned {
        warn!(
            "Session {} already registered as {:?}, ignoring register",
            session_id, current.role
        );
        return;
    }

    registry.update(session_id, SessionUpdate::role(requested));

    let reply = match requested {
        Role::Authority => RegisterSuccessData {
            connection_id: session_id.to_string(),
            state: Some(registry.snapshot()),
        },
        _ => RegisterSuccessData {
            connection_id: session_id.to_string(),
            state: None,
        },
    };
    registry.send_to(session_id, &Envelope::new(msg::REGISTER_SUCCESS, &reply));
    info!("Registered {} as {:?}", session_id, requested);
}

pub fn handle_auth(registry: &mut SessionRegistry, session_id: &str, envelope: &Envelope) {
    let Some(current) = sender_with_role(registry, session_id, Role::Observer, msg::AUTH) else {
        return;
    };
    if current.player_id.is_some() {
        warn!("Session {} is already authenticated", session_id);
        return;
    }

    let data: PlayerData = envelope.payload();
    let Some(player_id) = data.player_id.clone() else {
        warn!("Auth from {} without a playerId", session_id);
        return;
    };

    registry.update(
        session_id,
        SessionUpdate::player(player_id.clone(), data.player_name.clone()),
    );

    let identity = PlayerData {
        player_id: Some(player_id.clone()),
        player_name: data.player_name.clone(),
    };
    registry.send_to(session_id, &Envelope::new(msg::AUTH_SUCCESS, &identity));
    registry.broadcast_role(Role::Authority, &Envelope::new(msg::PLAYER_JOINED, &identity));

    info!(
        "Player authenticated: {} ({})",
        data.player_name.as_deref().unwrap_or("<unnamed>"),
        player_id
    );
}

/// Relays the observer's payload verbatim to authorities, with identity and
/// server time stamped over whatever the observer sent. Observers that have
/// not bound a player with `auth` cannot throw.
pub fn handle_throw(registry: &mut SessionRegistry, session_id: &str, envelope: &Envelope) {
    let Some(current) = sender_with_role(registry, session_id, Role::Observer, msg::THROW) else {
        return;
    };
    if current.player_id.is_none() {
        warn!("Ignoring throw from unauthenticated session {}", session_id);
        return;
    }

    let mut data = match &envelope.data {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    stamp_identity(&mut data, &current);
    data.insert("timestamp".into(), Value::from(timestamp_millis()));

    let intensity = data.get("intensity").cloned().unwrap_or(Value::Null);
    registry.broadcast_role(Role::Authority, &Envelope::new(msg::THROW, &data));

    info!(
        "Throw from {}: intensity={}",
        current.player_name.as_deref().unwrap_or(session_id),
        intensity
    );
}

/// Forwards the private result to the player and a reduced public event to
/// everyone.
pub fn handle_throw_result(registry: &mut SessionRegistry, session_id: &str, envelope: &Envelope) {
    if sender_with_role(registry, session_id, Role::Authority, msg::THROW_RESULT).is_none() {
        return;
    }

    let data: ThrowResultData = envelope.payload();
    let success = data.success.unwrap_or(false);
    let coins_earned = data.coins_earned.unwrap_or(0);

    match &data.player_id {
        Some(player_id) => {
            let private = ThrowResultData {
                player_id: None,
                player_name: None,
                success: Some(success),
                coins_earned: Some(coins_earned),
            };
            registry.send_to_player(player_id, &Envelope::new(msg::THROW_RESULT, &private));
        }
        None => warn!("Throw result from {} without a playerId", session_id),
    }

    let activity = FlipActivityData {
        player_id: data.player_id.clone(),
        player_name: data.player_name.clone(),
        success: Some(success),
    };
    registry.broadcast_all(&Envelope::new(msg::FLIP_ACTIVITY, &activity));

    info!(
        "Throw result for {}: {}",
        data.player_id.as_deref().unwrap_or("<unknown>"),
        if success { "SUCCESS" } else { "FAIL" }
    );
}

pub fn handle_comment(registry: &mut SessionRegistry, session_id: &str, envelope: &Envelope) {
    let Some(current) = sender_with_role(registry, session_id, Role::Observer, msg::COMMENT) else {
        return;
    };

    let text = envelope.payload::<CommentData>().text;
    let comment = CommentData {
        player_id: current.player_id.clone(),
        player_name: current.player_name.clone(),
        text: text.clone(),
        timestamp: Some(timestamp_millis()),
    };
    registry.broadcast_role(Role::Authority, &Envelope::new(msg::COMMENT, &comment));

    info!(
        "Comment from {}: {}",
        current.player_name.as_deref().unwrap_or(session_id),
        text.unwrap_or_default()
    );
}

pub fn handle_skip_comment(registry: &mut SessionRegistry, session_id: &str, _envelope: &Envelope) {
    let Some(current) =
        sender_with_role(registry, session_id, Role::Observer, msg::SKIP_COMMENT)
    else {
        return;
    };

    let skip = SkipCommentData {
        player_id: current.player_id.clone(),
    };
    registry.broadcast_role(Role::Authority, &Envelope::new(msg::SKIP_COMMENT, &skip));

    info!(
        "Comment skipped by {}",
        current.player_name.as_deref().unwrap_or(session_id)
    );
}

/// Heartbeat. Answers the sender only and leaves shared state alone.
pub fn handle_ping(registry: &mut SessionRegistry, session_id: &str, _envelope: &Envelope) {
    let pong = PongData {
        timestamp: timestamp_millis(),
    };
    registry.send_to(session_id, &Envelope::new(msg::PONG, &pong));
}

fn stamp_identity(data: &mut Map<String, Value>, sender: &Sender) {
    data.remove("playerId");
    data.remove("playerName");
    if let Some(player_id) = &sender.player_id {
        data.insert("playerId".into(), Value::from(player_id.clone()));
    }
    if let Some(player_name) = &sender.player_name {
        data.insert("playerName".into(), Value::from(player_name.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_registry::SessionId;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Peer {
        id: SessionId,
        rx: UnboundedReceiver<String>,
    }

    impl Peer {
        fn connect(registry: &mut SessionRegistry) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Peer {
                id: registry.add(tx),
                rx,
            }
        }

        fn received(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                out.push(serde_json::from_str(&text).unwrap());
            }
            out
        }
    }

    fn envelope(kind: &str, data: Value) -> Envelope {
        Envelope::new(kind, &data)
    }

    fn register(registry: &mut SessionRegistry, peer: &mut Peer, client_type: &str) {
        handle_register(
            registry,
            &peer.id,
            &envelope(msg::REGISTER, json!({ "clientType": client_type })),
        );
        peer.received();
    }

    fn authenticate(registry: &mut SessionRegistry, peer: &mut Peer, id: &str, name: &str) {
        handle_auth(
            registry,
            &peer.id,
            &envelope(msg::AUTH, json!({ "playerId": id, "playerName": name })),
        );
        peer.received();
    }

    #[test]
    fn test_register_observer_reply_has_only_connection_id() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);

        handle_register(
            &mut registry,
            &web.id,
            &envelope(msg::REGISTER, json!({"clientType": "web"})),
        );

        let replies = web.received();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "register_success");
        assert_eq!(replies[0]["data"], json!({ "connectionId": web.id }));
        assert_eq!(registry.get(&web.id).unwrap().role, Role::Observer);
    }

    #[test]
    fn test_register_authority_reply_includes_snapshot() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        authenticate(&mut registry, &mut web, "p1", "Ann");

        handle_register(
            &mut registry,
            &main.id,
            &envelope(msg::REGISTER, json!({"clientType": "main"})),
        );

        let replies = main.received();
        assert_eq!(replies.len(), 1);
        let state = &replies[0]["data"]["state"];
        assert_eq!(state["webClients"], 1);
        assert_eq!(state["mainClients"], 1);
        assert_eq!(state["players"], json!([{ "id": "p1", "name": "Ann" }]));
    }

    #[test]
    fn test_second_register_does_not_change_role() {
        let mut registry = SessionRegistry::new();
        let mut peer = Peer::connect(&mut registry);
        register(&mut registry, &mut peer, "main");

        handle_register(
            &mut registry,
            &peer.id,
            &envelope(msg::REGISTER, json!({"clientType": "web"})),
        );

        assert_eq!(registry.get(&peer.id).unwrap().role, Role::Authority);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_register_without_client_type_is_ignored() {
        let mut registry = SessionRegistry::new();
        let mut peer = Peer::connect(&mut registry);

        handle_register(&mut registry, &peer.id, &Envelope::bare(msg::REGISTER));
        handle_register(
            &mut registry,
            &peer.id,
            &envelope(msg::REGISTER, json!({"clientType": 3})),
        );

        assert_eq!(registry.get(&peer.id).unwrap().role, Role::Unassigned);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_auth_replies_and_notifies_authorities() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        let mut other = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        register(&mut registry, &mut main, "main");
        register(&mut registry, &mut other, "web");

        handle_auth(
            &mut registry,
            &web.id,
            &envelope(msg::AUTH, json!({"playerId": "p1", "playerName": "Ann"})),
        );

        let reply = web.received();
        assert_eq!(reply[0]["type"], "auth_success");
        assert_eq!(reply[0]["data"], json!({"playerId": "p1", "playerName": "Ann"}));

        let notices = main.received();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0]["type"], "player_joined");
        assert_eq!(notices[0]["data"]["playerId"], "p1");
        assert!(other.received().is_empty());
    }

    #[test]
    fn test_auth_rejected_for_non_observers_and_repeats() {
        let mut registry = SessionRegistry::new();
        let mut main = Peer::connect(&mut registry);
        let mut web = Peer::connect(&mut registry);
        register(&mut registry, &mut main, "main");
        register(&mut registry, &mut web, "web");

        handle_auth(
            &mut registry,
            &main.id,
            &envelope(msg::AUTH, json!({"playerId": "p9"})),
        );
        assert!(registry.get(&main.id).unwrap().player_id.is_none());

        authenticate(&mut registry, &mut web, "p1", "Ann");
        main.received();
        handle_auth(
            &mut registry,
            &web.id,
            &envelope(msg::AUTH, json!({"playerId": "p2", "playerName": "Bob"})),
        );
        assert_eq!(registry.get(&web.id).unwrap().player_id.as_deref(), Some("p1"));
        assert!(web.received().is_empty());
        assert!(main.received().is_empty());
    }

    #[test]
    fn test_throw_is_stamped_and_relayed_to_authorities_only() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        register(&mut registry, &mut main, "main");
        authenticate(&mut registry, &mut web, "p1", "Ann");
        main.received();

        handle_throw(
            &mut registry,
            &web.id,
            &envelope(
                msg::THROW,
                json!({
                    "playerId": "spoofed",
                    "bottleId": "B001",
                    "intensity": 5,
                    "acceleration": {"x": 0.2, "y": 5, "z": 0.1}
                }),
            ),
        );

        assert!(web.received().is_empty());
        let relayed = main.received();
        assert_eq!(relayed.len(), 1);
        let data = &relayed[0]["data"];
        assert_eq!(relayed[0]["type"], "throw");
        assert_eq!(data["playerId"], "p1");
        assert_eq!(data["playerName"], "Ann");
        assert_eq!(data["bottleId"], "B001");
        assert_eq!(data["intensity"], 5);
        assert_eq!(data["acceleration"]["y"], 5);
        assert!(data["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_throw_tolerates_missing_data() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        register(&mut registry, &mut main, "main");
        authenticate(&mut registry, &mut web, "p1", "Ann");
        main.received();

        handle_throw(&mut registry, &web.id, &Envelope::bare(msg::THROW));

        let relayed = main.received();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0]["data"]["playerId"], "p1");
        assert!(relayed[0]["data"].get("bottleId").is_none());
        assert!(relayed[0]["data"]["timestamp"].is_i64());
    }

    #[test]
    fn test_throw_before_auth_is_dropped() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        register(&mut registry, &mut main, "main");

        handle_throw(
            &mut registry,
            &web.id,
            &envelope(msg::THROW, json!({"playerId": "p9", "intensity": 5})),
        );

        assert!(main.received().is_empty());
        assert!(web.received().is_empty());
    }

    #[test]
    fn test_throw_result_private_and_public_fan_out() {
        let mut registry = SessionRegistry::new();
        let mut ann = Peer::connect(&mut registry);
        let mut bob = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut ann, "web");
        register(&mut registry, &mut bob, "web");
        register(&mut registry, &mut main, "main");
        authenticate(&mut registry, &mut ann, "p1", "Ann");
        authenticate(&mut registry, &mut bob, "p2", "Bob");
        main.received();

        handle_throw_result(
            &mut registry,
            &main.id,
            &envelope(
                msg::THROW_RESULT,
                json!({"playerId": "p1", "playerName": "Ann", "success": true, "coinsEarned": 50}),
            ),
        );

        let ann_msgs = ann.received();
        assert_eq!(ann_msgs.len(), 2);
        let private = ann_msgs.iter().find(|m| m["type"] == "throw_result").unwrap();
        assert_eq!(private["data"], json!({"success": true, "coinsEarned": 50}));

        let activity = json!({"playerId": "p1", "playerName": "Ann", "success": true});
        for received in [&ann_msgs, &bob.received(), &main.received()] {
            let event = received.iter().find(|m| m["type"] == "flip_activity").unwrap();
            assert_eq!(event["data"], activity);
        }
    }

    #[test]
    fn test_throw_result_from_observer_is_dropped() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        authenticate(&mut registry, &mut web, "p1", "Ann");

        handle_throw_result(
            &mut registry,
            &web.id,
            &envelope(msg::THROW_RESULT, json!({"playerId": "p1", "success": true})),
        );
        assert!(web.received().is_empty());
    }

    #[test]
    fn test_throw_result_defaults_missing_fields() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        register(&mut registry, &mut main, "main");
        authenticate(&mut registry, &mut web, "p1", "Ann");
        main.received();

        handle_throw_result(
            &mut registry,
            &main.id,
            &envelope(msg::THROW_RESULT, json!({"playerId": "p1"})),
        );

        let private = web
            .received()
            .into_iter()
            .find(|m| m["type"] == "throw_result")
            .unwrap();
        assert_eq!(private["data"], json!({"success": false, "coinsEarned": 0}));
    }

    #[test]
    fn test_comment_and_skip_are_stamped_for_authorities() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut web, "web");
        register(&mut registry, &mut main, "main");
        authenticate(&mut registry, &mut web, "p1", "Ann");
        main.received();

        handle_comment(
            &mut registry,
            &web.id,
            &envelope(msg::COMMENT, json!({"text": "nice"})),
        );
        handle_skip_comment(&mut registry, &web.id, &Envelope::bare(msg::SKIP_COMMENT));

        let relayed = main.received();
        assert_eq!(relayed.len(), 2);
        assert_eq!(relayed[0]["type"], "comment");
        assert_eq!(relayed[0]["data"]["playerId"], "p1");
        assert_eq!(relayed[0]["data"]["playerName"], "Ann");
        assert_eq!(relayed[0]["data"]["text"], "nice");
        assert!(relayed[0]["data"]["timestamp"].is_i64());
        assert_eq!(relayed[1]["type"], "skip_comment");
        assert_eq!(relayed[1]["data"], json!({"playerId": "p1"}));
        assert!(web.received().is_empty());
    }

    #[test]
    fn test_ping_answers_sender_only() {
        let mut registry = SessionRegistry::new();
        let mut web = Peer::connect(&mut registry);
        let mut main = Peer::connect(&mut registry);
        register(&mut registry, &mut main, "main");

        handle_ping(&mut registry, &web.id, &Envelope::bare(msg::PING));

        let replies = web.received();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "pong");
        assert!(replies[0]["data"]["timestamp"].as_i64().unwrap() > 0);
        assert!(main.received().is_empty());
        assert_eq!(registry.get(&web.id).unwrap().role, Role::Unassigned);
    }
}
