//! Session tracking and role-scoped fan-out for the relay
//!
//! This module owns every live connection's server-side record:
//! - Session lifecycle (accept, activity refresh, close)
//! - Set-once role and player identity assignment
//! - Aggregate snapshots for authority state sync
//! - Broadcast primitives scoped by session, role or player
//!
//! The registry is the only owner of sessions. Nothing else keeps a session
//! after `remove`, and dropping a session drops its outbound queue, which
//! ends that connection's writer task.

use log::{debug, error, info, warn};
use shared::{msg, Envelope, GameStateSnapshot, PlayerData, PlayerInfo};
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque per-connection identifier.
pub type SessionId = String;

/// Queue of encoded text frames waiting for a connection's writer task.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Negotiated role of a session. Leaves `Unassigned` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Unassigned,
    Observer,
    Authority,
}

/// Server-side record of one live connection
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub role: Role,
    /// Bound by `auth`; never changes once set
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub connected_at: SystemTime,
    /// Refreshed on every inbound message
    pub last_activity_at: Instant,
    outbound: Outbound,
}

impl Session {
    fn new(id: SessionId, outbound: Outbound) -> Self {
        Self {
            id,
            role: Role::Unassigned,
            player_id: None,
            player_name: None,
            connected_at: SystemTime::now(),
            last_activity_at: Instant::now(),
            outbound,
        }
    }

    /// Queues an already-encoded frame. Closed transports are skipped.
    fn deliver(&self, text: &str) -> bool {
        if self.outbound.is_closed() {
            return false;
        }
        self.outbound.send(text.to_string()).is_ok()
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity_at.elapsed() > timeout
    }
}

/// Fields merged into a session by [`SessionRegistry::update`].
///
/// An empty update only refreshes `last_activity_at`.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub role: Option<Role>,
    pub player_id: Option<String>,
    pub player_name: Option<String>,
}

impl SessionUpdate {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    pub fn player(player_id: String, player_name: Option<String>) -> Self {
        Self {
            player_id: Some(player_id),
            player_name,
            ..Default::default()
        }
    }
}

/// Owns all live sessions and routes outbound frames to them.
///
/// Duplicate player ids are not rejected. `send_to_player` targets the most
/// recently authenticated holder of an id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    /// playerId -> session currently targeted by `send_to_player`
    players: HashMap<String, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection with role `Unassigned` and returns its id.
    pub fn add(&mut self, outbound: Outbound) -> SessionId {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .insert(id.clone(), Session::new(id.clone(), outbound));
        info!("Session {} opened ({} live)", id, self.sessions.len());
        id
    }

    /// Removes a session. Authorities are told when an authenticated player
    /// leaves; anonymous sessions leave silently.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        info!("Session {} closed ({} live)", id, self.sessions.len());

        if let Some(player_id) = &session.player_id {
            if self.players.get(player_id).map(String::as_str) == Some(id) {
                self.players.remove(player_id);
                // Fall back to another live holder of the same id, if any
                if let Some(other) = self
                    .sessions
                    .values()
                    .find(|s| s.player_id.as_ref() == Some(player_id))
                {
                    self.players.insert(player_id.clone(), other.id.clone());
                }
            }

            let notice = Envelope::new(
                msg::PLAYER_LEFT,
                &PlayerData {
                    player_id: Some(player_id.clone()),
                    player_name: session.player_name.clone(),
                },
            );
            self.broadcast_role(Role::Authority, &notice);
        }

        Some(session)
    }

    /// Merges `update` into a session and refreshes its activity time.
    ///
    /// Role and player id are set-once: attempts to change them after
    /// assignment are logged and ignored. Returns the session after the merge,
    /// or `None` if it does not exist.
    pub fn update(&mut self, id: &str, update: SessionUpdate) -> Option<&Session> {
        let session = self.sessions.get_mut(id)?;
        session.last_activity_at = Instant::now();

        if let Some(role) = update.role {
            if session.role == Role::Unassigned {
                session.role = role;
            } else if session.role != role {
                warn!(
                    "Session {} already registered as {:?}, ignoring {:?}",
                    id, session.role, role
                );
            }
        }

        if let Some(player_id) = update.player_id {
            if session.player_id.is_none() {
                session.player_id = Some(player_id.clone());
                session.player_name = update.player_name;
                if self.players.insert(player_id.clone(), id.to_string()).is_some() {
                    warn!("Player {} is now authenticated on more than one session", player_id);
                }
            } else {
                warn!(
                    "Session {} already bound to player {:?}, ignoring {}",
                    id, session.player_id, player_id
                );
            }
        }

        self.sessions.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Aggregate counts plus authenticated players, for authority state sync
    pub fn snapshot(&self) -> GameStateSnapshot {
        let mut snapshot = GameStateSnapshot::default();
        for session in self.sessions.values() {
            match session.role {
                Role::Observer => {
                    snapshot.observers += 1;
                    if let (Some(id), Some(name)) = (&session.player_id, &session.player_name) {
                        snapshot.players.push(PlayerInfo {
                            id: id.clone(),
                            name: name.clone(),
                        });
                    }
                }
                Role::Authority => snapshot.authorities += 1,
                Role::Unassigned => {}
            }
        }
        snapshot.players.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }

    /// Sessions with no inbound traffic for longer than `timeout`
    pub fn find_idle(&self, timeout: Duration) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|session| session.is_idle(timeout))
            .map(|session| session.id.clone())
            .collect()
    }

    /// Sends to one session. Missing sessions and closed transports are a no-op.
    pub fn send_to(&self, id: &str, message: &Envelope) {
        let Some(session) = self.sessions.get(id) else {
            debug!("Dropping {} for missing session {}", message.kind, id);
            return;
        };
        if let Some(text) = encode(message) {
            session.deliver(&text);
        }
    }

    pub fn broadcast_all(&self, message: &Envelope) {
        self.fan_out(message, |_| true);
    }

    pub fn broadcast_role(&self, role: Role, message: &Envelope) {
        self.fan_out(message, |session| session.role == role);
    }

    /// Sends to the session holding `player_id`, if any.
    pub fn send_to_player(&self, player_id: &str, message: &Envelope) {
        match self.players.get(player_id) {
            Some(id) => self.send_to(id, message),
            None => debug!("Dropping {} for absent player {}", message.kind, player_id),
        }
    }

    /// Encodes once and queues the same text for every matching session.
    fn fan_out(&self, message: &Envelope, filter: impl Fn(&Session) -> bool) -> usize {
        let Some(text) = encode(message) else {
            return 0;
        };
        self.sessions
            .values()
            .filter(|session| filter(session))
            .filter(|session| session.deliver(&text))
            .count()
    }
}

fn encode(message: &Envelope) -> Option<String> {
    match message.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode {} message: {}", message.kind, e);
            None
        }
    }
}
