//! Envelope decoding and type-keyed dispatch

use crate::handlers;
use crate::session_registry::{SessionRegistry, SessionUpdate};
use log::{debug, warn};
use shared::{msg, Envelope};
use std::collections::HashMap;

/// A protocol handler. Receives the registry, the sending session's id and
/// the decoded envelope; all effects are queued sends or registry updates.
pub type Handler = fn(&mut SessionRegistry, &str, &Envelope);

/// What the router did with one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Dispatched,
    /// Well-formed envelope with no registered handler
    UnknownType,
    /// Payload did not decode as an envelope
    Malformed,
    /// Sender is no longer registered
    UnknownSession,
}

/// Static mapping from message type to handler.
///
/// Unknown types are logged and ignored so newer clients can talk to an
/// older relay. Handlers are never retried.
pub struct Router {
    handlers: HashMap<&'static str, Handler>,
}

impl Router {
    /// A router with every protocol handler registered.
    pub fn new() -> Self {
        let mut router = Self::empty();
        router.register(msg::REGISTER, handlers::handle_register);
        router.register(msg::AUTH, handlers::handle_auth);
        router.register(msg::THROW, handlers::handle_throw);
        router.register(msg::THROW_RESULT, handlers::handle_throw_result);
        router.register(msg::COMMENT, handlers::handle_comment);
        router.register(msg::SKIP_COMMENT, handlers::handle_skip_comment);
        router.register(msg::PING, handlers::handle_ping);
        router
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Adds or replaces the handler for `kind`.
    pub fn register(&mut self, kind: &'static str, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Decodes a raw text frame and dispatches it.
    pub fn route_text(
        &self,
        registry: &mut SessionRegistry,
        session_id: &str,
        text: &str,
    ) -> RouteOutcome {
        match Envelope::decode(text) {
            Ok(envelope) => self.route(registry, session_id, &envelope),
            Err(e) => {
                warn!("Invalid message from {}: {}", session_id, e);
                RouteOutcome::Malformed
            }
        }
    }

    /// Refreshes the sender's activity time and runs the matching handler.
    pub fn route(
        &self,
        registry: &mut SessionRegistry,
        session_id: &str,
        envelope: &Envelope,
    ) -> RouteOutcome {
        if registry.update(session_id, SessionUpdate::default()).is_none() {
            debug!("Dropping {} from closed session {}", envelope.kind, session_id);
            return RouteOutcome::UnknownSession;
        }

        match self.handlers.get(envelope.kind.as_str()) {
            Some(handler) => {
                debug!("{} from {}", envelope.kind, session_id);
                handler(registry, session_id, envelope);
                RouteOutcome::Dispatched
            }
            None => {
                warn!("Unknown message type: {}", envelope.kind);
                RouteOutcome::UnknownType
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
