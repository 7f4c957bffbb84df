//! # courier-types: Core types for courier
//!
//! Shared value types used across the courier system:
//! - [`Message`] — the chat message record exchanged over the wire and
//!   persisted by storage back-ends
//! - [`LoginKind`] — classification of a login as a user or a group name
//! - [`BROADCAST`] — the `#all` broadcast addressee every user receives

use serde::{Deserialize, Serialize};

/// Sentinel prefix distinguishing group names from user names.
pub const GROUP_PREFIX: char = '@';

/// Broadcast addressee implicitly delivered to every user.
pub const BROADCAST: &str = "#all";

/// A chat message.
///
/// Messages are value objects: storage owns the copy it persists and copies
/// out on read. `send_ts` is client-supplied (unix seconds); the server clock
/// is consulted only when deciding whether a message is visible yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender login.
    pub from: String,
    /// Addressee logins, each a user name or an `@`-prefixed group name.
    /// Non-empty at the wire boundary.
    pub to: Vec<String>,
    /// Send timestamp, seconds since the unix epoch.
    pub send_ts: u64,
    /// Message body.
    pub body: String,
    /// Optional reply string (at most one is used).
    #[serde(default)]
    pub reply: Option<String>,
    /// Server-assigned message UID, set on store.
    #[serde(default)]
    pub uid: Option<u64>,
}

impl Message {
    /// Creates a message with the given routing fields and body.
    pub fn new(
        from: impl Into<String>,
        to: Vec<String>,
        send_ts: u64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to,
            send_ts,
            body: body.into(),
            reply: None,
            uid: None,
        }
    }
}

/// Classification of a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    /// A bare user name.
    User,
    /// An `@`-prefixed group name.
    Group,
}

impl LoginKind {
    /// Classifies a login by its leading character.
    pub fn of(login: &str) -> Self {
        if login.starts_with(GROUP_PREFIX) {
            Self::Group
        } else {
            Self::User
        }
    }
}
