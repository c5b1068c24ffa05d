use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageTarget;

/// A notification topic. One topic per group room, one per conversation,
/// and a single shared topic for the status feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Topic {
    Group(Uuid),
    Conversation(Uuid),
    Statuses,
}

impl From<MessageTarget> for Topic {
    fn from(target: MessageTarget) -> Self {
        match target {
            MessageTarget::Group(id) => Topic::Group(id),
            MessageTarget::Conversation(id) => Topic::Conversation(id),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Group(id) => write!(f, "group:{}", id),
            Topic::Conversation(id) => write!(f, "conversation:{}", id),
            Topic::Statuses => write!(f, "statuses"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Events sent over the WebSocket gateway. Change events carry no row
/// payload: receivers re-fetch the target through the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// Something changed under a topic
    Changed { topic: Topic, kind: ChangeKind },

    /// Subscription set was updated; lists the topics now active
    Subscribed { topics: Vec<Topic> },

    /// The user's session was terminated (account suspended)
    SessionRevoked { user_id: Uuid },
}

impl GatewayEvent {
    /// Returns the topic if this event is scoped to one.
    /// Events that return `None` are global and go to every connection.
    pub fn topic(&self) -> Option<Topic> {
        match self {
            Self::Changed { topic, .. } => Some(*topic),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving change events for these topics
    Subscribe { topics: Vec<Topic> },

    /// Stop receiving change events for these topics
    Unsubscribe { topics: Vec<Topic> },
}
