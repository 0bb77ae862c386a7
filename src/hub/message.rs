use std::fmt;

use crate::connection::ClientId;

/// Text messages the hub sends to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMessage<'a> {
    /// Personal echo back to the author
    Echo { payload: &'a str },
    /// Announcement of a client's message to everyone
    Said { client_id: ClientId, payload: &'a str },
    /// Departure notice
    Left { client_id: ClientId },
}

impl fmt::Display for ChatMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo { payload } => write!(f, "You wrote: {}", payload),
            Self::Said { client_id, payload } => {
                write!(f, "Client #{} says: {}", client_id, payload)
            }
            Self::Left { client_id } => write!(f, "Client #{} left the chat", client_id),
        }
    }
}
