//! Client → Server messages

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Start receiving pushes for one analysis job
    JoinSession { job_id: String },
    /// Best-effort notice sent before the client tears its transport down
    LeaveSession { job_id: String },
}

impl ClientMessage {
    pub fn job_id(&self) -> &str {
        match self {
            ClientMessage::JoinSession { job_id } | ClientMessage::LeaveSession { job_id } => job_id,
        }
    }
}
