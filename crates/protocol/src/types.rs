//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// A point on the pitch, in the analysis service's normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Latest tracked position of a single player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPosition {
    pub player_id: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
}

/// A discrete match event detected by the analysis job (goal, shot, foul, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Seconds from the start of the analysed footage
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    pub team: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Response to the polling handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollHandshake {
    pub sid: String,
}

/// One long-poll response: every server message queued since the last poll.
///
/// Servers build `PollBatch<ServerMessage>`. Clients may read it as
/// `PollBatch<serde_json::Value>` and decode entries one at a time so a
/// single unknown message does not sink the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "M: Deserialize<'de>"))]
pub struct PollBatch<M = crate::ServerMessage> {
    #[serde(default)]
    pub messages: Vec<M>,
}
