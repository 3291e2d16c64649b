//! Read-only projection of a live session

use matchpulse_protocol::{MatchEvent, PlayerPosition};
use serde::{Deserialize, Serialize};

/// Session lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    #[default]
    Idle,
    Connecting,
    Active,
    Completed,
    Error,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Idle => "idle",
            LiveStatus::Connecting => "connecting",
            LiveStatus::Active => "active",
            LiveStatus::Completed => "completed",
            LiveStatus::Error => "error",
        }
    }
}

/// What consumers render from. Replaced wholesale on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub is_connected: bool,
    /// Percent complete, always within `0.0..=100.0`
    pub progress: f64,
    /// Detected match events in arrival order
    pub events: Vec<MatchEvent>,
    /// Latest full tracking frame from the server
    pub tracking_data: Vec<PlayerPosition>,
    pub status: LiveStatus,
    pub error: Option<String>,
}

impl LiveSnapshot {
    pub fn player(&self, player_id: &str) -> Option<&PlayerPosition> {
        self.tracking_data.iter().find(|p| p.player_id == player_id)
    }
}
