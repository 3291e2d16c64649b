//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Messages pushed from server to client.
///
/// Every variant is tagged with the job it belongs to; clients drop
/// anything that does not match the job they are bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AnalysisProgress {
        job_id: String,
        progress: f64,
    },
    /// Full tracking snapshot; replaces whatever the client held before
    TrackingUpdate {
        job_id: String,
        players: Vec<PlayerPosition>,
    },
    EventDetected {
        job_id: String,
        event: MatchEvent,
    },
    AnalysisComplete {
        job_id: String,
    },
}

impl ServerMessage {
    pub fn job_id(&self) -> &str {
        match self {
            ServerMessage::AnalysisProgress { job_id, .. }
            | ServerMessage::TrackingUpdate { job_id, .. }
            | ServerMessage::EventDetected { job_id, .. }
            | ServerMessage::AnalysisComplete { job_id } => job_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::AnalysisProgress { .. } => "analysis_progress",
            ServerMessage::TrackingUpdate { .. } => "tracking_update",
            ServerMessage::EventDetected { .. } => "event_detected",
            ServerMessage::AnalysisComplete { .. } => "analysis_complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServerMessage;
    use crate::types::*;

    #[test]
    fn parses_event_detected_with_optional_fields() {
        let json = r#"{
            "type": "event_detected",
            "jobId": "job-42",
            "event": {
                "id": "evt-1",
                "type": "shot",
                "timestamp": 812.5,
                "player": "p-9",
                "team": "home",
                "description": "Shot from the edge of the box",
                "position": {"x": 0.81, "y": 0.44}
            }
        }"#;

        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::EventDetected { job_id, event } => {
                assert_eq!(job_id, "job-42");
                assert_eq!(event.event_type, "shot");
                assert_eq!(event.player.as_deref(), Some("p-9"));
                assert_eq!(event.position, Some(Position { x: 0.81, y: 0.44 }));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn parses_event_without_player_or_position() {
        let json = r#"{"type":"event_detected","jobId":"j","event":{"id":"e","type":"kickoff","timestamp":0,"team":"away","description":"Kick-off"}}"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::EventDetected { event, .. } => {
                assert!(event.player.is_none());
                assert!(event.position.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn tracking_update_uses_camel_case_player_id() {
        let msg = ServerMessage::TrackingUpdate {
            job_id: "job-1".to_string(),
            players: vec![PlayerPosition {
                player_id: "p-4".to_string(),
                x: 10.0,
                y: 20.0,
                speed: 6.5,
            }],
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "tracking_update");
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["players"][0]["playerId"], "p-4");
    }

    #[test]
    fn job_id_and_kind_cover_every_variant() {
        let complete: ServerMessage =
            serde_json::from_str(r#"{"type":"analysis_complete","jobId":"job-9"}"#)
                .expect("parse");
        assert_eq!(complete.job_id(), "job-9");
        assert_eq!(complete.kind(), "analysis_complete");

        let progress: ServerMessage =
            serde_json::from_str(r#"{"type":"analysis_progress","jobId":"job-9","progress":12}"#)
                .expect("parse");
        assert_eq!(progress.kind(), "analysis_progress");
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let result = serde_json::from_str::<ServerMessage>(r#"{"type":"score_changed","jobId":"j"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn poll_batch_defaults_to_empty() {
        let batch: PollBatch = serde_json::from_str("{}").expect("parse");
        assert!(batch.messages.is_empty());
    }
}
