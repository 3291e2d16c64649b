//! Pure session state transition function
//!
//! Every rule for how a live session reacts to consumer commands and
//! transport events lives here as a pure, synchronous function:
//! `transition(state, input) -> (state, effects)`.
//! No IO, no async, no locking. The session actor executes the effects.

use matchpulse_protocol::{ClientMessage, MatchEvent, ServerMessage};
use serde::{Deserialize, Serialize};

use crate::snapshot::{LiveSnapshot, LiveStatus};
use crate::transport::TransportEvent;

// ---------------------------------------------------------------------------
// SessionState: bound job plus the projected snapshot
// ---------------------------------------------------------------------------

/// How repeated `event_detected` pushes for the same event id are folded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDedup {
    /// Every push is appended, duplicates included
    #[default]
    AppendAll,
    /// A push whose event id is already in the log is dropped
    ById,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub job_id: Option<String>,
    pub snapshot: LiveSnapshot,
    pub dedup: EventDedup,
}

impl SessionState {
    pub fn new(dedup: EventDedup) -> Self {
        Self {
            dedup,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Input / Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    /// Consumer supplied (or cleared) the job to follow
    BindJob(Option<String>),
    JoinSession,
    LeaveSession,
    Transport(TransportEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Refresh credentials and connect if not already connected
    Connect,
    /// Destroy the transport
    Disconnect,
    Send(ClientMessage),
}

/// Whether a pushed message belongs to the currently bound job
pub fn is_for_bound_job(state: &SessionState, msg: &ServerMessage) -> bool {
    state.job_id.as_deref() == Some(msg.job_id())
}

// ---------------------------------------------------------------------------
// transition(): the pure core
// ---------------------------------------------------------------------------

pub fn transition(mut state: SessionState, input: Input) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();

    match input {
        Input::BindJob(job_id) => {
            if job_id == state.job_id {
                return (state, effects);
            }
            if state.job_id.is_some() {
                teardown(&mut state, &mut effects);
            }
            state.job_id = job_id;
            join(&mut state, &mut effects);
        }

        Input::JoinSession => join(&mut state, &mut effects),

        Input::LeaveSession => teardown(&mut state, &mut effects),

        // -- Transport lifecycle ---------------------------------------------
        Input::Transport(TransportEvent::Connected { .. }) => {
            state.snapshot.is_connected = true;
            if let Some(job_id) = state.job_id.clone() {
                state.snapshot.error = None;
                if state.snapshot.status != LiveStatus::Completed {
                    state.snapshot.status = LiveStatus::Active;
                }
                effects.push(Effect::Send(ClientMessage::JoinSession { job_id }));
            }
        }

        Input::Transport(TransportEvent::Disconnected { .. }) => {
            state.snapshot.is_connected = false;
        }

        Input::Transport(TransportEvent::ConnectError { message }) => {
            state.snapshot.status = LiveStatus::Error;
            state.snapshot.error = Some(message);
            state.snapshot.is_connected = false;
        }

        // -- Server pushes ---------------------------------------------------
        Input::Transport(TransportEvent::Message(msg)) => {
            if is_for_bound_job(&state, &msg) {
                fold_message(&mut state, msg);
            }
        }
    }

    (state, effects)
}

/// Bind-time join: connect, or send the join directly on a live transport.
fn join(state: &mut SessionState, effects: &mut Vec<Effect>) {
    let Some(job_id) = state.job_id.clone() else {
        return;
    };

    if state.snapshot.is_connected {
        if state.snapshot.status != LiveStatus::Completed {
            state.snapshot.status = LiveStatus::Active;
        }
        effects.push(Effect::Send(ClientMessage::JoinSession { job_id }));
        return;
    }

    if state.snapshot.status != LiveStatus::Completed {
        state.snapshot.status = LiveStatus::Connecting;
    }
    effects.push(Effect::Connect);
}

/// Tell the server we are leaving (when it can hear us), destroy the transport, reset.
fn teardown(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if let (Some(job_id), true) = (state.job_id.clone(), state.snapshot.is_connected) {
        effects.push(Effect::Send(ClientMessage::LeaveSession { job_id }));
    }
    effects.push(Effect::Disconnect);
    state.snapshot = LiveSnapshot::default();
}

fn fold_message(state: &mut SessionState, msg: ServerMessage) {
    let snapshot = &mut state.snapshot;
    match msg {
        ServerMessage::AnalysisProgress { progress, .. } => {
            if snapshot.status == LiveStatus::Completed || !progress.is_finite() {
                return;
            }
            snapshot.progress = progress.clamp(0.0, 100.0);
        }
        ServerMessage::TrackingUpdate { players, .. } => {
            snapshot.tracking_data = players;
        }
        ServerMessage::EventDetected { event, .. } => {
            append_event(&mut snapshot.events, event, state.dedup);
        }
        ServerMessage::AnalysisComplete { .. } => {
            snapshot.status = LiveStatus::Completed;
            snapshot.progress = 100.0;
        }
    }
}

fn append_event(events: &mut Vec<MatchEvent>, event: MatchEvent, dedup: EventDedup) {
    if dedup == EventDedup::ById && events.iter().any(|e| e.id == event.id) {
        return;
    }
    events.push(event);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
