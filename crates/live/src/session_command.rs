//! Commands sent to the session actor from its handles.

use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};

use crate::snapshot::LiveSnapshot;

/// Result of a Subscribe command: the snapshot at subscription time plus
/// every snapshot published after it, with nothing missed in between.
pub struct Subscription {
    pub snapshot: Arc<LiveSnapshot>,
    pub updates: broadcast::Receiver<Arc<LiveSnapshot>>,
}

/// A command that can be sent to a session actor.
pub enum SessionCommand {
    // -- Consumer actions (fire-and-forget) --
    /// Bind, switch or clear the job being followed
    BindJob { job_id: Option<String> },
    JoinSession,
    LeaveSession,

    // -- Queries (use oneshot reply channels) --
    GetJob {
        reply: oneshot::Sender<Option<String>>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },

    // -- Lifecycle --
    /// Tear down the transport and stop the actor
    Shutdown { reply: oneshot::Sender<()> },
}
