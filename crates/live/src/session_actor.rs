//! Session actor: binds a job to the connection manager and folds its pushes.
//!
//! One tokio task owns the `ConnectionManager` and the session state and
//! processes consumer commands and transport events one at a time, each to
//! completion. Callers talk to it through `LiveSessionHandle`; snapshot
//! reads are lock-free through `ArcSwap`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, TransportEvents};
use crate::session_command::{SessionCommand, Subscription};
use crate::snapshot::LiveSnapshot;
use crate::transition::{self, Effect, EventDedup, Input, SessionState};
use crate::transport::{TaggedEvent, TransportEvent};

/// Tuning for a live session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub event_dedup: EventDedup,
    pub command_channel_capacity: usize,
    /// Snapshots a slow subscriber may fall behind before it sees `Lagged`
    pub update_channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            event_dedup: EventDedup::AppendAll,
            command_channel_capacity: 64,
            update_channel_capacity: 256,
        }
    }
}

/// Handle to a running session actor (cheap to Clone).
#[derive(Clone)]
pub struct LiveSessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<LiveSnapshot>>,
}

impl LiveSessionHandle {
    /// Spawn the actor. It takes sole ownership of `manager`.
    pub fn spawn(
        manager: ConnectionManager,
        events: TransportEvents,
        options: SessionOptions,
    ) -> LiveSessionHandle {
        let (command_tx, command_rx) = mpsc::channel(options.command_channel_capacity.max(1));
        let (updates, _) = broadcast::channel(options.update_channel_capacity.max(1));
        let snapshot = Arc::new(ArcSwap::from_pointee(LiveSnapshot::default()));

        let actor = SessionActor {
            manager,
            state: SessionState::new(options.event_dedup),
            snapshot: Arc::clone(&snapshot),
            updates,
        };
        tokio::spawn(actor.run(command_rx, events));

        LiveSessionHandle {
            command_tx,
            snapshot,
        }
    }

    async fn send(&self, cmd: SessionCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                event = "session.command.dropped",
                "Actor channel closed, command dropped"
            );
        }
    }

    /// Follow `job_id`, switching away from any previous job. `None` unbinds.
    pub async fn bind_job(&self, job_id: Option<String>) {
        self.send(SessionCommand::BindJob { job_id }).await;
    }

    /// Connect and join the bound job. No-op when no job is bound.
    pub async fn join_session(&self) {
        self.send(SessionCommand::JoinSession).await;
    }

    /// Destroy the transport and reset the snapshot. The job stays bound.
    pub async fn leave_session(&self) {
        self.send(SessionCommand::LeaveSession).await;
    }

    pub async fn current_job(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetJob { reply: tx }).await;
        rx.await.ok().flatten()
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<LiveSnapshot> {
        self.snapshot.load_full()
    }

    /// Current snapshot plus a receiver for every later one.
    /// `None` once the actor has stopped.
    pub async fn subscribe(&self) -> Option<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe { reply: tx }).await;
        rx.await.ok()
    }

    /// Resolve with the first snapshot satisfying `predicate`.
    /// `None` if the actor stops first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Option<Arc<LiveSnapshot>>
    where
        F: FnMut(&LiveSnapshot) -> bool,
    {
        let Subscription {
            snapshot,
            mut updates,
        } = self.subscribe().await?;
        if predicate(&snapshot) {
            return Some(snapshot);
        }

        loop {
            match updates.recv().await {
                Ok(snapshot) => {
                    if predicate(&snapshot) {
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        component = "session_actor",
                        event = "session.subscriber.lagged",
                        skipped,
                        "Subscriber lagged, re-reading latest snapshot"
                    );
                    let snapshot = self.snapshot();
                    if predicate(&snapshot) {
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Leave the session, destroy the transport and stop the actor.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown { reply: tx }).await;
        let _ = rx.await;
    }
}

struct SessionActor {
    manager: ConnectionManager,
    state: SessionState,
    snapshot: Arc<ArcSwap<LiveSnapshot>>,
    updates: broadcast::Sender<Arc<LiveSnapshot>>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        mut events: TransportEvents,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    // Every handle dropped: the owner is gone, tear down.
                    let Some(command) = command else {
                        self.apply(Input::LeaveSession);
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }

                Some(tagged) = events.recv() => self.handle_transport_event(tagged),
            }
        }

        info!(
            component = "session_actor",
            event = "session.actor.stopped",
            job_id = ?self.state.job_id,
            "Session actor stopped"
        );
    }

    /// Returns false when the actor should stop.
    fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::BindJob { job_id } => {
                if job_id != self.state.job_id {
                    info!(
                        component = "session_actor",
                        event = "session.bind",
                        previous_job_id = ?self.state.job_id,
                        job_id = ?job_id,
                        "Binding job"
                    );
                }
                self.apply(Input::BindJob(job_id));
            }
            SessionCommand::JoinSession => self.apply(Input::JoinSession),
            SessionCommand::LeaveSession => {
                info!(
                    component = "session_actor",
                    event = "session.leave",
                    job_id = ?self.state.job_id,
                    "Leaving session"
                );
                self.apply(Input::LeaveSession);
            }
            SessionCommand::GetJob { reply } => {
                let _ = reply.send(self.state.job_id.clone());
            }
            SessionCommand::Subscribe { reply } => {
                let _ = reply.send(Subscription {
                    snapshot: self.snapshot.load_full(),
                    updates: self.updates.subscribe(),
                });
            }
            SessionCommand::Shutdown { reply } => {
                self.apply(Input::LeaveSession);
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_transport_event(&mut self, tagged: TaggedEvent) {
        if !self.manager.is_current(tagged.generation) {
            debug!(
                component = "session_actor",
                event = "session.transport_event.stale",
                generation = tagged.generation,
                "Dropping event from a destroyed transport"
            );
            return;
        }
        self.manager.observe(&tagged);

        match &tagged.event {
            TransportEvent::Message(msg) if !transition::is_for_bound_job(&self.state, msg) => {
                debug!(
                    component = "session_actor",
                    event = "session.message.misrouted",
                    job_id = ?self.state.job_id,
                    message_job_id = %msg.job_id(),
                    kind = msg.kind(),
                    "Discarding message for another job"
                );
                return;
            }
            TransportEvent::ConnectError { message } => {
                warn!(
                    component = "session_actor",
                    event = "session.connect_error",
                    job_id = ?self.state.job_id,
                    error = %message,
                    "Transport failed to connect"
                );
            }
            _ => {}
        }

        self.apply(Input::Transport(tagged.event));
    }

    fn apply(&mut self, input: Input) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = transition::transition(state, input);
        self.state = state;

        for effect in effects {
            match effect {
                Effect::Connect => self.manager.connect(),
                Effect::Disconnect => self.manager.disconnect(),
                Effect::Send(command) => {
                    if let Err(e) = self.manager.send(command) {
                        warn!(
                            component = "session_actor",
                            event = "session.send_failed",
                            job_id = ?self.state.job_id,
                            error = %e,
                            "Failed to queue command on transport"
                        );
                    }
                }
            }
        }

        self.publish();
    }

    fn publish(&self) {
        let current = self.snapshot.load_full();
        if *current == self.state.snapshot {
            return;
        }
        let next = Arc::new(self.state.snapshot.clone());
        self.snapshot.store(Arc::clone(&next));
        // No subscribers is fine.
        let _ = self.updates.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use matchpulse_protocol::{ClientMessage, MatchEvent, PlayerPosition, ServerMessage};

    use crate::config::TransportKind;
    use crate::connection::tests::{test_config, ScriptedConnector, ScriptedTransport};
    use crate::credentials::StaticToken;
    use crate::snapshot::LiveStatus;

    fn spawn_session(options: SessionOptions) -> (LiveSessionHandle, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::default());
        let (manager, events) = ConnectionManager::new(
            test_config(),
            Arc::new(StaticToken::new(Some("secret".to_string()))),
            connector.clone(),
        );
        (LiveSessionHandle::spawn(manager, events, options), connector)
    }

    async fn wait<F>(session: &LiveSessionHandle, predicate: F) -> Arc<LiveSnapshot>
    where
        F: FnMut(&LiveSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), session.wait_until(predicate))
            .await
            .expect("timed out waiting for snapshot")
            .expect("actor stopped")
    }

    async fn emit(transport: &ScriptedTransport, event: TransportEvent) {
        assert!(transport.events.emit(event).await);
    }

    async fn push(transport: &ScriptedTransport, msg: ServerMessage) {
        emit(transport, TransportEvent::Message(msg)).await;
    }

    fn connected() -> TransportEvent {
        TransportEvent::Connected {
            kind: TransportKind::Websocket,
        }
    }

    fn progress(job_id: &str, value: f64) -> ServerMessage {
        ServerMessage::AnalysisProgress {
            job_id: job_id.to_string(),
            progress: value,
        }
    }

    fn tracking(job_id: &str, player_id: &str) -> ServerMessage {
        ServerMessage::TrackingUpdate {
            job_id: job_id.to_string(),
            players: vec![PlayerPosition {
                player_id: player_id.to_string(),
                x: 0.5,
                y: 0.5,
                speed: 7.0,
            }],
        }
    }

    fn detected(job_id: &str, event_id: &str) -> ServerMessage {
        ServerMessage::EventDetected {
            job_id: job_id.to_string(),
            event: MatchEvent {
                id: event_id.to_string(),
                event_type: "goal".to_string(),
                timestamp: 2710.0,
                player: Some("p-9".to_string()),
                team: "away".to_string(),
                description: "Header at the far post".to_string(),
                position: None,
            },
        }
    }

    /// Bind `job_id`, acknowledge the connect, and return the live transport.
    async fn activate(
        session: &LiveSessionHandle,
        connector: &ScriptedConnector,
        job_id: &str,
    ) -> ScriptedTransport {
        session.bind_job(Some(job_id.to_string())).await;
        wait(session, |s| s.status == LiveStatus::Connecting).await;
        let transport = connector.take_latest();
        emit(&transport, connected()).await;
        wait(session, |s| s.status == LiveStatus::Active && s.is_connected).await;
        transport
    }

    #[tokio::test]
    async fn bind_progress_complete_leave_scenario() {
        let (session, connector) = spawn_session(SessionOptions::default());
        let mut transport = activate(&session, &connector, "job-42").await;

        assert_eq!(
            transport.commands.recv().await,
            Some(ClientMessage::JoinSession {
                job_id: "job-42".to_string()
            })
        );
        assert!(transport.commands.try_recv().is_err());

        push(&transport, progress("job-42", 55.0)).await;
        wait(&session, |s| s.progress == 55.0).await;

        push(&transport, progress("job-7", 90.0)).await;
        push(&transport, tracking("job-42", "p-1")).await;
        let snapshot = wait(&session, |s| !s.tracking_data.is_empty()).await;
        assert_eq!(snapshot.progress, 55.0);

        push(
            &transport,
            ServerMessage::AnalysisComplete {
                job_id: "job-42".to_string(),
            },
        )
        .await;
        let snapshot = wait(&session, |s| s.status == LiveStatus::Completed).await;
        assert_eq!(snapshot.progress, 100.0);

        session.leave_session().await;
        let snapshot = wait(&session, |s| *s == LiveSnapshot::default()).await;
        assert_eq!(*snapshot, LiveSnapshot::default());
        assert_eq!(session.current_job().await.as_deref(), Some("job-42"));

        assert_eq!(
            transport.commands.recv().await,
            Some(ClientMessage::LeaveSession {
                job_id: "job-42".to_string()
            })
        );
        assert_eq!(transport.commands.recv().await, None);
    }

    #[tokio::test]
    async fn join_without_job_does_nothing() {
        let (session, connector) = spawn_session(SessionOptions::default());
        session.join_session().await;

        assert_eq!(session.current_job().await, None);
        assert_eq!(session.snapshot().status, LiveStatus::Idle);
        assert_eq!(connector.start_count(), 0);
    }

    #[tokio::test]
    async fn leave_when_never_joined_is_harmless() {
        let (session, connector) = spawn_session(SessionOptions::default());
        session.leave_session().await;
        assert_eq!(session.current_job().await, None);
        assert_eq!(*session.snapshot(), LiveSnapshot::default());
        assert_eq!(connector.start_count(), 0);
    }

    #[tokio::test]
    async fn events_from_a_destroyed_transport_are_never_folded() {
        let (session, connector) = spawn_session(SessionOptions::default());
        let mut old = activate(&session, &connector, "job-42").await;

        session.bind_job(Some("job-43".to_string())).await;
        wait(&session, |s| s.status == LiveStatus::Connecting).await;
        let new = connector.take_latest();
        assert_ne!(old.events.generation(), new.events.generation());

        // Right job id, wrong (dead) transport.
        push(&old, progress("job-43", 77.0)).await;
        emit(&new, connected()).await;
        let snapshot = wait(&session, |s| s.status == LiveStatus::Active).await;
        assert_eq!(snapshot.progress, 0.0);

        assert!(matches!(
            old.commands.recv().await,
            Some(ClientMessage::JoinSession { .. })
        ));
        assert_eq!(
            old.commands.recv().await,
            Some(ClientMessage::LeaveSession {
                job_id: "job-42".to_string()
            })
        );
        assert_eq!(old.commands.recv().await, None);
    }

    #[tokio::test]
    async fn connect_error_then_consumer_rejoin_recovers() {
        let (session, connector) = spawn_session(SessionOptions::default());
        session.bind_job(Some("job-42".to_string())).await;
        wait(&session, |s| s.status == LiveStatus::Connecting).await;
        let first = connector.take_latest();

        emit(
            &first,
            TransportEvent::ConnectError {
                message: "401 Unauthorized".to_string(),
            },
        )
        .await;
        let snapshot = wait(&session, |s| s.status == LiveStatus::Error).await;
        assert_eq!(snapshot.error.as_deref(), Some("401 Unauthorized"));
        assert!(!snapshot.is_connected);

        session.join_session().await;
        wait(&session, |s| s.status == LiveStatus::Connecting).await;
        assert_eq!(connector.start_count(), 2);

        let second = connector.take_latest();
        emit(&second, connected()).await;
        let snapshot = wait(&session, |s| s.status == LiveStatus::Active).await;
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn dedup_option_is_honoured() {
        let options = SessionOptions {
            event_dedup: EventDedup::ById,
            ..Default::default()
        };
        let (session, connector) = spawn_session(options);
        let transport = activate(&session, &connector, "job-1").await;

        push(&transport, detected("job-1", "goal-1")).await;
        push(&transport, detected("job-1", "goal-1")).await;
        push(&transport, tracking("job-1", "p-2")).await;

        let snapshot = wait(&session, |s| !s.tracking_data.is_empty()).await;
        assert_eq!(snapshot.events.len(), 1);
    }

    #[tokio::test]
    async fn every_subscriber_sees_completion() {
        let (session, connector) = spawn_session(SessionOptions::default());
        let transport = activate(&session, &connector, "job-5").await;

        let first = session.clone();
        let second = session.clone();
        let first_done = tokio::spawn(async move {
            wait(&first, |s| s.status == LiveStatus::Completed).await
        });
        let second_done = tokio::spawn(async move {
            wait(&second, |s| s.status == LiveStatus::Completed).await
        });
        tokio::task::yield_now().await;

        push(
            &transport,
            ServerMessage::AnalysisComplete {
                job_id: "job-5".to_string(),
            },
        )
        .await;

        assert_eq!(first_done.await.unwrap().progress, 100.0);
        assert_eq!(second_done.await.unwrap().progress, 100.0);
    }

    #[tokio::test]
    async fn shutdown_tears_down_and_stops_actor() {
        let (session, connector) = spawn_session(SessionOptions::default());
        let mut transport = activate(&session, &connector, "job-9").await;

        session.shutdown().await;

        assert_eq!(*session.snapshot(), LiveSnapshot::default());
        assert_eq!(session.current_job().await, None);
        assert!(session.subscribe().await.is_none());

        assert!(matches!(
            transport.commands.recv().await,
            Some(ClientMessage::JoinSession { .. })
        ));
        assert!(matches!(
            transport.commands.recv().await,
            Some(ClientMessage::LeaveSession { .. })
        ));
        assert_eq!(transport.commands.recv().await, None);
    }
}
