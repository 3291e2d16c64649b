//! Connection manager: owns at most one transport at a time.
//!
//! The transport is built lazily, never connects on construction unless
//! `auto_connect` is set, and is destroyed outright on `disconnect()`, so
//! the next `get_transport()` starts from a fresh generation whose events
//! cannot be confused with the old one's.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use matchpulse_protocol::ClientMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::credentials::CredentialSource;
use crate::error::LiveError;
use crate::transport::{
    AuthPayload, ConnectRequest, Connector, EventSink, TaggedEvent, TransportEvent,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;
/// How long a destroyed transport gets to flush its close before it is aborted
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Receiving side for every event any transport of this manager produces
pub type TransportEvents = mpsc::Receiver<TaggedEvent>;

/// One transport instance
pub struct Transport {
    generation: u64,
    auth: Arc<ArcSwap<AuthPayload>>,
    command_tx: Option<mpsc::UnboundedSender<ClientMessage>>,
    task: Option<JoinHandle<()>>,
    connected: bool,
}

impl Transport {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn auth(&self) -> Arc<AuthPayload> {
        self.auth.load_full()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// A connection attempt is running (handshaking, connected or reconnecting)
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn start(
        &mut self,
        connector: &dyn Connector,
        config: &TransportConfig,
        events_tx: &mpsc::Sender<TaggedEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = connector.start(ConnectRequest {
            config: config.clone(),
            auth: Arc::clone(&self.auth),
            commands: command_rx,
            events: EventSink::new(self.generation, events_tx.clone()),
        });
        self.command_tx = Some(command_tx);
        self.task = Some(task);
    }

    fn shutdown(mut self) {
        // Closing the command channel asks the task to close its link.
        self.command_tx = None;
        let Some(mut task) = self.task.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }
}

/// Owner of the process' single live transport
pub struct ConnectionManager {
    config: TransportConfig,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::Sender<TaggedEvent>,
    transport: Option<Transport>,
    next_generation: u64,
}

impl ConnectionManager {
    pub fn new(
        config: TransportConfig,
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn Connector>,
    ) -> (Self, TransportEvents) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Self {
            config,
            credentials,
            connector,
            events_tx,
            transport: None,
            next_generation: 1,
        };
        (manager, events_rx)
    }

    /// The current transport, building one if none exists.
    pub fn get_transport(&mut self) -> &Transport {
        let transport = self.take_or_build(self.config.auto_connect);
        self.transport.insert(transport)
    }

    /// `auto_start` honors `auto_connect` for a freshly built transport.
    fn take_or_build(&mut self, auto_start: bool) -> Transport {
        if let Some(transport) = self.transport.take() {
            return transport;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let auth = AuthPayload::new(self.credentials.access_token());
        let mut transport = Transport {
            generation,
            auth: Arc::new(ArcSwap::from_pointee(auth)),
            command_tx: None,
            task: None,
            connected: false,
        };
        debug!(
            component = "connection",
            event = "connection.transport.created",
            generation,
            endpoint = %self.config.endpoint,
            "Transport created"
        );

        if auto_start {
            transport.start(&*self.connector, &self.config, &self.events_tx);
        }
        transport
    }

    /// Refresh credentials, then connect unless already connected or connecting.
    pub fn connect(&mut self) {
        // Never auto-start here: the handshake must see the refreshed token.
        let mut transport = self.take_or_build(false);
        transport
            .auth
            .store(Arc::new(AuthPayload::new(self.credentials.access_token())));

        if transport.is_running() {
            debug!(
                component = "connection",
                event = "connection.connect.skipped",
                generation = transport.generation,
                connected = transport.connected,
                "Transport already running"
            );
        } else {
            info!(
                component = "connection",
                event = "connection.connect",
                generation = transport.generation,
                "Connecting transport"
            );
            transport.start(&*self.connector, &self.config, &self.events_tx);
        }
        self.transport = Some(transport);
    }

    /// Destroy the transport. Safe to call when nothing was ever connected.
    pub fn disconnect(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        info!(
            component = "connection",
            event = "connection.disconnect",
            generation = transport.generation,
            "Destroying transport"
        );
        transport.shutdown();
    }

    /// Queue an outbound command on the current transport.
    pub fn send(&self, command: ClientMessage) -> Result<(), LiveError> {
        let tx = self
            .transport
            .as_ref()
            .and_then(|t| t.command_tx.as_ref())
            .ok_or(LiveError::NotConnected)?;
        tx.send(command).map_err(|_| LiveError::ChannelClosed)
    }

    /// Whether an event was produced by the transport that is current now.
    pub fn is_current(&self, generation: u64) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.generation == generation)
    }

    /// Track lifecycle signals from the current transport.
    pub fn observe(&mut self, event: &TaggedEvent) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if transport.generation != event.generation {
            return;
        }
        match event.event {
            TransportEvent::Connected { .. } => transport.connected = true,
            TransportEvent::Disconnected { .. } => transport.connected = false,
            TransportEvent::ConnectError { .. } => {
                // The attempt is over; a later connect() starts a new one.
                transport.connected = false;
                if let Some(task) = transport.task.take() {
                    task.abort();
                }
                transport.command_tx = None;
            }
            TransportEvent::Message(_) => {}
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.connected)
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use reqwest::Url;

    /// A transport the test drives by hand
    pub(crate) struct ScriptedTransport {
        pub auth: Arc<ArcSwap<AuthPayload>>,
        pub commands: mpsc::UnboundedReceiver<ClientMessage>,
        pub events: EventSink,
        /// Token the handshake would have used at start time
        pub auth_at_start: Arc<AuthPayload>,
    }

    /// Records every start request instead of opening sockets
    #[derive(Default)]
    pub(crate) struct ScriptedConnector {
        started: Mutex<Vec<ScriptedTransport>>,
        starts: AtomicUsize,
    }

    impl ScriptedConnector {
        pub(crate) fn start_count(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        pub(crate) fn take_latest(&self) -> ScriptedTransport {
            self.started
                .lock()
                .unwrap()
                .pop()
                .expect("connector was never started")
        }
    }

    impl Connector for ScriptedConnector {
        fn start(&self, request: ConnectRequest) -> JoinHandle<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().push(ScriptedTransport {
                auth_at_start: request.auth.load_full(),
                auth: request.auth,
                commands: request.commands,
                events: request.events,
            });
            tokio::spawn(std::future::pending())
        }
    }

    pub(crate) fn test_config() -> TransportConfig {
        TransportConfig::new(Url::parse("http://127.0.0.1:9").unwrap())
    }

    fn counting_credentials() -> Arc<dyn CredentialSource> {
        let calls = AtomicUsize::new(0);
        Arc::new(move || Some(format!("token-{}", calls.fetch_add(1, Ordering::SeqCst) + 1)))
    }

    fn manager_with(
        config: TransportConfig,
    ) -> (ConnectionManager, TransportEvents, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::default());
        let (manager, events) =
            ConnectionManager::new(config, counting_credentials(), connector.clone());
        (manager, events, connector)
    }

    #[tokio::test]
    async fn get_transport_is_lazy_and_does_not_connect() {
        let (mut manager, _events, connector) = manager_with(test_config());
        assert!(!manager.has_transport());

        let generation = manager.get_transport().generation();
        assert_eq!(manager.get_transport().generation(), generation);
        assert_eq!(
            manager.get_transport().auth().token.as_deref(),
            Some("token-1")
        );
        assert_eq!(connector.start_count(), 0);
    }

    #[tokio::test]
    async fn auto_connect_starts_on_construction() {
        let mut config = test_config();
        config.auto_connect = true;
        let (mut manager, _events, connector) = manager_with(config);
        manager.get_transport();
        assert_eq!(connector.start_count(), 1);
    }

    #[tokio::test]
    async fn auto_connect_first_handshake_uses_refreshed_token() {
        let mut config = test_config();
        config.auto_connect = true;
        let (mut manager, _events, connector) = manager_with(config);
        manager.connect();

        assert_eq!(connector.start_count(), 1);
        let started = connector.take_latest();
        assert_eq!(started.auth_at_start.token.as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn connect_refreshes_credentials_before_handshake() {
        let (mut manager, _events, connector) = manager_with(test_config());
        manager.get_transport();
        manager.connect();

        let started = connector.take_latest();
        assert_eq!(started.auth.load().token.as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_running() {
        let (mut manager, _events, connector) = manager_with(test_config());
        manager.connect();
        manager.connect();
        manager.connect();
        assert_eq!(connector.start_count(), 1);
    }

    #[tokio::test]
    async fn connect_after_connect_error_starts_a_new_attempt() {
        let (mut manager, _events, connector) = manager_with(test_config());
        manager.connect();
        let generation = manager.get_transport().generation();

        manager.observe(&TaggedEvent {
            generation,
            event: TransportEvent::ConnectError {
                message: "refused".to_string(),
            },
        });
        manager.connect();

        assert_eq!(connector.start_count(), 2);
        assert_eq!(manager.get_transport().generation(), generation);
    }

    #[tokio::test]
    async fn disconnect_destroys_transport_and_next_one_is_fresh() {
        let (mut manager, _events, _connector) = manager_with(test_config());
        manager.connect();
        let first = manager.get_transport().generation();

        manager.disconnect();
        assert!(!manager.has_transport());
        assert!(!manager.is_current(first));
        assert!(matches!(
            manager.send(ClientMessage::JoinSession {
                job_id: "j".to_string()
            }),
            Err(LiveError::NotConnected)
        ));

        let second = manager.get_transport().generation();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn disconnect_without_transport_is_a_no_op() {
        let (mut manager, _events, _connector) = manager_with(test_config());
        manager.disconnect();
        manager.disconnect();
        assert!(!manager.has_transport());
    }

    #[tokio::test]
    async fn observe_tracks_connection_of_current_generation_only() {
        let (mut manager, _events, _connector) = manager_with(test_config());
        manager.connect();
        let generation = manager.get_transport().generation();

        manager.observe(&TaggedEvent {
            generation: generation + 100,
            event: TransportEvent::Connected {
                kind: crate::config::TransportKind::Websocket,
            },
        });
        assert!(!manager.is_connected());

        manager.observe(&TaggedEvent {
            generation,
            event: TransportEvent::Connected {
                kind: crate::config::TransportKind::Websocket,
            },
        });
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn send_queues_on_the_running_transport() {
        let (mut manager, _events, connector) = manager_with(test_config());
        manager.connect();
        manager
            .send(ClientMessage::JoinSession {
                job_id: "job-1".to_string(),
            })
            .unwrap();

        let mut started = connector.take_latest();
        assert_eq!(
            started.commands.recv().await,
            Some(ClientMessage::JoinSession {
                job_id: "job-1".to_string()
            })
        );
    }
}
