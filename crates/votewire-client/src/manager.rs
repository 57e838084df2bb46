//! Connection lifecycle.
//!
//! A [`ConnectionManager`] is a cheap handle onto one actor task that owns
//! the transport session, the subscription router and all lifecycle state.
//! Public calls, open completions, retry timers and inbound frames are all
//! processed by that task one at a time, so transitions never interleave.
//!
//! Lifecycle:
//!
//! ```text
//! DISCONNECTED --connect--> CONNECTING --open ok--> CONNECTED
//!                               |                       |
//!                               +--open err--> ERROR <--+ drop
//!                                                |
//!                         retry after delay <----+ (while attempts <= max)
//! ```
//!
//! `disconnect()` returns to `DISCONNECTED` from any state and cancels a
//! pending retry.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;
use votewire_core::{
    ClientError, ConnectionStatus, ResourceId, SessionSnapshot, TransportError,
};

use crate::config::ClientConfig;
use crate::router::{HandlerSlot, SubscriptionRouter};
use crate::transport::{
    OpenedSession, Transport, TransportEvent, TransportEvents, TransportSession,
};

/// Called once per successful connection, before any frame is delivered.
pub type ConnectedHandler = Arc<dyn Fn() + Send + Sync>;

/// Called once per transport failure.
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Result of a [`ConnectionManager::connect`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new attempt was started.
    Started,
    /// Already connecting or connected; nothing changed.
    AlreadyActive,
}

#[derive(Default)]
struct Callbacks {
    connected: Mutex<Option<ConnectedHandler>>,
    error: Mutex<Option<ErrorHandler>>,
}

impl Callbacks {
    fn connected(&self) -> Option<ConnectedHandler> {
        self.connected.lock().clone()
    }

    fn error(&self) -> Option<ErrorHandler> {
        self.error.lock().clone()
    }
}

enum Request {
    Connect {
        resource_id: ResourceId,
        reply: oneshot::Sender<Result<ConnectOutcome, ClientError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        destination: String,
        body: Vec<u8>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
}

enum Internal {
    OpenFinished {
        epoch: u64,
        resource_id: ResourceId,
        result: Result<OpenedSession, TransportError>,
    },
    RetryDue {
        seq: u64,
    },
}

struct PendingRetry {
    seq: u64,
    timer: JoinHandle<()>,
}

/// Handle onto the connection actor.
///
/// Clones share the same connection. The actor stops, closing any open
/// session, once every handle is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<SessionSnapshot>,
    callbacks: Arc<Callbacks>,
    handler: HandlerSlot,
    endpoint: Url,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Spawn the actor on the current Tokio runtime.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let callbacks = Arc::new(Callbacks::default());
        let handler = HandlerSlot::default();
        let endpoint = config.endpoint.clone();

        let actor = ManagerActor {
            transport,
            config,
            state_tx,
            callbacks: callbacks.clone(),
            router: SubscriptionRouter::new(handler.clone()),
            requests: requests_rx,
            internal_tx,
            internal_rx,
            status: ConnectionStatus::Disconnected,
            attempt_count: 0,
            resource_id: None,
            session: None,
            events: None,
            epoch: 0,
            retry: None,
            retry_seq: 0,
        };
        let _actor = tokio::spawn(actor.run());

        Self {
            requests: requests_tx,
            state: state_rx,
            callbacks,
            handler,
            endpoint,
        }
    }

    /// Start connecting to the topic of `resource_id`.
    ///
    /// Returns once the attempt is under way; observe [`Self::status`] or
    /// [`Self::watch_status`] for the outcome. A no-op while connecting or
    /// connected.
    pub async fn connect(
        &self,
        resource_id: impl Into<ResourceId>,
    ) -> Result<ConnectOutcome, ClientError> {
        let resource_id = resource_id.into();
        if resource_id.is_empty() {
            error!("cannot connect: resource id is empty");
            return Err(ClientError::Configuration(
                "resource id must not be empty".into(),
            ));
        }

        let (reply, rx) = oneshot::channel();
        self.request(Request::Connect { resource_id, reply })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Close the session and stop reconnecting. Safe from any state.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.request(Request::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Publish `payload` as JSON to `destination`.
    ///
    /// Fails with [`ClientError::NotConnected`] without writing anything
    /// unless the status is `CONNECTED`.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        destination: &str,
        payload: &T,
    ) -> Result<(), ClientError> {
        let body = serde_json::to_vec(payload).map_err(ClientError::Encode)?;
        let (reply, rx) = oneshot::channel();
        self.request(Request::Send {
            destination: destination.to_string(),
            body,
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Register the message handler, replacing any previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handler.set(Arc::new(handler));
    }

    /// Register the connected callback, replacing any previous one.
    pub fn on_connected<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.callbacks.connected.lock() = Some(Arc::new(handler));
    }

    /// Register the connection error callback, replacing any previous one.
    pub fn on_connection_error<F>(&self, handler: F)
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        *self.callbacks.error.lock() = Some(Arc::new(handler));
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Whether the status is `CONNECTED`.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Current status, attempt counter and resource.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch_status(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Wait until the status equals `status`.
    pub async fn wait_for_status(&self, status: ConnectionStatus) -> Result<(), ClientError> {
        let mut rx = self.state.clone();
        let _ = rx
            .wait_for(|snapshot| snapshot.status == status)
            .await
            .map_err(|_| ClientError::Closed)?;
        Ok(())
    }

    /// Broker endpoint this manager connects to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, request: Request) -> Result<(), ClientError> {
        self.requests.send(request).map_err(|_| ClientError::Closed)
    }
}

struct ManagerActor {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    state_tx: watch::Sender<SessionSnapshot>,
    callbacks: Arc<Callbacks>,
    router: SubscriptionRouter,
    requests: mpsc::UnboundedReceiver<Request>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    status: ConnectionStatus,
    attempt_count: u32,
    resource_id: Option<ResourceId>,
    session: Option<Box<dyn TransportSession>>,
    events: Option<TransportEvents>,
    /// Bumped on every new attempt and on disconnect; stale open results are discarded.
    epoch: u64,
    retry: Option<PendingRetry>,
    retry_seq: u64,
}

impl ManagerActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,
                event = next_event(&mut self.events) => self.handle_event(event),
            }
        }
        debug!("all handles dropped, shutting down connection");
        self.disconnect().await;
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect { resource_id, reply } => {
                let _ = reply.send(self.begin_connect(resource_id));
            }
            Request::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Request::Send {
                destination,
                body,
                reply,
            } => {
                let _ = reply.send(self.send(&destination, body).await);
            }
        }
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::OpenFinished {
                epoch,
                resource_id,
                result,
            } => self.on_open_finished(epoch, resource_id, result).await,
            Internal::RetryDue { seq } => self.on_retry_due(seq),
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message {
                subscription, body, ..
            } => {
                let _ = self.router.dispatch(&subscription, &body);
            }
            TransportEvent::Closed(err) => {
                if self.status == ConnectionStatus::Connected {
                    warn!(error = %err, "connection lost");
                    self.fail(err);
                } else {
                    self.events = None;
                }
            }
        }
    }

    fn begin_connect(&mut self, resource_id: ResourceId) -> Result<ConnectOutcome, ClientError> {
        if self.status.is_active() {
            warn!(
                status = %self.status,
                resource_id = %resource_id,
                "connection already active, ignoring connect"
            );
            return Ok(ConnectOutcome::AlreadyActive);
        }

        self.epoch += 1;
        self.resource_id = Some(resource_id.clone());
        self.status = ConnectionStatus::Connecting;
        self.publish();
        info!(
            endpoint = %self.config.endpoint,
            resource_id = %resource_id,
            "connecting"
        );

        let epoch = self.epoch;
        let transport = self.transport.clone();
        let endpoint = self.config.endpoint.clone();
        let connect_timeout = self.config.connect_timeout;
        let tx = self.internal_tx.clone();
        let _open = tokio::spawn(async move {
            let result = match tokio::time::timeout(connect_timeout, transport.open(&endpoint)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::new(
                    "connect",
                    format!("timed out after {}ms", connect_timeout.as_millis()),
                )),
            };
            let _ = tx.send(Internal::OpenFinished {
                epoch,
                resource_id,
                result,
            });
        });

        Ok(ConnectOutcome::Started)
    }

    async fn on_open_finished(
        &mut self,
        epoch: u64,
        resource_id: ResourceId,
        result: Result<OpenedSession, TransportError>,
    ) {
        if epoch != self.epoch || self.status != ConnectionStatus::Connecting {
            if let Ok(opened) = result {
                debug!(resource_id = %resource_id, "closing session opened after disconnect");
                let _ = tokio::time::timeout(self.config.disconnect_timeout, opened.session.close())
                    .await;
            }
            return;
        }

        let OpenedSession { session, events } = match result {
            Ok(opened) => opened,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        self.status = ConnectionStatus::Connected;
        if let Err(err) = self.router.bind(session.as_ref(), &resource_id).await {
            match tokio::time::timeout(self.config.disconnect_timeout, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(close_err)) => debug!(error = %close_err, "close after failed subscribe"),
                Err(_) => debug!("close after failed subscribe timed out"),
            }
            self.fail(err);
            return;
        }

        self.attempt_count = 0;
        self.session = Some(session);
        self.events = Some(events);
        self.publish();
        info!(
            endpoint = %self.config.endpoint,
            resource_id = %resource_id,
            "connected"
        );

        if let Some(callback) = self.callbacks.connected() {
            callback();
        }
    }

    fn on_retry_due(&mut self, seq: u64) {
        if self.retry.as_ref().is_none_or(|retry| retry.seq != seq) {
            return;
        }
        self.retry = None;

        if self.status == ConnectionStatus::Connected {
            debug!("already connected, skipping scheduled reconnect");
            return;
        }
        if let Some(resource_id) = self.resource_id.clone() {
            let _ = self.begin_connect(resource_id);
        }
    }

    fn fail(&mut self, err: TransportError) {
        self.status = ConnectionStatus::Error;
        self.publish();
        error!(error = %err, "connection error");

        let err = ClientError::Transport(err);
        if let Some(callback) = self.callbacks.error() {
            callback(&err);
        }

        let _ = self.router.unbind();
        self.session = None;
        self.events = None;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.publish();

        let max_attempts = self.config.max_reconnect_attempts;
        if self.attempt_count > max_attempts {
            error!(
                attempts = self.attempt_count,
                max_attempts, "max reconnection attempts reached"
            );
            return;
        }

        let delay = self.config.reconnect_delay;
        info!(
            attempt = self.attempt_count,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );

        if let Some(previous) = self.retry.take() {
            previous.timer.abort();
        }
        self.retry_seq += 1;
        let seq = self.retry_seq;
        let tx = self.internal_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::RetryDue { seq });
        });
        self.retry = Some(PendingRetry { seq, timer });
    }

    async fn disconnect(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.timer.abort();
        }
        if self.status == ConnectionStatus::Disconnected {
            debug!("already disconnected");
            return;
        }

        self.epoch += 1;
        let subscription = self.router.unbind();
        self.events = None;

        if let Some(session) = self.session.take() {
            if let Some(sub) = subscription {
                if let Err(err) = session.unsubscribe(&sub.id).await {
                    debug!(error = %err, topic = %sub.topic_path, "unsubscribe failed");
                }
            }
            match tokio::time::timeout(self.config.disconnect_timeout, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "graceful close failed"),
                Err(_) => warn!(
                    timeout_ms = u64::try_from(self.config.disconnect_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "graceful close timed out"
                ),
            }
        }

        self.status = ConnectionStatus::Disconnected;
        self.publish();
        info!("disconnected");
    }

    async fn send(&mut self, destination: &str, body: Vec<u8>) -> Result<(), ClientError> {
        let session = match (&self.session, self.status) {
            (Some(session), ConnectionStatus::Connected) => session,
            _ => {
                error!(status = %self.status, destination, "cannot send message: not connected");
                return Err(ClientError::NotConnected {
                    status: self.status,
                });
            }
        };

        session.send(destination, body).await.map_err(|err| {
            error!(error = %err, destination, "error sending message");
            ClientError::Transport(err)
        })
    }

    fn publish(&self) {
        let _ = self.state_tx.send_replace(SessionSnapshot {
            status: self.status,
            attempt_count: self.attempt_count,
            resource_id: self.resource_id.clone(),
        });
    }
}

async fn next_event(events: &mut Option<TransportEvents>) -> TransportEvent {
    match events {
        Some(rx) => rx.recv().await.unwrap_or_else(|| {
            TransportEvent::Closed(TransportError::new("read", "event stream ended"))
        }),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{OpenScript, ScriptedTransport, SessionCall};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;
    use votewire_core::VoteUpdate;
    use votewire_core::constants::VOTE_DESTINATION;

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:8080/api").unwrap()
    }

    fn manager(transport: &Arc<ScriptedTransport>) -> ConnectionManager {
        let transport: Arc<dyn Transport> = transport.clone();
        ConnectionManager::new(config(), transport)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    fn collect_messages(manager: &ConnectionManager) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.on_message(move |payload| sink.lock().push(payload));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reaches_connected_and_subscribes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        let manager = manager(&transport);

        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        let outcome = manager.connect("evt-42").await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Started);
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();

        assert!(manager.is_connected());
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.attempt_count, 0);
        assert_eq!(snapshot.resource_id, Some(ResourceId::from("evt-42")));
        assert_eq!(transport.endpoints()[0].as_str(), "http://localhost:8080/ws");

        let session = transport.last_session().unwrap();
        assert_matches!(
            session.calls().as_slice(),
            [SessionCall::Subscribe { topic, .. }] if topic == "/topic/event/evt-42"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_active() {
        let (logs, _guard) = votewire_core::logging::capture_logs();
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OpenScript::AcceptAfter(Duration::from_secs(1)));
        let manager = manager(&transport);

        assert_eq!(manager.connect("evt-1").await.unwrap(), ConnectOutcome::Started);
        assert_eq!(manager.status(), ConnectionStatus::Connecting);
        assert_eq!(
            manager.connect("evt-1").await.unwrap(),
            ConnectOutcome::AlreadyActive
        );

        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();
        assert_eq!(
            manager.connect("evt-1").await.unwrap(),
            ConnectOutcome::AlreadyActive
        );
        settle().await;
        assert_eq!(transport.open_count(), 1);
        assert!(logs.has_event(tracing::Level::WARN, "connection already active"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_resource_id_is_rejected_without_transition() {
        let (logs, _guard) = votewire_core::logging::capture_logs();
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);

        assert_matches!(
            manager.connect("  ").await,
            Err(ClientError::Configuration(_))
        );
        settle().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(transport.open_count(), 0);
        assert!(logs.has_event(tracing::Level::ERROR, "resource id is empty"));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_reconnect_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let errors = Arc::new(Mutex::new(0));
        let counter = errors.clone();
        manager.on_connection_error(move |_| *counter.lock() += 1);

        let _ = manager.connect("evt-1").await.unwrap();
        settle().await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(manager.snapshot().attempt_count, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.open_count(), 2);
        assert_eq!(manager.snapshot().attempt_count, 2);

        tokio::time::sleep(Duration::from_secs(5 * 12)).await;
        assert_eq!(transport.open_count(), 11);
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(manager.snapshot().attempt_count, 11);
        assert_eq!(*errors.lock(), 11);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.open_count(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_retry_resets_attempt_count() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reject_next("refused");
        transport.reject_next("refused");
        transport.accept_next();
        let manager = manager(&transport);

        let _ = manager.connect("evt-1").await.unwrap();
        settle().await;
        assert_eq!(manager.snapshot().attempt_count, 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.open_count(), 3);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(manager.snapshot().attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_vote_updates_to_handler() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        let manager = manager(&transport);
        let seen = collect_messages(&manager);

        let _ = manager.connect("evt-42").await.unwrap();
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();

        let session = transport.last_session().unwrap();
        assert!(session.publish(
            "/topic/event/evt-42",
            r#"{"candidateId":"c1","totalVotes":5}"#
        ));
        settle().await;

        let seen = seen.lock();
        assert_eq!(*seen, vec![json!({"candidateId": "c1", "totalVotes": 5})]);
        let update = VoteUpdate::from_value(&seen[0]).unwrap();
        assert_eq!(update.total_votes, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frame_keeps_connection() {
        let (logs, _guard) = votewire_core::logging::capture_logs();
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        let manager = manager(&transport);
        let seen = collect_messages(&manager);

        let _ = manager.connect("evt-42").await.unwrap();
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();

        let session = transport.last_session().unwrap();
        assert!(session.publish("/topic/event/evt-42", "not json"));
        assert!(session.publish("/topic/event/evt-42", r#"{"totalVotes":6}"#));
        settle().await;

        assert_eq!(*seen.lock(), vec![json!({"totalVotes": 6})]);
        assert!(manager.is_connected());
        assert!(logs.has_event(tracing::Level::ERROR, "dropping undecodable frame"));
    }

    #[tokio::test(start_paused = true)]
    async fn connected_callback_runs_before_first_frame() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OpenScript::AcceptWith(vec![TransportEvent::Message {
            subscription: "sub-0".into(),
            destination: "/topic/event/evt-1".into(),
            body: b"{}".to_vec(),
        }]));
        let manager = manager(&transport);
        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        manager.on_connected(move || o.lock().push("connected"));
        let o = order.clone();
        manager.on_message(move |_| o.lock().push("message"));

        let _ = manager.connect("evt-1").await.unwrap();
        settle().await;
        assert_eq!(*order.lock(), vec!["connected", "message"]);
    }

    #[tokio::test(start_paused = true)]
    async fn last_message_handler_wins() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        let manager = manager(&transport);
        let first = collect_messages(&manager);
        let second = collect_messages(&manager);

        let _ = manager.connect("evt-1").await.unwrap();
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();
        let _ = transport
            .last_session()
            .unwrap()
            .publish("/topic/event/evt-1", "{}");
        settle().await;

        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);

        let err = manager
            .send(
                VOTE_DESTINATION,
                &VoteUpdate::vote_added(ResourceId::from("evt-1"), ResourceId::from(3u64)),
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ClientError::NotConnected {
                status: ConnectionStatus::Disconnected
            }
        );
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_writes_serialized_payload() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        let manager = manager(&transport);
        let _ = manager.connect("evt-1").await.unwrap();
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();

        manager
            .send(VOTE_DESTINATION, &json!({"eventId": "evt-1", "candidateId": 3}))
            .await
            .unwrap();

        let sends = transport.last_session().unwrap().sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "/app/vote");
        let body: Value = serde_json::from_slice(&sends[0].1).unwrap();
        assert_eq!(body, json!({"eventId": "evt-1", "candidateId": 3}));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_discards_later_frames() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        let manager = manager(&transport);
        let seen = collect_messages(&manager);
        let _ = manager.connect("evt-1").await.unwrap();
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();
        let session = transport.last_session().unwrap();

        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(session.is_closed());
        assert_matches!(
            session.calls().as_slice(),
            [
                SessionCall::Subscribe { .. },
                SessionCall::Unsubscribe { .. },
                SessionCall::Close
            ]
        );

        let _ = session.deliver("sub-0", "/topic/event/evt-1", "{}");
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_when_disconnected_is_noop() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_retry() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let _ = manager.connect("evt-1").await.unwrap();
        settle().await;
        assert_eq!(manager.status(), ConnectionStatus::Error);

        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn open_completing_after_disconnect_is_discarded() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OpenScript::AcceptAfter(Duration::from_secs(2)));
        let manager = manager(&transport);
        let _ = manager.connect("evt-1").await.unwrap();
        manager.disconnect().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(transport.last_session().unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connection_reports_and_reconnects() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_next();
        transport.accept_next();
        let manager = manager(&transport);
        let connects = Arc::new(Mutex::new(0));
        let c = connects.clone();
        manager.on_connected(move || *c.lock() += 1);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        manager.on_connection_error(move |err| e.lock().push(err.kind()));

        let _ = manager.connect("evt-1").await.unwrap();
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .unwrap();
        transport.last_session().unwrap().drop_connection("reset by peer");
        settle().await;

        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(manager.snapshot().attempt_count, 1);
        assert_eq!(*errors.lock(), vec![votewire_core::ErrorKind::Transport]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(manager.snapshot().attempt_count, 0);
        assert_eq!(*connects.lock(), 2);
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_counts_as_connection_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OpenScript::AcceptUnsubscribable);
        let manager = manager(&transport);
        let connects = Arc::new(Mutex::new(0));
        let c = connects.clone();
        manager.on_connected(move || *c.lock() += 1);

        let _ = manager.connect("evt-1").await.unwrap();
        settle().await;
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(manager.snapshot().attempt_count, 1);
        assert_eq!(*connects.lock(), 0);
        let session = transport.session(0).unwrap();
        assert!(session.is_closed());
        assert_eq!(session.calls(), vec![SessionCall::Close]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_open_times_out() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OpenScript::AcceptAfter(Duration::from_secs(60)));
        let manager = manager(&transport);
        let _ = manager.connect("evt-1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(10) + Duration::from_millis(100)).await;
        assert_eq!(manager.status(), ConnectionStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_observes_transitions() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OpenScript::AcceptAfter(Duration::from_secs(1)));
        let manager = manager(&transport);
        let mut rx = manager.watch_status();

        let _ = manager.connect("evt-1").await.unwrap();
        rx.changed().await.unwrap();
        let mut statuses = vec![rx.borrow_and_update().status];
        while statuses.last() != Some(&ConnectionStatus::Connected) {
            rx.changed().await.unwrap();
            statuses.push(rx.borrow_and_update().status);
        }
        assert_eq!(statuses.first(), Some(&ConnectionStatus::Connecting));
    }
}
