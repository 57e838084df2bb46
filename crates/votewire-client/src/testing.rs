//! In-memory transport for exercising the client without a broker.
//!
//! [`ScriptedTransport`] answers each `open` from a queue of
//! [`OpenScript`] steps (rejecting once the queue is empty). Every accepted
//! session hands back a [`SessionHandle`] the test uses to push frames,
//! drop the connection or inspect what the client wrote.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;
use votewire_core::TransportError;

use crate::transport::{OpenedSession, Transport, TransportEvent, TransportSession};

/// One scripted answer to `open`.
#[derive(Clone, Debug)]
pub enum OpenScript {
    /// Succeed immediately.
    Accept,
    /// Succeed immediately with frames already queued on the session.
    AcceptWith(Vec<TransportEvent>),
    /// Succeed after a delay.
    AcceptAfter(Duration),
    /// Succeed, but fail every subscribe on the session.
    AcceptUnsubscribable,
    /// Fail with the given detail.
    Reject(String),
}

/// Write-side call recorded on a [`RecordingSession`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SessionCall {
    Subscribe { id: String, topic: String },
    Unsubscribe { id: String },
    Send { destination: String, body: Vec<u8> },
    Close,
}

/// Scripted [`Transport`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<OpenScript>>,
    opens: AtomicUsize,
    endpoints: Mutex<Vec<Url>>,
    sessions: Mutex<Vec<SessionHandle>>,
}

impl ScriptedTransport {
    /// Transport that rejects every open until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for a future `open`.
    pub fn push(&self, step: OpenScript) {
        self.script.lock().push_back(step);
    }

    /// Accept the next unanswered open.
    pub fn accept_next(&self) {
        self.push(OpenScript::Accept);
    }

    /// Reject the next unanswered open.
    pub fn reject_next(&self, detail: &str) {
        self.push(OpenScript::Reject(detail.to_string()));
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Endpoints passed to `open`, in call order.
    pub fn endpoints(&self) -> Vec<Url> {
        self.endpoints.lock().clone()
    }

    /// Handle for the `index`th accepted session.
    pub fn session(&self, index: usize) -> Option<SessionHandle> {
        self.sessions.lock().get(index).cloned()
    }

    /// Handle for the most recently accepted session.
    pub fn last_session(&self) -> Option<SessionHandle> {
        self.sessions.lock().last().cloned()
    }

    fn accept(&self, queued: Vec<TransportEvent>, subscribable: bool) -> OpenedSession {
        let (mut session, handle) = RecordingSession::new();
        session.subscribable = subscribable;
        for event in queued {
            let _ = handle.events.send(event);
        }
        let events = handle.take_events();
        self.sessions.lock().push(handle);
        OpenedSession {
            session: Box::new(session),
            events,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, endpoint: &Url) -> Result<OpenedSession, TransportError> {
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().push(endpoint.clone());
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| OpenScript::Reject("connection refused".into()));

        match step {
            OpenScript::Accept => Ok(self.accept(Vec::new(), true)),
            OpenScript::AcceptWith(events) => Ok(self.accept(events, true)),
            OpenScript::AcceptAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.accept(Vec::new(), true))
            }
            OpenScript::AcceptUnsubscribable => Ok(self.accept(Vec::new(), false)),
            OpenScript::Reject(detail) => Err(TransportError::new("connect", detail)),
        }
    }
}

/// [`TransportSession`] that records every call.
#[derive(Debug)]
pub struct RecordingSession {
    calls: Arc<Mutex<Vec<SessionCall>>>,
    subscribable: bool,
}

impl RecordingSession {
    /// A session and the handle observing it.
    pub fn new() -> (Self, SessionHandle) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            calls: calls.clone(),
            subscribable: true,
        };
        let handle = SessionHandle {
            calls,
            events: events_tx,
            pending: Arc::new(Mutex::new(Some(events_rx))),
        };
        (session, handle)
    }
}

#[async_trait]
impl TransportSession for RecordingSession {
    async fn subscribe(&self, subscription_id: &str, topic: &str) -> Result<(), TransportError> {
        if !self.subscribable {
            return Err(TransportError::new("subscribe", "broker refused subscription"));
        }
        self.calls.lock().push(SessionCall::Subscribe {
            id: subscription_id.to_string(),
            topic: topic.to_string(),
        });
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError> {
        self.calls.lock().push(SessionCall::Unsubscribe {
            id: subscription_id.to_string(),
        });
        Ok(())
    }

    async fn send(&self, destination: &str, body: Vec<u8>) -> Result<(), TransportError> {
        self.calls.lock().push(SessionCall::Send {
            destination: destination.to_string(),
            body,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.calls.lock().push(SessionCall::Close);
        Ok(())
    }
}

/// Test-side view of one session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    calls: Arc<Mutex<Vec<SessionCall>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    pending: Arc<Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>>,
}

impl SessionHandle {
    /// Inbound receiver, available once.
    pub fn take_events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        match self.pending.lock().take() {
            Some(rx) => rx,
            None => mpsc::unbounded_channel().1,
        }
    }

    /// Push a frame for `subscription`. Returns false once the client stopped listening.
    pub fn deliver(&self, subscription: &str, destination: &str, body: impl Into<Vec<u8>>) -> bool {
        self.events
            .send(TransportEvent::Message {
                subscription: subscription.to_string(),
                destination: destination.to_string(),
                body: body.into(),
            })
            .is_ok()
    }

    /// Push a frame to whichever subscription the client holds on `topic`.
    pub fn publish(&self, topic: &str, body: impl Into<Vec<u8>>) -> bool {
        let id = self.calls.lock().iter().rev().find_map(|call| match call {
            SessionCall::Subscribe { id, topic: t } if t == topic => Some(id.clone()),
            _ => None,
        });
        match id {
            Some(id) => self.deliver(&id, topic, body),
            None => false,
        }
    }

    /// Simulate the broker or socket going away.
    pub fn drop_connection(&self, detail: &str) {
        let _ = self
            .events
            .send(TransportEvent::Closed(TransportError::new("read", detail)));
    }

    /// Every write-side call, in order.
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    /// `(destination, body)` of every send.
    pub fn sends(&self) -> Vec<(String, Vec<u8>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SessionCall::Send { destination, body } => Some((destination.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether the client closed the session.
    pub fn is_closed(&self) -> bool {
        self.calls.lock().contains(&SessionCall::Close)
    }
}
