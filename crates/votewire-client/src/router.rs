//! Routing of inbound frames to the single message handler.
//!
//! The router owns at most one [`Subscription`] per session. Frames for any
//! other subscription, or arriving after [`SubscriptionRouter::unbind`], are
//! discarded. Bodies that are not JSON are logged and dropped without
//! touching the subscription.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};
use votewire_core::{DecodeError, ResourceId, TransportError, topic_path};

use crate::transport::TransportSession;

/// Consumer of decoded payloads.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Single-callback slot; the last registration wins.
#[derive(Clone, Default)]
pub struct HandlerSlot(Arc<Mutex<Option<MessageHandler>>>);

impl HandlerSlot {
    /// Replace the registered handler.
    pub fn set(&self, handler: MessageHandler) {
        *self.0.lock() = Some(handler);
    }

    /// Current handler, if any.
    pub fn get(&self) -> Option<MessageHandler> {
        self.0.lock().clone()
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandlerSlot")
            .field(&self.0.lock().is_some())
            .finish()
    }
}

/// Logical binding of a session to one topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    /// Broker-side subscription ID.
    pub id: String,
    /// Topic derived from the resource ID.
    pub topic_path: String,
    /// Cleared when the owning session leaves `CONNECTED`.
    pub active: bool,
}

/// What happened to one inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Decoded and handed to the handler.
    Delivered,
    /// Decoded, but no handler is registered.
    NoHandler,
    /// Body was not JSON; dropped.
    DecodeFailed,
    /// No active subscription matches; dropped.
    Discarded,
}

/// Owns the active subscription and forwards its frames.
#[derive(Debug)]
pub struct SubscriptionRouter {
    handler: HandlerSlot,
    current: Option<Subscription>,
    next_id: u64,
}

impl SubscriptionRouter {
    /// Router delivering to whatever `handler` holds at dispatch time.
    pub fn new(handler: HandlerSlot) -> Self {
        Self {
            handler,
            current: None,
            next_id: 0,
        }
    }

    /// Subscribe `session` to the topic of `resource_id`.
    ///
    /// Any previous subscription is replaced.
    pub async fn bind(
        &mut self,
        session: &dyn TransportSession,
        resource_id: &ResourceId,
    ) -> Result<&Subscription, TransportError> {
        let _ = self.unbind();
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        let topic = topic_path(resource_id);

        session.subscribe(&id, &topic).await?;
        debug!(topic = %topic, subscription = %id, "subscribed");

        Ok(self.current.insert(Subscription {
            id,
            topic_path: topic,
            active: true,
        }))
    }

    /// Mark the subscription inactive. Returns it if it was active.
    pub fn unbind(&mut self) -> Option<Subscription> {
        let sub = self.current.as_mut().filter(|s| s.active)?;
        sub.active = false;
        Some(Subscription {
            active: true,
            ..sub.clone()
        })
    }

    /// The current (possibly inactive) subscription.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.current.as_ref()
    }

    /// Decode and deliver one frame, synchronously and in arrival order.
    pub fn dispatch(&self, subscription: &str, body: &[u8]) -> Dispatch {
        let Some(sub) = self
            .current
            .as_ref()
            .filter(|s| s.active && s.id == subscription)
        else {
            debug!(subscription, "discarding frame without an active subscription");
            return Dispatch::Discarded;
        };

        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(source) => {
                let err = DecodeError {
                    topic: sub.topic_path.clone(),
                    source,
                };
                error!(error = %err, "dropping undecodable frame");
                return Dispatch::DecodeFailed;
            }
        };

        match self.handler.get() {
            Some(handler) => {
                handler(payload);
                Dispatch::Delivered
            }
            None => {
                debug!(topic = %sub.topic_path, "no message handler registered");
                Dispatch::NoHandler
            }
        }
    }
}
