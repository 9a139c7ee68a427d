//! Routes inbound envelopes to command handlers.
//!
//! The dispatcher owns a `type -> handler` table built once at startup.
//! Handlers are looked up by the envelope's `type`; unknown types and
//! handler panics are answered with an error to the originating connection
//! and never reach other clients.

mod context;
pub mod handlers;


pub use context::HandlerContext;

use crate::error::ServiceError;
use crate::protocol::Envelope;
use crate::service::Services;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

/// A command handler: consumes a payload and reports through the context.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: HandlerContext, payload: Value) -> BoxFuture<'static, ()>;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext, payload: Value) -> BoxFuture<'static, ()> {
        (self)(ctx, payload).boxed()
    }
}

pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl Dispatcher {
    /// Empty dispatcher; every message type is unknown until registered.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher with every entity command wired to `services`.
    pub fn with_services(services: &Services) -> Self {
        let mut dispatcher = Self::new();
        handlers::register_all(&mut dispatcher, services);
        dispatcher
    }

    /// Register (or replace) the handler for `msg_type`.
    pub fn register(&mut self, msg_type: impl Into<String>, handler: impl Handler) -> &mut Self {
        self.handlers.insert(msg_type.into(), Box::new(handler));
        self
    }

    pub fn handles(&self, msg_type: &str) -> bool {
        self.handlers.contains_key(msg_type)
    }

    /// Registered message types, sorted.
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Run the handler registered for `envelope.msg_type`.
    pub async fn dispatch(&self, ctx: &HandlerContext, envelope: Envelope) {
        let Some(handler) = self.handlers.get(envelope.msg_type.as_str()) else {
            warn!(
                connection_id = ctx.connection_id(),
                msg_type = %envelope.msg_type,
                "Unknown message type"
            );
            ctx.send_error(&ServiceError::validation("unknown message type"));
            return;
        };

        debug!(
            connection_id = ctx.connection_id(),
            msg_type = %envelope.msg_type,
            "Dispatching command"
        );

        let call = AssertUnwindSafe(handler.call(ctx.clone(), envelope.payload));
        if call.catch_unwind().await.is_err() {
            error!(
                connection_id = ctx.connection_id(),
                msg_type = %envelope.msg_type,
                "Command handler panicked"
            );
            ctx.send_error(&ServiceError::Internal(format!(
                "{} failed unexpectedly",
                envelope.msg_type
            )));
        }
    }

    /// Decode a raw text frame and dispatch it.
    pub async fn dispatch_text(&self, ctx: &HandlerContext, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => self.dispatch(ctx, envelope).await,
            Err(e) => {
                warn!(connection_id = ctx.connection_id(), error = %e, "Malformed message");
                ctx.send_error(&ServiceError::validation(format!("malformed message: {}", e)));
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
