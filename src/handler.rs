// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handlers
//!
//! Consumers reference their message callback by an opaque identifier in the
//! configuration. The application registers the actual handlers under those
//! identifiers in a [`HandlerRegistry`]; the identifier is only resolved when a
//! consumer starts consuming.

use async_trait::async_trait;
use opentelemetry::Context;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Errors a handler reports back to the consuming loop.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessagingError {
    #[error("internal error")]
    InternalError,

    #[error("failure to parse payload")]
    ParsePayloadError,

    #[error("failure to handle message `{0}`")]
    HandlerError(String),
}

/// A message delivered to a consumer handler.
#[derive(Debug, Clone, Default)]
pub struct ConsumerMessage {
    pub from: String,
    pub msg_type: String,
    pub data: Box<[u8]>,
    pub headers: Option<HashMap<String, String>>,
}

impl ConsumerMessage {
    pub fn new<T>(
        from: T,
        msg_type: T,
        data: &[u8],
        headers: Option<HashMap<String, String>>,
    ) -> Self
    where
        T: Into<String>,
    {
        ConsumerMessage {
            from: from.into(),
            msg_type: msg_type.into(),
            data: data.into(),
            headers,
        }
    }
}

/// Application callback invoked for every consumed message.
///
/// Returning `Ok` acknowledges the message; an error rejects it without requeue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError>;
}

/// Handlers keyed by the callback identifier used in consumer configuration.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ConsumerHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    /// Adds a handler under `callback`, replacing any previous one.
    pub fn register(mut self, callback: &str, handler: Arc<dyn ConsumerHandler>) -> Self {
        self.handlers.insert(callback.to_owned(), handler);
        self
    }

    pub fn get(&self, callback: &str) -> Option<Arc<dyn ConsumerHandler>> {
        self.handlers.get(callback).cloned()
    }

    pub fn callbacks(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("callbacks", &self.callbacks())
            .finish()
    }
}
