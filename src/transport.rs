// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport Seam
//!
//! Runtime handles never talk to the broker client directly. They go through the
//! [`Connector`] and [`Transport`] traits defined here, which the `lapin`
//! implementation in [`crate::channel`] provides for production use.

use crate::{
    connection::ConnectionDescriptor,
    errors::AmqpError,
    exchange::{ExchangeDescriptor, QueueBindingDescriptor},
    handler::ConsumerHandler,
    queue::QueueDescriptor,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::{collections::BTreeMap, sync::Arc};

#[cfg(test)]
use mockall::automock;

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
    pub delivery_mode: u8,
    pub headers: BTreeMap<String, String>,
}

/// Parameters for a consuming session on one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub queue: String,
    pub tag: String,
    pub prefetch_count: u16,
    /// Stop after this many messages; run until the stream ends otherwise
    pub limit: Option<u64>,
}

/// Opens broker connections for connection descriptors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, def: &ConnectionDescriptor) -> Result<Arc<dyn Transport>, AmqpError>;
}

/// Operations available on an open broker connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn declare_queue(&self, def: &QueueDescriptor) -> Result<(), AmqpError>;

    async fn declare_exchange(&self, def: &ExchangeDescriptor) -> Result<(), AmqpError>;

    async fn bind_queue(
        &self,
        exchange: &str,
        binding: &QueueBindingDescriptor,
    ) -> Result<(), AmqpError>;

    async fn publish(&self, ctx: &Context, msg: &OutgoingMessage) -> Result<(), AmqpError>;

    /// Consumes from a queue, returning how many messages were handled.
    async fn consume(
        &self,
        req: &ConsumeRequest,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Result<u64, AmqpError>;
}
