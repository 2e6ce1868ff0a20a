// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumers
//!
//! A consumer reads from one registered queue and hands every message to the
//! application handler registered under its `callback` identifier. The identifier
//! is kept opaque during composition and only resolved when consuming starts.

use crate::{
    connection::{Connection, ConnectionFactory},
    data_bag::DataBag,
    errors::{AmqpError, ConfigError},
    handler::HandlerRegistry,
    queue::{Queue, QueueFactory},
    transport::ConsumeRequest,
    validator::{validate_all, Category, DefaultValue, DefaultsTable, ValidatedConfig},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Recognized consumer options.
pub const DEFAULTS: &DefaultsTable = &[
    ("connection", DefaultValue::Str("default")),
    ("queue", DefaultValue::Null),
    ("callback", DefaultValue::Null),
    ("prefetchCount", DefaultValue::Int(1)),
];

/// Validated definition of a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerDescriptor {
    pub name: String,
    pub connection: String,
    pub queue: String,
    /// Identifier of the handler in the [`HandlerRegistry`]
    pub callback: String,
    pub prefetch_count: u16,
}

impl ConsumerDescriptor {
    pub(crate) fn from_validated(cfg: &ValidatedConfig) -> Result<Self, ConfigError> {
        Ok(ConsumerDescriptor {
            name: cfg.entity().to_owned(),
            connection: cfg.str("connection")?.to_owned(),
            queue: cfg.required_str("queue")?.to_owned(),
            callback: cfg.required_str("callback")?.to_owned(),
            prefetch_count: cfg.u16("prefetchCount")?,
        })
    }
}

/// A consumer bound to its connection and queue.
#[derive(Debug, Clone)]
pub struct Consumer {
    descriptor: ConsumerDescriptor,
    connection: Arc<Connection>,
    queue: Queue,
    handlers: Arc<HandlerRegistry>,
}

impl Consumer {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ConsumerDescriptor {
        &self.descriptor
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Consumes messages from the queue, stopping after `limit` messages when given.
    ///
    /// Returns the number of messages handled.
    pub async fn consume(&self, limit: Option<u64>) -> Result<u64, AmqpError> {
        let handler = self
            .handlers
            .get(&self.descriptor.callback)
            .ok_or_else(|| {
                error!(
                    consumer = self.name(),
                    callback = self.descriptor.callback.as_str(),
                    "no handler registered for consumer callback"
                );
                AmqpError::HandlerNotRegistered(self.descriptor.callback.clone())
            })?;

        let req = ConsumeRequest {
            queue: self.queue.name().to_owned(),
            tag: self.name().to_owned(),
            prefetch_count: self.descriptor.prefetch_count,
            limit,
        };

        debug!(consumer = self.name(), queue = req.queue.as_str(), "starting consumer");

        let transport = self.connection.transport().await?;
        let handled = transport.consume(&req, handler).await?;

        debug!(consumer = self.name(), handled, "consumer finished");
        Ok(handled)
    }
}

/// Hands out consumer handles by name.
#[derive(Debug)]
pub struct ConsumerFactory {
    data_bag: DataBag<ConsumerDescriptor>,
    connections: Arc<ConnectionFactory>,
    queues: Arc<QueueFactory>,
    handlers: Arc<HandlerRegistry>,
}

impl ConsumerFactory {
    pub fn data_bag(&self) -> &DataBag<ConsumerDescriptor> {
        &self.data_bag
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data_bag.contains(name)
    }

    pub fn get_consumer(&self, name: &str) -> Result<Consumer, AmqpError> {
        let descriptor = self
            .data_bag
            .get(name)
            .ok_or_else(|| AmqpError::EntityNotFound(Category::Consumer, name.to_owned()))?;

        Ok(Consumer {
            descriptor: descriptor.clone(),
            connection: self.connections.get_connection(&descriptor.connection)?,
            queue: self.queues.get_queue(&descriptor.queue)?,
            handlers: self.handlers.clone(),
        })
    }
}

/// Builds the consumer factory from the `consumers` section.
pub fn build(
    section: &Map<String, Value>,
    connections: Arc<ConnectionFactory>,
    queues: Arc<QueueFactory>,
    handlers: Arc<HandlerRegistry>,
) -> Result<Arc<ConsumerFactory>, ConfigError> {
    let data_bag = validate_all(Category::Consumer, DEFAULTS, section)?
        .values()
        .map(|cfg| {
            let def = ConsumerDescriptor::from_validated(cfg)?;
            connections.resolve(Category::Consumer, &def.name, &def.connection)?;
            queues.resolve(Category::Consumer, &def.name, "queue", &def.queue)?;
            queues.check_connection(Category::Consumer, &def.name, &def.queue, &def.connection)?;
            Ok((def.name.clone(), def))
        })
        .collect::<Result<DataBag<_>, ConfigError>>()?;

    Ok(Arc::new(ConsumerFactory {
        data_bag,
        connections,
        queues,
        handlers,
    }))
}
