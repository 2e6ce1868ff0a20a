// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Client
//!
//! The product of composition: owns the five factories and hands out runtime
//! handles by name.

use crate::{
    connection::{Connection, ConnectionFactory},
    consumer::{Consumer, ConsumerFactory},
    errors::AmqpError,
    exchange::{Exchange, ExchangeFactory},
    producer::{Producer, ProducerFactory},
    queue::{Queue, QueueFactory},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

/// Entry point to a composed topology.
///
/// Cloning is cheap: clones share the same factories and connections.
#[derive(Debug, Clone)]
pub struct Client {
    connections: Arc<ConnectionFactory>,
    queues: Arc<QueueFactory>,
    exchanges: Arc<ExchangeFactory>,
    producers: Arc<ProducerFactory>,
    consumers: Arc<ConsumerFactory>,
}

impl Client {
    /// Creates a client over already built factories.
    pub fn new(
        connections: Arc<ConnectionFactory>,
        queues: Arc<QueueFactory>,
        exchanges: Arc<ExchangeFactory>,
        producers: Arc<ProducerFactory>,
        consumers: Arc<ConsumerFactory>,
    ) -> Client {
        Client {
            connections,
            queues,
            exchanges,
            producers,
            consumers,
        }
    }

    /// The factory of connection handles.
    pub fn connections(&self) -> &Arc<ConnectionFactory> {
        &self.connections
    }

    pub fn queues(&self) -> &Arc<QueueFactory> {
        &self.queues
    }

    pub fn exchanges(&self) -> &Arc<ExchangeFactory> {
        &self.exchanges
    }

    pub fn producers(&self) -> &Arc<ProducerFactory> {
        &self.producers
    }

    pub fn consumers(&self) -> &Arc<ConsumerFactory> {
        &self.consumers
    }

    /// Looks up a connection by its configured name.
    ///
    /// # Parameters
    /// * `name` - The name the connection has in the topology document
    ///
    /// # Returns
    /// The shared connection handle, or `AmqpError::EntityNotFound` if no connection has that name
    pub fn get_connection(&self, name: &str) -> Result<Arc<Connection>, AmqpError> {
        self.connections.get_connection(name)
    }

    /// Looks up a queue by its configured name.
    ///
    /// # Parameters
    /// * `name` - The name the queue has in the topology document
    ///
    /// # Returns
    /// A queue handle bound to its connection, or `AmqpError::EntityNotFound` if no queue has that name
    pub fn get_queue(&self, name: &str) -> Result<Queue, AmqpError> {
        self.queues.get_queue(name)
    }

    /// Looks up a exchange by its configured name.
    ///
    /// # Parameters
    /// * `name` - The name the exchange has in the topology document
    ///
    /// # Returns
    /// An exchange handle with its bound queues, or `AmqpError::EntityNotFound` if no exchange has that name
    pub fn get_exchange(&self, name: &str) -> Result<Exchange, AmqpError> {
        self.exchanges.get_exchange(name)
    }

    /// Looks up a producer by its configured name.
    ///
    /// # Parameters
    /// * `name` - The name the producer has in the topology document
    ///
    /// # Returns
    /// A producer ready to publish, or `AmqpError::EntityNotFound` if no producer has that name
    pub fn get_producer(&self, name: &str) -> Result<Producer, AmqpError> {
        self.producers.get_producer(name)
    }

    /// Looks up a consumer by its configured name.
    ///
    /// # Parameters
    /// * `name` - The name the consumer has in the topology document
    ///
    /// # Returns
    /// A consumer ready to consume, or `AmqpError::EntityNotFound` if no consumer has that name
    pub fn get_consumer(&self, name: &str) -> Result<Consumer, AmqpError> {
        self.consumers.get_consumer(name)
    }

    /// Opens every connection not marked `lazy`.
    pub async fn connect_eager(&self) -> Result<(), AmqpError> {
        for (name, def) in self.connections.data_bag().iter() {
            if def.lazy {
                continue;
            }
            debug!(connection = name.as_str(), "opening eager connection");
            self.connections.get_connection(name)?.transport().await?;
        }

        Ok(())
    }

    /// Declares every exchange with its queue bindings, then every queue no
    /// exchange binds.
    pub async fn declare_topology(&self) -> Result<(), AmqpError> {
        let mut declared = BTreeSet::new();

        for name in self.exchanges.data_bag().names() {
            let exchange = self.exchanges.get_exchange(name)?;
            exchange.declare().await?;
            declared.extend(exchange.bound_queues().iter().map(|q| q.name().to_owned()));
        }

        for name in self.queues.data_bag().names() {
            if declared.contains(name) {
                continue;
            }
            self.queues.get_queue(name)?.declare().await?;
        }

        debug!("topology declared");
        Ok(())
    }
}
