// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queues
//!
//! Queue descriptors are validated from the `queues` section and bound to the
//! connection they name. Broker-side features such as message TTL, max length or
//! dead lettering are expressed through the free-form `arguments` table
//! (`x-message-ttl`, `x-max-length`, `x-dead-letter-exchange`, ...).

use crate::{
    connection::{Connection, ConnectionFactory},
    data_bag::DataBag,
    errors::{AmqpError, ConfigError},
    validator::{validate_all, Category, DefaultValue, DefaultsTable, ValidatedConfig},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Recognized queue options.
pub const DEFAULTS: &DefaultsTable = &[
    ("connection", DefaultValue::Str("default")),
    ("passive", DefaultValue::Bool(false)),
    ("durable", DefaultValue::Bool(true)),
    ("exclusive", DefaultValue::Bool(false)),
    ("autoDelete", DefaultValue::Bool(false)),
    ("noWait", DefaultValue::Bool(false)),
    ("arguments", DefaultValue::EmptyMap),
];

/// Validated definition of a RabbitMQ queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDescriptor {
    pub name: String,
    pub connection: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: Map<String, Value>,
}

impl QueueDescriptor {
    pub(crate) fn from_validated(cfg: &ValidatedConfig) -> Result<Self, ConfigError> {
        Ok(QueueDescriptor {
            name: cfg.entity().to_owned(),
            connection: cfg.str("connection")?.to_owned(),
            passive: cfg.bool("passive")?,
            durable: cfg.bool("durable")?,
            exclusive: cfg.bool("exclusive")?,
            auto_delete: cfg.bool("autoDelete")?,
            no_wait: cfg.bool("noWait")?,
            arguments: cfg.map("arguments")?.clone(),
        })
    }
}

/// A queue bound to its connection.
#[derive(Debug, Clone)]
pub struct Queue {
    descriptor: QueueDescriptor,
    connection: Arc<Connection>,
}

impl Queue {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &QueueDescriptor {
        &self.descriptor
    }

    /// The connection the queue is declared on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Declares the queue on its connection.
    pub async fn declare(&self) -> Result<(), AmqpError> {
        debug!("creating queue: {}", self.name());

        let transport = self.connection.transport().await?;
        transport.declare_queue(&self.descriptor).await.map_err(|err| {
            error!(error = err.to_string(), name = self.name(), "error to declare the queue");
            err
        })?;

        debug!("queue: {} was created", self.name());
        Ok(())
    }
}

/// Hands out queue handles by name.
#[derive(Debug)]
pub struct QueueFactory {
    data_bag: DataBag<QueueDescriptor>,
    connections: Arc<ConnectionFactory>,
}

impl QueueFactory {
    /// All validated queue descriptors, by name.
    pub fn data_bag(&self) -> &DataBag<QueueDescriptor> {
        &self.data_bag
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data_bag.contains(name)
    }

    /// Builds a handle for a configured queue.
    ///
    /// # Parameters
    /// * `name` - The queue name
    ///
    /// # Returns
    /// The queue bound to its connection, or `AmqpError::EntityNotFound`
    pub fn get_queue(&self, name: &str) -> Result<Queue, AmqpError> {
        let descriptor = self
            .data_bag
            .get(name)
            .ok_or_else(|| AmqpError::EntityNotFound(Category::Queue, name.to_owned()))?;

        Ok(Queue {
            descriptor: descriptor.clone(),
            connection: self.connections.get_connection(&descriptor.connection)?,
        })
    }

    /// Checks that `name`, referenced by `entity` of `category` through `key`,
    /// is a registered queue.
    pub(crate) fn resolve(
        &self,
        category: Category,
        entity: &str,
        key: &str,
        name: &str,
    ) -> Result<(), ConfigError> {
        if self.contains(name) {
            return Ok(());
        }

        error!(category = category.to_string(), entity, queue = name, "unknown queue referenced");
        Err(ConfigError::Reference {
            category,
            entity: entity.to_owned(),
            key: key.to_owned(),
            target: Category::Queue,
            name: name.to_owned(),
        })
    }

    /// Checks that `queue` lives on `connection`, the connection `entity` of
    /// `category` works on.
    pub(crate) fn check_connection(
        &self,
        category: Category,
        entity: &str,
        queue: &str,
        connection: &str,
    ) -> Result<(), ConfigError> {
        match self.data_bag.get(queue) {
            Some(def) if def.connection != connection => {
                error!(
                    category = category.to_string(),
                    entity,
                    queue,
                    "queue declared on another connection"
                );
                Err(ConfigError::InvalidValue {
                    category,
                    entity: entity.to_owned(),
                    key: "connection".to_owned(),
                    reason: format!(
                        "queue `{queue}` is declared on connection `{}`, not `{connection}`",
                        def.connection
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builds the queue factory from the `queues` section.
pub fn build(
    section: &Map<String, Value>,
    connections: Arc<ConnectionFactory>,
) -> Result<Arc<QueueFactory>, ConfigError> {
    let data_bag = validate_all(Category::Queue, DEFAULTS, section)?
        .values()
        .map(|cfg| {
            let def = QueueDescriptor::from_validated(cfg)?;
            connections.resolve(Category::Queue, &def.name, &def.connection)?;
            Ok((def.name.clone(), def))
        })
        .collect::<Result<DataBag<_>, ConfigError>>()?;

    Ok(Arc::new(QueueFactory {
        data_bag,
        connections,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection,
        transport::{Connector, MockConnector, MockTransport, Transport},
    };
    use serde_json::json;

    fn connections(value: Value) -> Arc<ConnectionFactory> {
        connection::build(
            value.as_object().unwrap(),
            Arc::new(MockConnector::new()),
            true,
        )
        .unwrap()
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let factory = build(
            json!({ "jobs": { "durable": false } }).as_object().unwrap(),
            connections(json!({ "default": { "host": "localhost" } })),
        )
        .unwrap();

        let def = factory.data_bag().get("jobs").unwrap();
        assert_eq!(
            def,
            &QueueDescriptor {
                name: "jobs".to_owned(),
                connection: "default".to_owned(),
                passive: false,
                durable: false,
                exclusive: false,
                auto_delete: false,
                no_wait: false,
                arguments: Map::new(),
            }
        );
    }

    #[test]
    fn omitted_connection_resolves_to_default() {
        let factory = build(
            json!({ "jobs": {} }).as_object().unwrap(),
            connections(json!({})),
        )
        .unwrap();

        let queue = factory.get_queue("jobs").unwrap();
        assert_eq!(queue.connection().name(), "default");
    }

    #[test]
    fn undefined_connection_fails_the_build() {
        let err = build(
            json!({ "jobs": { "connection": "backup" } }).as_object().unwrap(),
            connections(json!({})),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Reference { name, .. } if name == "backup"));
    }

    #[test]
    fn arguments_are_kept_verbatim() {
        let factory = build(
            json!({ "jobs": { "arguments": { "x-message-ttl": 5000 } } })
                .as_object()
                .unwrap(),
            connections(json!({})),
        )
        .unwrap();

        let def = factory.data_bag().get("jobs").unwrap();
        assert_eq!(def.arguments.get("x-message-ttl"), Some(&json!(5000)));
    }

    #[tokio::test]
    async fn declare_goes_through_the_queue_connection() {
        let mut transport = MockTransport::new();
        transport
            .expect_declare_queue()
            .withf(|def| def.name == "jobs" && def.durable)
            .times(1)
            .returning(|_| Ok(()));
        let transport: Arc<dyn Transport> = Arc::new(transport);

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|def| def.name == "events")
            .returning(move |_| Ok(transport.clone()));
        let connector: Arc<dyn Connector> = Arc::new(connector);

        let connections = connection::build(
            json!({ "events": {} }).as_object().unwrap(),
            connector,
            true,
        )
        .unwrap();
        let factory = build(
            json!({ "jobs": { "connection": "events" } }).as_object().unwrap(),
            connections,
        )
        .unwrap();

        factory.get_queue("jobs").unwrap().declare().await.unwrap();
    }
}
