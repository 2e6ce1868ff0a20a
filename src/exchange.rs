// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchanges
//!
//! This module validates the `exchanges` section into exchange descriptors.
//! Exchanges are the routing mechanism in RabbitMQ that determine how messages
//! are distributed to queues. Besides its own options, an exchange may list the
//! queues bound to it under `queueBindings`; those queues must already be
//! registered, so exchanges are built after queues.

use crate::{
    connection::{Connection, ConnectionFactory},
    data_bag::DataBag,
    errors::{AmqpError, ConfigError},
    queue::{Queue, QueueFactory},
    validator::{
        entity_body, validate, validate_all, Category, DefaultValue, DefaultsTable,
        ValidatedConfig,
    },
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Constant for the header field used to specify the delayed exchange type
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";

/// Recognized exchange options.
pub const DEFAULTS: &DefaultsTable = &[
    ("connection", DefaultValue::Str("default")),
    ("type", DefaultValue::Str("direct")),
    ("passive", DefaultValue::Bool(false)),
    ("durable", DefaultValue::Bool(true)),
    ("autoDelete", DefaultValue::Bool(false)),
    ("internal", DefaultValue::Bool(false)),
    ("noWait", DefaultValue::Bool(false)),
    ("arguments", DefaultValue::EmptyMap),
    ("queueBindings", DefaultValue::EmptyMap),
];

/// Recognized options of one entry of `queueBindings`.
pub const BINDING_DEFAULTS: &DefaultsTable = &[
    ("routingKey", DefaultValue::Str("")),
    ("noWait", DefaultValue::Bool(false)),
    ("arguments", DefaultValue::EmptyMap),
];

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    #[serde(rename = "x-delayed-message")]
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
            }
        }
    }
}

/// Binding of a registered queue to an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueBindingDescriptor {
    pub queue: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: Map<String, Value>,
}

impl QueueBindingDescriptor {
    fn from_validated(queue: &str, cfg: &ValidatedConfig) -> Result<Self, ConfigError> {
        Ok(QueueBindingDescriptor {
            queue: queue.to_owned(),
            routing_key: cfg.str("routingKey")?.to_owned(),
            no_wait: cfg.bool("noWait")?,
            arguments: cfg.map("arguments")?.clone(),
        })
    }
}

/// Validated definition of a RabbitMQ exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDescriptor {
    pub name: String,
    pub connection: String,
    pub kind: ExchangeKind,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: Map<String, Value>,
    pub queue_bindings: Vec<QueueBindingDescriptor>,
}

impl ExchangeDescriptor {
    pub(crate) fn from_validated(cfg: &ValidatedConfig) -> Result<Self, ConfigError> {
        let kind = ExchangeKind::deserialize(Value::String(cfg.str("type")?.to_owned()))
            .map_err(|err| cfg.invalid("type", err.to_string()))?;

        let mut arguments = cfg.map("arguments")?.clone();
        if kind == ExchangeKind::XMessageDelayed {
            arguments
                .entry(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE)
                .or_insert_with(|| Value::String("direct".to_owned()));
        }

        let queue_bindings = cfg
            .map("queueBindings")?
            .iter()
            .map(|(queue, body)| {
                let entity = format!("{} -> {}", cfg.entity(), queue);
                let supplied = entity_body(Category::Exchange, &entity, body)?;
                let binding = validate(Category::Exchange, &entity, BINDING_DEFAULTS, &supplied)?;
                QueueBindingDescriptor::from_validated(queue, &binding)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(ExchangeDescriptor {
            name: cfg.entity().to_owned(),
            connection: cfg.str("connection")?.to_owned(),
            kind,
            passive: cfg.bool("passive")?,
            durable: cfg.bool("durable")?,
            auto_delete: cfg.bool("autoDelete")?,
            internal: cfg.bool("internal")?,
            no_wait: cfg.bool("noWait")?,
            arguments,
            queue_bindings,
        })
    }
}

/// An exchange bound to its connection, together with the queues bound to it.
#[derive(Debug, Clone)]
pub struct Exchange {
    descriptor: ExchangeDescriptor,
    connection: Arc<Connection>,
    queues: Vec<Queue>,
}

impl Exchange {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ExchangeDescriptor {
        &self.descriptor
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Queues bound through `queueBindings`, in binding order.
    pub fn bound_queues(&self) -> &[Queue] {
        &self.queues
    }

    /// Declares the exchange, then declares and binds every bound queue.
    pub async fn declare(&self) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", self.name());

        let transport = self.connection.transport().await?;
        transport
            .declare_exchange(&self.descriptor)
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = self.name(),
                    "error to declare the exchange"
                );
                err
            })?;

        for (queue, binding) in self.queues.iter().zip(&self.descriptor.queue_bindings) {
            queue.declare().await?;

            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue,
                self.name(),
                binding.routing_key
            );
            transport.bind_queue(self.name(), binding).await?;
        }

        debug!("exchange: {} was created", self.name());
        Ok(())
    }
}

/// Hands out exchange handles by name.
#[derive(Debug)]
pub struct ExchangeFactory {
    data_bag: DataBag<ExchangeDescriptor>,
    connections: Arc<ConnectionFactory>,
    queues: Arc<QueueFactory>,
}

impl ExchangeFactory {
    /// All validated exchange descriptors, by name.
    pub fn data_bag(&self) -> &DataBag<ExchangeDescriptor> {
        &self.data_bag
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data_bag.contains(name)
    }

    /// Builds a handle for a configured exchange.
    ///
    /// # Parameters
    /// * `name` - The exchange name
    ///
    /// # Returns
    /// The exchange with its connection and the handles of its bound queues,
    /// or `AmqpError::EntityNotFound`
    pub fn get_exchange(&self, name: &str) -> Result<Exchange, AmqpError> {
        let descriptor = self
            .data_bag
            .get(name)
            .ok_or_else(|| AmqpError::EntityNotFound(Category::Exchange, name.to_owned()))?;

        let queues = descriptor
            .queue_bindings
            .iter()
            .map(|binding| self.queues.get_queue(&binding.queue))
            .collect::<Result<Vec<_>, AmqpError>>()?;

        Ok(Exchange {
            descriptor: descriptor.clone(),
            connection: self.connections.get_connection(&descriptor.connection)?,
            queues,
        })
    }

    /// Checks that `name`, referenced by `entity` of `category`, is a registered exchange.
    pub(crate) fn resolve(
        &self,
        category: Category,
        entity: &str,
        name: &str,
    ) -> Result<(), ConfigError> {
        if self.contains(name) {
            return Ok(());
        }

        error!(
            category = category.to_string(),
            entity,
            exchange = name,
            "unknown exchange referenced"
        );
        Err(ConfigError::Reference {
            category,
            entity: entity.to_owned(),
            key: "exchange".to_owned(),
            target: Category::Exchange,
            name: name.to_owned(),
        })
    }

    /// Checks that `exchange` lives on `connection`, the connection `entity` of
    /// `category` works on.
    pub(crate) fn check_connection(
        &self,
        category: Category,
        entity: &str,
        exchange: &str,
        connection: &str,
    ) -> Result<(), ConfigError> {
        match self.data_bag.get(exchange) {
            Some(def) if def.connection != connection => {
                error!(
                    category = category.to_string(),
                    entity,
                    exchange,
                    "exchange declared on another connection"
                );
                Err(ConfigError::InvalidValue {
                    category,
                    entity: entity.to_owned(),
                    key: "connection".to_owned(),
                    reason: format!(
                        "exchange `{exchange}` is declared on connection `{}`, not `{connection}`",
                        def.connection
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builds the exchange factory from the `exchanges` section.
pub fn build(
    section: &Map<String, Value>,
    connections: Arc<ConnectionFactory>,
    queues: Arc<QueueFactory>,
) -> Result<Arc<ExchangeFactory>, ConfigError> {
    let data_bag = validate_all(Category::Exchange, DEFAULTS, section)?
        .values()
        .map(|cfg| {
            let def = ExchangeDescriptor::from_validated(cfg)?;
            connections.resolve(Category::Exchange, &def.name, &def.connection)?;
            for binding in &def.queue_bindings {
                queues.resolve(Category::Exchange, &def.name, "queueBindings", &binding.queue)?;
                queues.check_connection(
                    Category::Exchange,
                    &def.name,
                    &binding.queue,
                    &def.connection,
                )?;
            }
            Ok((def.name.clone(), def))
        })
        .collect::<Result<DataBag<_>, ConfigError>>()?;

    Ok(Arc::new(ExchangeFactory {
        data_bag,
        connections,
        queues,
    }))
}
