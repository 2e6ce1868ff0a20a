// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Producers
//!
//! A producer publishes either to a named exchange or straight to a named queue
//! (through the default exchange, using the queue name as routing key). Exactly
//! one of the two targets must be configured.

use crate::{
    connection::{Connection, ConnectionFactory},
    data_bag::DataBag,
    errors::{AmqpError, ConfigError},
    exchange::ExchangeFactory,
    queue::QueueFactory,
    transport::OutgoingMessage,
    validator::{validate_all, Category, DefaultValue, DefaultsTable, ValidatedConfig},
};
use opentelemetry::Context;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};

/// AMQP delivery mode for transient messages
pub const DELIVERY_MODE_NON_PERSISTENT: u8 = 1;
/// AMQP delivery mode for messages that survive a broker restart
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Recognized producer options.
pub const DEFAULTS: &DefaultsTable = &[
    ("connection", DefaultValue::Str("default")),
    ("exchange", DefaultValue::Null),
    ("queue", DefaultValue::Null),
    ("contentType", DefaultValue::Str("text/plain")),
    ("deliveryMode", DefaultValue::Int(DELIVERY_MODE_PERSISTENT as i64)),
];

/// Where a producer sends its messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTarget {
    Exchange(String),
    Queue(String),
}

/// Validated definition of a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerDescriptor {
    pub name: String,
    pub connection: String,
    pub target: PublishTarget,
    pub content_type: String,
    pub delivery_mode: u8,
}

impl ProducerDescriptor {
    pub(crate) fn from_validated(cfg: &ValidatedConfig) -> Result<Self, ConfigError> {
        let target = match (cfg.opt_str("exchange")?, cfg.opt_str("queue")?) {
            (Some(exchange), None) => PublishTarget::Exchange(exchange.to_owned()),
            (None, Some(queue)) => PublishTarget::Queue(queue.to_owned()),
            (None, None) => {
                return Err(ConfigError::MissingOption {
                    category: Category::Producer,
                    entity: cfg.entity().to_owned(),
                    key: "exchange".to_owned(),
                })
            }
            (Some(_), Some(_)) => {
                return Err(cfg.invalid(
                    "queue",
                    "a producer publishes either to an exchange or to a queue, not both".to_owned(),
                ))
            }
        };

        let delivery_mode = cfg.u8("deliveryMode")?;
        if delivery_mode != DELIVERY_MODE_NON_PERSISTENT
            && delivery_mode != DELIVERY_MODE_PERSISTENT
        {
            return Err(cfg.invalid(
                "deliveryMode",
                format!("expected 1 or 2, found {delivery_mode}"),
            ));
        }

        Ok(ProducerDescriptor {
            name: cfg.entity().to_owned(),
            connection: cfg.str("connection")?.to_owned(),
            target,
            content_type: cfg.str("contentType")?.to_owned(),
            delivery_mode,
        })
    }
}

/// A producer bound to its connection.
#[derive(Debug, Clone)]
pub struct Producer {
    descriptor: ProducerDescriptor,
    connection: Arc<Connection>,
}

impl Producer {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ProducerDescriptor {
        &self.descriptor
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Publishes a payload to the producer's target.
    ///
    /// `routing_key` is used when publishing to an exchange; publishing to a queue
    /// always routes by the queue name.
    pub async fn publish(
        &self,
        ctx: &Context,
        payload: &[u8],
        routing_key: Option<&str>,
        headers: BTreeMap<String, String>,
    ) -> Result<(), AmqpError> {
        let msg = self.message(payload, routing_key, headers);

        debug!(
            producer = self.name(),
            exchange = msg.exchange.as_str(),
            routing_key = msg.routing_key.as_str(),
            "publishing message"
        );

        let transport = self.connection.transport().await?;
        transport.publish(ctx, &msg).await.map_err(|err| {
            error!(error = err.to_string(), producer = self.name(), "error publishing message");
            err
        })
    }

    fn message(
        &self,
        payload: &[u8],
        routing_key: Option<&str>,
        headers: BTreeMap<String, String>,
    ) -> OutgoingMessage {
        let (exchange, routing_key) = match &self.descriptor.target {
            PublishTarget::Exchange(exchange) => {
                (exchange.clone(), routing_key.unwrap_or_default().to_owned())
            }
            PublishTarget::Queue(queue) => (String::new(), queue.clone()),
        };

        OutgoingMessage {
            exchange,
            routing_key,
            payload: payload.to_vec(),
            content_type: self.descriptor.content_type.clone(),
            delivery_mode: self.descriptor.delivery_mode,
            headers,
        }
    }
}

/// Hands out producer handles by name.
#[derive(Debug)]
pub struct ProducerFactory {
    data_bag: DataBag<ProducerDescriptor>,
    connections: Arc<ConnectionFactory>,
    exchanges: Arc<ExchangeFactory>,
    queues: Arc<QueueFactory>,
}

impl ProducerFactory {
    pub fn data_bag(&self) -> &DataBag<ProducerDescriptor> {
        &self.data_bag
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data_bag.contains(name)
    }

    pub fn exchanges(&self) -> &Arc<ExchangeFactory> {
        &self.exchanges
    }

    pub fn queues(&self) -> &Arc<QueueFactory> {
        &self.queues
    }

    pub fn get_producer(&self, name: &str) -> Result<Producer, AmqpError> {
        let descriptor = self
            .data_bag
            .get(name)
            .ok_or_else(|| AmqpError::EntityNotFound(Category::Producer, name.to_owned()))?;

        Ok(Producer {
            descriptor: descriptor.clone(),
            connection: self.connections.get_connection(&descriptor.connection)?,
        })
    }
}

/// Builds the producer factory from the `producers` section.
pub fn build(
    section: &Map<String, Value>,
    connections: Arc<ConnectionFactory>,
    exchanges: Arc<ExchangeFactory>,
    queues: Arc<QueueFactory>,
) -> Result<Arc<ProducerFactory>, ConfigError> {
    let data_bag = validate_all(Category::Producer, DEFAULTS, section)?
        .values()
        .map(|cfg| {
            let def = ProducerDescriptor::from_validated(cfg)?;
            connections.resolve(Category::Producer, &def.name, &def.connection)?;
            match &def.target {
                PublishTarget::Exchange(exchange) => {
                    exchanges.resolve(Category::Producer, &def.name, exchange)?;
                    exchanges.check_connection(
                        Category::Producer,
                        &def.name,
                        exchange,
                        &def.connection,
                    )?
                }
                PublishTarget::Queue(queue) => {
                    queues.resolve(Category::Producer, &def.name, "queue", queue)?;
                    queues.check_connection(Category::Producer, &def.name, queue, &def.connection)?
                }
            }
            Ok((def.name.clone(), def))
        })
        .collect::<Result<DataBag<_>, ConfigError>>()?;

    Ok(Arc::new(ProducerFactory {
        data_bag,
        connections,
        exchanges,
        queues,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection, exchange, queue,
        transport::{MockConnector, MockTransport, Transport},
    };
    use serde_json::json;

    fn build_with(
        connector: MockConnector,
        value: Value,
    ) -> Result<Arc<ProducerFactory>, ConfigError> {
        let connections = connection::build(&Map::new(), Arc::new(connector), true).unwrap();
        let queues = queue::build(json!({ "jobs": {} }).as_object().unwrap(), connections.clone())
            .unwrap();
        let exchanges = exchange::build(
            json!({ "events": {} }).as_object().unwrap(),
            connections.clone(),
            queues.clone(),
        )
        .unwrap();

        build(value.as_object().unwrap(), connections, exchanges, queues)
    }

    #[test]
    fn exchange_producer_with_defaults() {
        let factory = build_with(
            MockConnector::new(),
            json!({ "notify": { "exchange": "events" } }),
        )
        .unwrap();

        assert_eq!(
            factory.data_bag().get("notify").unwrap(),
            &ProducerDescriptor {
                name: "notify".to_owned(),
                connection: "default".to_owned(),
                target: PublishTarget::Exchange("events".to_owned()),
                content_type: "text/plain".to_owned(),
                delivery_mode: DELIVERY_MODE_PERSISTENT,
            }
        );
    }

    #[test]
    fn producer_needs_a_target() {
        let err = build_with(MockConnector::new(), json!({ "notify": {} })).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { key, .. } if key == "exchange"));
    }

    #[test]
    fn producer_cannot_target_both() {
        let err = build_with(
            MockConnector::new(),
            json!({ "notify": { "exchange": "events", "queue": "jobs" } }),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "queue"));
    }

    #[test]
    fn unknown_targets_are_reference_errors() {
        let err = build_with(MockConnector::new(), json!({ "notify": { "exchange": "ghost" } }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Reference { target: Category::Exchange, .. }));

        let err = build_with(MockConnector::new(), json!({ "notify": { "queue": "ghost" } }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Reference { target: Category::Queue, .. }));

        let err = build_with(
            MockConnector::new(),
            json!({ "notify": { "queue": "jobs", "connection": "ghost" } }),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Reference { target: Category::Connection, .. }));
    }

    #[test]
    fn invalid_delivery_mode_is_rejected() {
        let err = build_with(
            MockConnector::new(),
            json!({ "notify": { "queue": "jobs", "deliveryMode": 3 } }),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "deliveryMode"));
    }

    #[tokio::test]
    async fn queue_producer_routes_by_queue_name() {
        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .withf(|_, msg| {
                msg.exchange.is_empty()
                    && msg.routing_key == "jobs"
                    && msg.payload == b"hello"
                    && msg.content_type == "application/json"
                    && msg.headers.get("tenant").map(String::as_str) == Some("acme")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let transport: Arc<dyn Transport> = Arc::new(transport);

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(transport.clone()));

        let factory = build_with(
            connector,
            json!({ "jobs": { "queue": "jobs", "contentType": "application/json" } }),
        )
        .unwrap();

        let headers = BTreeMap::from([("tenant".to_owned(), "acme".to_owned())]);
        factory
            .get_producer("jobs")
            .unwrap()
            .publish(&Context::new(), b"hello", Some("ignored"), headers)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exchange_producer_uses_routing_key() {
        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .withf(|_, msg| msg.exchange == "events" && msg.routing_key == "job.created")
            .times(1)
            .returning(|_, _| Err(AmqpError::PublishingError));
        let transport: Arc<dyn Transport> = Arc::new(transport);

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(transport.clone()));

        let factory = build_with(connector, json!({ "notify": { "exchange": "events" } })).unwrap();

        let res = factory
            .get_producer("notify")
            .unwrap()
            .publish(&Context::new(), b"{}", Some("job.created"), BTreeMap::new())
            .await;
        assert_eq!(res, Err(AmqpError::PublishingError));
    }
}
