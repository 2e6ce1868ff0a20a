// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Declaration
//!
//! Declaration of queues and exchanges and binding of queues to exchanges on a
//! `lapin` channel. Free-form `arguments` from the configuration are converted
//! into AMQP field tables here.

use crate::{
    channel::LapinTransport,
    errors::AmqpError,
    exchange::{ExchangeDescriptor, QueueBindingDescriptor},
    queue::QueueDescriptor,
};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Converts a JSON argument table into an AMQP field table.
pub fn field_table(args: &Map<String, Value>) -> FieldTable {
    let table: BTreeMap<ShortString, AMQPValue> = args
        .iter()
        .map(|(key, value)| (ShortString::from(key.clone()), amqp_value(value)))
        .collect();

    FieldTable::from(table)
}

fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(v) => AMQPValue::Boolean(*v),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(v), _) => match i32::try_from(v) {
                Ok(v) => AMQPValue::LongInt(v),
                Err(_) => AMQPValue::LongLongInt(v),
            },
            (None, Some(v)) => AMQPValue::Double(v),
            (None, None) => AMQPValue::Void,
        },
        Value::String(v) => AMQPValue::LongString(LongString::from(v.clone())),
        Value::Array(items) => AMQPValue::FieldArray(FieldArray::from(
            items.iter().map(amqp_value).collect::<Vec<_>>(),
        )),
        Value::Object(map) => AMQPValue::FieldTable(field_table(map)),
    }
}

impl LapinTransport {
    pub(crate) async fn install_exchange(&self, def: &ExchangeDescriptor) -> Result<(), AmqpError> {
        debug!("declaring exchange: {}", def.name);

        match self
            .channel
            .exchange_declare(
                &def.name,
                lapin::ExchangeKind::from(&def.kind),
                ExchangeDeclareOptions {
                    passive: def.passive,
                    durable: def.durable,
                    auto_delete: def.auto_delete,
                    internal: def.internal,
                    nowait: def.no_wait,
                },
                field_table(&def.arguments),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn install_queue(&self, def: &QueueDescriptor) -> Result<(), AmqpError> {
        debug!("declaring queue: {}", def.name);

        match self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: def.passive,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.auto_delete,
                    nowait: def.no_wait,
                },
                field_table(&def.arguments),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn binding_queue(
        &self,
        exchange: &str,
        binding: &QueueBindingDescriptor,
    ) -> Result<(), AmqpError> {
        match self
            .channel
            .queue_bind(
                &binding.queue,
                exchange,
                &binding.routing_key,
                QueueBindOptions {
                    nowait: binding.no_wait,
                },
                field_table(&binding.arguments),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    binding.queue.clone(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_convert_to_field_table() {
        let args = json!({
            "x-message-ttl": 5000,
            "x-dead-letter-exchange": "",
            "x-single-active-consumer": true,
            "x-big": 10_000_000_000_i64,
            "x-ratio": 0.5,
        });

        let table = field_table(args.as_object().unwrap());
        let inner = table.inner();

        assert_eq!(inner.get("x-message-ttl"), Some(&AMQPValue::LongInt(5000)));
        assert_eq!(
            inner.get("x-dead-letter-exchange"),
            Some(&AMQPValue::LongString(LongString::from("")))
        );
        assert_eq!(
            inner.get("x-single-active-consumer"),
            Some(&AMQPValue::Boolean(true))
        );
        assert_eq!(
            inner.get("x-big"),
            Some(&AMQPValue::LongLongInt(10_000_000_000))
        );
        assert_eq!(inner.get("x-ratio"), Some(&AMQPValue::Double(0.5)));
    }

    #[test]
    fn nested_values_convert_recursively() {
        let args = json!({ "nested": { "list": [1, "a"] } });

        let table = field_table(args.as_object().unwrap());
        let Some(AMQPValue::FieldTable(nested)) = table.inner().get("nested") else {
            panic!("expected a nested table");
        };
        let Some(AMQPValue::FieldArray(list)) = nested.inner().get("list") else {
            panic!("expected an array");
        };
        assert_eq!(list.as_slice().len(), 2);
    }
}
