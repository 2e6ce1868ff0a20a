// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Publishing through a `lapin` channel, with OpenTelemetry context
//! propagation through the message headers.

use crate::{
    channel::LapinTransport, errors::AmqpError, otel::AmqpHeaderPropagator,
    transport::OutgoingMessage,
};
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties,
};
use opentelemetry::{global, Context};
use std::collections::BTreeMap;
use tracing::error;
use uuid::Uuid;

/// Builds the AMQP headers of a message: trace context first, then the caller's headers.
pub(crate) fn message_headers(ctx: &Context, msg: &OutgoingMessage) -> FieldTable {
    let mut btree = BTreeMap::<ShortString, AMQPValue>::default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut AmqpHeaderPropagator::new(&mut btree))
    });

    for (key, value) in &msg.headers {
        btree.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }

    FieldTable::from(btree)
}

impl LapinTransport {
    pub(crate) async fn publish_message(
        &self,
        ctx: &Context,
        msg: &OutgoingMessage,
    ) -> Result<(), AmqpError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(msg.content_type.clone()))
            .with_delivery_mode(msg.delivery_mode)
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(message_headers(ctx, msg));

        match self
            .channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.payload,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_headers_become_long_strings() {
        let msg = OutgoingMessage {
            headers: BTreeMap::from([("tenant".to_owned(), "acme".to_owned())]),
            ..OutgoingMessage::default()
        };

        let table = message_headers(&Context::new(), &msg);
        assert_eq!(
            table.inner().get("tenant"),
            Some(&AMQPValue::LongString(LongString::from("acme")))
        );
    }
}
