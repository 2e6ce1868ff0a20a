// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! The consuming loop behind [`crate::consumer::Consumer::consume`]: applies the
//! prefetch setting, subscribes to the queue and hands each delivery to the
//! consumer's handler. A handled message is acknowledged; a message the handler
//! fails on is rejected without requeue, leaving dead lettering to the queue's
//! own arguments.

use crate::{
    channel::LapinTransport,
    errors::AmqpError,
    handler::{ConsumerHandler, ConsumerMessage},
    otel,
    transport::ConsumeRequest,
};
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicQosOptions,
    },
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable},
};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
};
use std::{borrow::Cow, collections::HashMap, sync::Arc};
use tracing::{debug, error, warn};

impl LapinTransport {
    pub(crate) async fn consume_messages(
        &self,
        req: &ConsumeRequest,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Result<u64, AmqpError> {
        if req.limit == Some(0) {
            return Ok(0);
        }

        if let Err(err) = self
            .channel
            .basic_qos(req.prefetch_count, BasicQosOptions { global: false })
            .await
        {
            error!(error = err.to_string(), "error to configure qos");
            return Err(AmqpError::QoSDeclarationError(req.queue.clone()));
        }

        let mut consumer = match self
            .channel
            .basic_consume(
                &req.queue,
                &req.tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::BindingConsumerError(req.tag.clone()))
            }
            Ok(c) => Ok(c),
        }?;

        let tracer = global::tracer("amqp consumer");
        let mut handled = 0;

        while let Some(result) = consumer.next().await {
            let delivery = match result {
                Ok(delivery) => delivery,
                Err(err) => {
                    error!(error = err.to_string(), "errors consume msg");
                    return Err(AmqpError::ConsumerError(err.to_string()));
                }
            };

            dispatch(&tracer, &req.queue, &delivery, handler.as_ref()).await?;
            handled += 1;

            if req.limit.is_some_and(|limit| handled >= limit) {
                debug!(consumer = req.tag.as_str(), handled, "consumer limit reached");
                if let Err(err) = self
                    .channel
                    .basic_cancel(&req.tag, BasicCancelOptions::default())
                    .await
                {
                    warn!(error = err.to_string(), "failure to cancel the consumer");
                }
                break;
            }
        }

        Ok(handled)
    }
}

/// Hands one delivery to the handler and settles it with the broker.
async fn dispatch(
    tracer: &BoxedTracer,
    queue: &str,
    delivery: &Delivery,
    handler: &dyn ConsumerHandler,
) -> Result<(), AmqpError> {
    let (msg_type, headers) = extract_header_properties(&delivery.properties);
    let (ctx, mut span) = otel::consumer_span(&delivery.properties, tracer, queue);

    debug!(
        "received: {} - exchange: {}",
        msg_type,
        delivery.exchange.to_string(),
    );

    let msg = ConsumerMessage::new(queue, msg_type.as_str(), &delivery.data, Some(headers));

    if let Err(err) = handler.exec(&ctx, &msg).await {
        warn!(error = err.to_string(), "error whiling handling msg, rejecting");
        span.record_error(&err);
        span.set_status(Status::Error {
            description: Cow::from("handler failure"),
        });

        return match delivery
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("error whiling nack msg");
                span.record_error(&e);
                Err(AmqpError::NackMessageError)
            }
        };
    }

    match delivery.ack(BasicAckOptions { multiple: false }).await {
        Err(e) => {
            error!("error whiling ack msg");
            span.record_error(&e);
            span.set_status(Status::Error {
                description: Cow::from("error to ack msg"),
            });
            Err(AmqpError::AckMessageError)
        }
        _ => {
            span.set_status(Status::Ok);
            Ok(())
        }
    }
}

/// Extracts the message type and the string headers from message properties.
fn extract_header_properties(props: &AMQPProperties) -> (String, HashMap<String, String>) {
    let headers = props
        .headers()
        .as_ref()
        .map(|table| {
            table
                .inner()
                .iter()
                .filter_map(|(key, value)| match value {
                    AMQPValue::LongString(v) => Some((
                        key.as_str().to_owned(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let msg_type = match props.kind() {
        Some(value) => value.to_string(),
        _ => "".to_owned(),
    };

    (msg_type, headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::{LongString, ShortString};
    use std::collections::BTreeMap;

    #[test]
    fn headers_and_type_are_extracted() {
        let mut table = BTreeMap::new();
        table.insert(
            ShortString::from("tenant"),
            AMQPValue::LongString(LongString::from("acme")),
        );
        table.insert(ShortString::from("retries"), AMQPValue::LongInt(2));

        let props = AMQPProperties::default()
            .with_kind(ShortString::from("job.created"))
            .with_headers(FieldTable::from(table));

        let (msg_type, headers) = extract_header_properties(&props);
        assert_eq!(msg_type, "job.created");
        assert_eq!(headers.get("tenant").map(String::as_str), Some("acme"));
        assert!(!headers.contains_key("retries"));
    }

    #[test]
    fn missing_properties_yield_empty_values() {
        let (msg_type, headers) = extract_header_properties(&AMQPProperties::default());
        assert!(msg_type.is_empty());
        assert!(headers.is_empty());
    }
}
