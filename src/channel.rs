// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module provides the `lapin` implementation of the transport seam. The
//! [`LapinConnector`] turns a connection descriptor into an AMQP URI, connects
//! and opens a channel; the resulting [`LapinTransport`] carries out the
//! declare, bind, publish and consume operations (implemented in the
//! `topology`, `publisher` and `dispatcher` modules).

use crate::{
    connection::ConnectionDescriptor,
    errors::AmqpError,
    exchange::{ExchangeDescriptor, QueueBindingDescriptor},
    handler::ConsumerHandler,
    queue::QueueDescriptor,
    transport::{ConsumeRequest, Connector, OutgoingMessage, Transport},
};
use async_trait::async_trait;
use lapin::{
    types::LongString,
    uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo},
    Channel, Connection, ConnectionProperties,
};
use opentelemetry::Context;
use std::sync::Arc;
use tracing::{debug, error};

/// Opens `lapin` connections, naming them after the application.
#[derive(Debug, Clone)]
pub struct LapinConnector {
    app_name: String,
}

impl LapinConnector {
    pub fn new(app_name: &str) -> Arc<LapinConnector> {
        Arc::new(LapinConnector {
            app_name: app_name.to_owned(),
        })
    }
}

/// Builds the AMQP URI for a connection descriptor.
///
/// The URI is assembled field by field, so credentials and vhost are passed to
/// the broker as they are, whatever characters they contain.
///
/// # Parameters
/// * `def` - The validated connection settings
///
/// # Returns
/// The URI with heartbeat (seconds) and connection timeout (milliseconds) set
pub fn amqp_uri(def: &ConnectionDescriptor) -> AMQPUri {
    AMQPUri {
        scheme: AMQPScheme::AMQP,
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: def.user.clone(),
                password: def.password.clone(),
            },
            host: def.host.clone(),
            port: def.port,
        },
        vhost: def.vhost.clone(),
        query: AMQPQueryString {
            heartbeat: Some(def.heartbeat.round() as u16),
            connection_timeout: Some((def.timeout * 1000.0).round() as u64),
            ..AMQPQueryString::default()
        },
    }
}

#[async_trait]
impl Connector for LapinConnector {
    async fn connect(&self, def: &ConnectionDescriptor) -> Result<Arc<dyn Transport>, AmqpError> {
        debug!(connection = def.name.as_str(), "creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(format!("{}-{}", self.app_name, def.name)));

        let conn = match Connection::connect_uri(amqp_uri(def), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError {})
            }
        }?;
        debug!("amqp connected");

        debug!("creating amqp channel...");
        match conn.create_channel().await {
            Ok(c) => {
                debug!("channel created");
                Ok(Arc::new(LapinTransport {
                    conn: Arc::new(conn),
                    channel: Arc::new(c),
                }))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError {})
            }
        }
    }
}

/// An open `lapin` connection with its channel.
pub struct LapinTransport {
    conn: Arc<Connection>,
    pub(crate) channel: Arc<Channel>,
}

impl LapinTransport {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }
}

#[async_trait]
impl Transport for LapinTransport {
    async fn declare_queue(&self, def: &QueueDescriptor) -> Result<(), AmqpError> {
        self.install_queue(def).await
    }

    async fn declare_exchange(&self, def: &ExchangeDescriptor) -> Result<(), AmqpError> {
        self.install_exchange(def).await
    }

    async fn bind_queue(
        &self,
        exchange: &str,
        binding: &QueueBindingDescriptor,
    ) -> Result<(), AmqpError> {
        self.binding_queue(exchange, binding).await
    }

    async fn publish(&self, ctx: &Context, msg: &OutgoingMessage) -> Result<(), AmqpError> {
        self.publish_message(ctx, msg).await
    }

    async fn consume(
        &self,
        req: &ConsumeRequest,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Result<u64, AmqpError> {
        self.consume_messages(req, handler).await
    }
}
