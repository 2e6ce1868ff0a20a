// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology
//!
//! Composes connections, queues, exchanges, producers and consumers from a
//! declarative configuration document into a [`Client`], and exposes the
//! consumer commands a host application can register.

mod dispatcher;
mod otel;
mod publisher;

pub mod channel;
pub mod client;
pub mod commands;
pub mod connection;
pub mod consumer;
pub mod data_bag;
pub mod errors;
pub mod exchange;
pub mod extension;
pub mod handler;
pub mod logging;
pub mod producer;
pub mod queue;
pub mod settings;
pub mod topology;
pub mod transport;
pub mod validator;

pub use client::Client;
pub use errors::{AmqpError, ConfigError};
pub use extension::{compose, load_topology, Composer};
pub use handler::{ConsumerHandler, ConsumerMessage, HandlerRegistry, MessagingError};
