// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Topology
//!
//! Two families of errors live here. `ConfigError` covers everything that can go
//! wrong while the topology is composed from configuration; it is always fatal and
//! raised before any factory reaches the application. `AmqpError` covers the
//! runtime side, when handles talk to the broker through a transport.

use crate::validator::Category;
use thiserror::Error;

/// Errors raised while validating configuration and composing the topology.
///
/// Every variant carries enough context to point at the offending category,
/// entity and option.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A top-level block other than the five entity categories was supplied
    #[error("unknown configuration section `{0}`")]
    UnknownSection(String),

    /// A top-level block is not a map of entities
    #[error("configuration section `{section}` is invalid: {reason}")]
    InvalidSection { section: String, reason: String },

    /// An entity carries an option its category does not recognize
    #[error("unknown option `{key}` in {category} `{entity}`")]
    UnknownOption {
        category: Category,
        entity: String,
        key: String,
    },

    /// An entity references another entity that is not registered
    #[error("{category} `{entity}` references unknown {target} `{name}` through `{key}`")]
    Reference {
        category: Category,
        entity: String,
        key: String,
        target: Category,
        name: String,
    },

    /// An entity depends on the implicit default of another category, which was never declared
    #[error("{category} `{entity}` requires the `{name}` {target}, which was never declared")]
    MissingDefault {
        category: Category,
        entity: String,
        target: Category,
        name: String,
    },

    /// A required option was left unset
    #[error("{category} `{entity}` is missing required option `{key}`")]
    MissingOption {
        category: Category,
        entity: String,
        key: String,
    },

    /// An option holds a value of the wrong shape
    #[error("invalid value for `{key}` in {category} `{entity}`: {reason}")]
    InvalidValue {
        category: Category,
        entity: String,
        key: String,
        reason: String,
    },

    /// The topology document could not be read or parsed
    #[error("failure to read the topology configuration: {0}")]
    Unreadable(String),
}

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// These come out of the runtime handles once composition is over: opening the
/// lazy connection, declaring and binding, publishing and consuming.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error binding a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// No entity with this name exists in the category
    #[error("{0} `{1}` is not registered")]
    EntityNotFound(Category, String),

    /// A consumer's callback identifier has no handler behind it
    #[error("no handler registered for callback `{0}`")]
    HandlerNotRegistered(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_name_the_offender() {
        let err = ConfigError::UnknownOption {
            category: Category::Queue,
            entity: "jobs".to_owned(),
            key: "durabel".to_owned(),
        };
        assert_eq!(err.to_string(), "unknown option `durabel` in queue `jobs`");

        let err = ConfigError::Reference {
            category: Category::Queue,
            entity: "jobs".to_owned(),
            key: "connection".to_owned(),
            target: Category::Connection,
            name: "backup".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "queue `jobs` references unknown connection `backup` through `connection`"
        );
    }

    #[test]
    fn binding_error_names_both_sides() {
        let err = AmqpError::BindingExchangeToQueueError("events".to_owned(), "jobs".to_owned());
        assert_eq!(
            err.to_string(),
            "failure to binding exchange `events` to queue `jobs`"
        );
    }
}
