// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Commands
//!
//! Two commands run a configured consumer from the host application's command
//! line:
//!
//! - `rabbitmq:consumer <consumerName> [secondsToLive]` consumes until the
//!   stream ends, or until `secondsToLive` elapses when given.
//! - `rabbitmq:staticConsumer <consumerName> <amountOfMessages>` stops after
//!   handling the given number of messages.
//!
//! The host owns its command registry; [`register_commands`] adds both commands
//! to anything implementing [`CommandRegistry`].

use crate::{client::Client, errors::AmqpError};
use async_trait::async_trait;
use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error};

pub const CONSUMER_COMMAND: &str = "rabbitmq:consumer";
pub const STATIC_CONSUMER_COMMAND: &str = "rabbitmq:staticConsumer";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("command `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("invalid arguments for `{command}`: {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error(transparent)]
    Amqp(#[from] AmqpError),
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn execute(&self, args: &[String]) -> Result<(), CommandError>;
}

/// Where the host application collects its commands.
pub trait CommandRegistry {
    fn register(&mut self, command: Arc<dyn Command>) -> Result<(), CommandError>;
}

/// A [`CommandRegistry`] keeping commands in memory, keyed by name.
#[derive(Default)]
pub struct InMemoryCommandRegistry {
    commands: BTreeMap<&'static str, Arc<dyn Command>>,
}

impl InMemoryCommandRegistry {
    pub fn new() -> InMemoryCommandRegistry {
        InMemoryCommandRegistry::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }
}

impl fmt::Debug for InMemoryCommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry for InMemoryCommandRegistry {
    fn register(&mut self, command: Arc<dyn Command>) -> Result<(), CommandError> {
        let name = command.name();
        if self.commands.contains_key(name) {
            error!(command = name, "command already registered");
            return Err(CommandError::AlreadyRegistered(name.to_owned()));
        }

        self.commands.insert(name, command);
        Ok(())
    }
}

/// Registers the consumer commands, both bound to `client`.
pub fn register_commands(
    registry: &mut dyn CommandRegistry,
    client: Arc<Client>,
) -> Result<(), CommandError> {
    registry.register(Arc::new(ConsumerCommand::new(client.clone())))?;
    registry.register(Arc::new(StaticConsumerCommand::new(client)))?;

    debug!("rabbitmq commands registered");
    Ok(())
}

/// Runs a consumer until its stream ends or its time to live elapses.
#[derive(Debug)]
pub struct ConsumerCommand {
    client: Arc<Client>,
}

impl ConsumerCommand {
    pub fn new(client: Arc<Client>) -> ConsumerCommand {
        ConsumerCommand { client }
    }
}

#[async_trait]
impl Command for ConsumerCommand {
    fn name(&self) -> &'static str {
        CONSUMER_COMMAND
    }

    fn description(&self) -> &'static str {
        "Run a RabbitMQ consumer"
    }

    async fn execute(&self, args: &[String]) -> Result<(), CommandError> {
        let (consumer_name, seconds_to_live) = match args {
            [name] => (name, None),
            [name, seconds] => {
                let seconds = parse_positive(CONSUMER_COMMAND, "secondsToLive", seconds)?;
                (name, Some(seconds))
            }
            _ => return Err(usage(CONSUMER_COMMAND, "<consumerName> [secondsToLive]")),
        };

        let consumer = self.client.get_consumer(consumer_name)?;

        let Some(seconds) = seconds_to_live else {
            consumer.consume(None).await?;
            return Ok(());
        };

        match timeout(Duration::from_secs(seconds), consumer.consume(None)).await {
            Ok(res) => {
                res?;
            }
            Err(_) => {
                debug!(
                    consumer = consumer_name.as_str(),
                    seconds, "consumer time to live reached"
                );
            }
        }

        Ok(())
    }
}

/// Runs a consumer until it has handled a fixed amount of messages.
#[derive(Debug)]
pub struct StaticConsumerCommand {
    client: Arc<Client>,
}

impl StaticConsumerCommand {
    pub fn new(client: Arc<Client>) -> StaticConsumerCommand {
        StaticConsumerCommand { client }
    }
}

#[async_trait]
impl Command for StaticConsumerCommand {
    fn name(&self) -> &'static str {
        STATIC_CONSUMER_COMMAND
    }

    fn description(&self) -> &'static str {
        "Run a RabbitMQ consumer for a fixed amount of messages"
    }

    async fn execute(&self, args: &[String]) -> Result<(), CommandError> {
        let [consumer_name, amount] = args else {
            return Err(usage(STATIC_CONSUMER_COMMAND, "<consumerName> <amountOfMessages>"));
        };

        let amount = parse_positive(STATIC_CONSUMER_COMMAND, "amountOfMessages", amount)?;

        let consumer = self.client.get_consumer(consumer_name)?;
        let handled = consumer.consume(Some(amount)).await?;

        debug!(consumer = consumer_name.as_str(), handled, "static consumer finished");
        Ok(())
    }
}

/// Parses an integer argument that must be greater than zero.
fn parse_positive(command: &str, argument: &str, value: &str) -> Result<u64, CommandError> {
    match value.parse::<u64>() {
        Ok(0) | Err(_) => Err(CommandError::InvalidArguments {
            command: command.to_owned(),
            reason: format!("{argument} must be a positive integer, found `{value}`"),
        }),
        Ok(number) => Ok(number),
    }
}

fn usage(command: &str, arguments: &str) -> CommandError {
    CommandError::InvalidArguments {
        command: command.to_owned(),
        reason: format!("usage: {command} {arguments}"),
    }
}
