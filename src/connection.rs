// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connections
//!
//! Connections are the root of the topology: every other entity names the
//! connection it lives on. The connection factory builds one shared
//! [`Connection`] handle per configured name; the handle opens the broker
//! connection lazily, the first time something needs the transport.

use crate::{
    data_bag::DataBag,
    errors::{AmqpError, ConfigError},
    transport::{Connector, Transport},
    validator::{validate_all, Category, DefaultValue, DefaultsTable, ValidatedConfig},
};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::sync::OnceCell;
use tracing::{debug, error};

/// Name of the connection entities use when they do not name one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Recognized connection options.
pub const DEFAULTS: &DefaultsTable = &[
    ("host", DefaultValue::Str("127.0.0.1")),
    ("port", DefaultValue::Int(5672)),
    ("user", DefaultValue::Str("guest")),
    ("password", DefaultValue::Str("guest")),
    ("vhost", DefaultValue::Str("/")),
    ("heartbeat", DefaultValue::Float(60.0)),
    ("timeout", DefaultValue::Float(10.0)),
    ("lazy", DefaultValue::Bool(true)),
];

/// Validated settings of one broker connection.
#[derive(Clone, PartialEq)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Heartbeat interval in seconds
    pub heartbeat: f64,
    /// Connection timeout in seconds
    pub timeout: f64,
    pub lazy: bool,
}

impl ConnectionDescriptor {
    pub(crate) fn from_validated(cfg: &ValidatedConfig) -> Result<Self, ConfigError> {
        Ok(ConnectionDescriptor {
            name: cfg.entity().to_owned(),
            host: cfg.str("host")?.to_owned(),
            port: cfg.u16("port")?,
            user: cfg.str("user")?.to_owned(),
            password: cfg.str("password")?.to_owned(),
            vhost: cfg.str("vhost")?.to_owned(),
            heartbeat: cfg.f64("heartbeat")?,
            timeout: cfg.f64("timeout")?,
            lazy: cfg.bool("lazy")?,
        })
    }
}

// The password stays out of logs.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("vhost", &self.vhost)
            .field("heartbeat", &self.heartbeat)
            .field("timeout", &self.timeout)
            .field("lazy", &self.lazy)
            .finish()
    }
}

/// A named broker connection, opened on first use.
pub struct Connection {
    descriptor: ConnectionDescriptor,
    connector: Arc<dyn Connector>,
    transport: OnceCell<Arc<dyn Transport>>,
}

impl Connection {
    fn new(descriptor: ConnectionDescriptor, connector: Arc<dyn Connector>) -> Connection {
        Connection {
            descriptor,
            connector,
            transport: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        self.transport.initialized()
    }

    /// Returns the transport, connecting to the broker the first time.
    pub async fn transport(&self) -> Result<Arc<dyn Transport>, AmqpError> {
        self.transport
            .get_or_try_init(|| async {
                debug!(connection = self.name(), "opening amqp connection...");
                self.connector.connect(&self.descriptor).await.map_err(|err| {
                    error!(
                        error = err.to_string(),
                        connection = self.name(),
                        "failure to open connection"
                    );
                    err
                })
            })
            .await
            .cloned()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("descriptor", &self.descriptor)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Hands out connection handles by name.
#[derive(Debug)]
pub struct ConnectionFactory {
    data_bag: DataBag<ConnectionDescriptor>,
    connections: BTreeMap<String, Arc<Connection>>,
}

impl ConnectionFactory {
    pub fn data_bag(&self) -> &DataBag<ConnectionDescriptor> {
        &self.data_bag
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data_bag.contains(name)
    }

    pub fn get_connection(&self, name: &str) -> Result<Arc<Connection>, AmqpError> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| AmqpError::EntityNotFound(Category::Connection, name.to_owned()))
    }

    /// Checks that `name`, referenced by `entity` of `category`, is a registered connection.
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
            connection = name,
            "unknown connection referenced"
        );

        if name == DEFAULT_CONNECTION {
            return Err(ConfigError::MissingDefault {
                category,
                entity: entity.to_owned(),
                target: Category::Connection,
                name: name.to_owned(),
            });
        }

        Err(ConfigError::Reference {
            category,
            entity: entity.to_owned(),
            key: "connection".to_owned(),
            target: Category::Connection,
            name: name.to_owned(),
        })
    }
}

/// Builds the connection factory from the `connections` section.
///
/// With `implicit_default` set, a connection named [`DEFAULT_CONNECTION`] is
/// registered with default options when the section does not declare it.
pub fn build(
    section: &Map<String, Value>,
    connector: Arc<dyn Connector>,
    implicit_default: bool,
) -> Result<Arc<ConnectionFactory>, ConfigError> {
    let mut validated = validate_all(Category::Connection, DEFAULTS, section)?;

    if implicit_default && !validated.contains_key(DEFAULT_CONNECTION) {
        debug!("registering implicit default connection");
        let defaults = validate_all(
            Category::Connection,
            DEFAULTS,
            &Map::from_iter([(DEFAULT_CONNECTION.to_owned(), Value::Null)]),
        )?;
        validated.extend(defaults);
    }

    let data_bag = validated
        .values()
        .map(|cfg| Ok((cfg.entity().to_owned(), ConnectionDescriptor::from_validated(cfg)?)))
        .collect::<Result<DataBag<_>, ConfigError>>()?;

    let connections = data_bag
        .iter()
        .map(|(name, def)| {
            (
                name.to_owned(),
                Arc::new(Connection::new(def.clone(), connector.clone())),
            )
        })
        .collect();

    Ok(Arc::new(ConnectionFactory {
        data_bag,
        connections,
    }))
}
