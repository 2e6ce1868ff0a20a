// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Composition
//!
//! Turns a raw configuration document into a ready [`Client`]. The document
//! has five top-level blocks, one per entity category:
//!
//! ```json
//! {
//!   "connections": { "default": { "host": "localhost" } },
//!   "queues": { "jobs": { "durable": false } },
//!   "exchanges": { "events": { "queueBindings": { "jobs": { "routingKey": "job.*" } } } },
//!   "producers": { "job-events": { "exchange": "events" } },
//!   "consumers": { "worker": { "queue": "jobs", "callback": "jobs.handler" } }
//! }
//! ```
//!
//! Categories are built in dependency order (connections, queues, exchanges,
//! producers, consumers), each factory receiving the ones it references. The
//! first failure aborts composition; a partially built client is never
//! returned.

use crate::{
    channel::LapinConnector,
    client::Client,
    connection, consumer,
    errors::ConfigError,
    exchange,
    handler::{ConsumerHandler, HandlerRegistry},
    producer, queue,
    settings::AppConfigs,
    transport::Connector,
    validator::{kind_of, Category},
};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt, fs::File, io::BufReader, path::Path, sync::Arc};
use tracing::{debug, error};

/// Builds clients from topology documents.
///
/// By default connections are opened with `lapin`, no handlers are registered
/// and a connection named `default` is provided when the document omits it.
pub struct Composer {
    connector: Arc<dyn Connector>,
    handlers: HandlerRegistry,
    implicit_default_connection: bool,
}

impl Default for Composer {
    fn default() -> Self {
        Composer::with_configs(&AppConfigs::default())
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("handlers", &self.handlers)
            .field(
                "implicit_default_connection",
                &self.implicit_default_connection,
            )
            .finish()
    }
}

impl Composer {
    pub fn new() -> Composer {
        Composer::default()
    }

    /// A composer whose broker connections are named after the application.
    pub fn with_configs(cfg: &AppConfigs) -> Composer {
        Composer {
            connector: LapinConnector::new(&cfg.name),
            handlers: HandlerRegistry::new(),
            implicit_default_connection: true,
        }
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn handler(mut self, callback: &str, handler: Arc<dyn ConsumerHandler>) -> Self {
        self.handlers = self.handlers.register(callback, handler);
        self
    }

    /// Whether a connection named `default` is registered when the document
    /// does not declare one.
    pub fn implicit_default_connection(mut self, enabled: bool) -> Self {
        self.implicit_default_connection = enabled;
        self
    }

    pub fn compose(&self, raw: &Value) -> Result<Client, ConfigError> {
        self.build(raw).map_err(|err| {
            error!(error = err.to_string(), "failure to compose the rabbitmq topology");
            err
        })
    }

    fn build(&self, raw: &Value) -> Result<Client, ConfigError> {
        let mut sections = sections(raw)?;
        let mut section = |category: Category| sections.remove(&category).unwrap_or_default();

        debug!("building connections...");
        let connections = connection::build(
            &section(Category::Connection),
            self.connector.clone(),
            self.implicit_default_connection,
        )?;

        debug!("building queues...");
        let queues = queue::build(&section(Category::Queue), connections.clone())?;

        debug!("building exchanges...");
        let exchanges = exchange::build(
            &section(Category::Exchange),
            connections.clone(),
            queues.clone(),
        )?;

        debug!("building producers...");
        let producers = producer::build(
            &section(Category::Producer),
            connections.clone(),
            exchanges.clone(),
            queues.clone(),
        )?;

        debug!("building consumers...");
        let consumers = consumer::build(
            &section(Category::Consumer),
            connections.clone(),
            queues.clone(),
            Arc::new(self.handlers.clone()),
        )?;

        debug!(
            connections = connections.data_bag().len(),
            queues = queues.data_bag().len(),
            exchanges = exchanges.data_bag().len(),
            producers = producers.data_bag().len(),
            consumers = consumers.data_bag().len(),
            "rabbitmq topology composed"
        );

        Ok(Client::new(
            connections,
            queues,
            exchanges,
            producers,
            consumers,
        ))
    }
}

/// Composes a client with the default [`Composer`].
pub fn compose(raw: &Value) -> Result<Client, ConfigError> {
    Composer::new().compose(raw)
}

/// Reads a topology document from a JSON file.
pub fn load_topology<P: AsRef<Path>>(path: P) -> Result<Value, ConfigError> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|err| {
        error!(
            error = err.to_string(),
            path = %path.display(),
            "failure to open the topology file"
        );
        ConfigError::Unreadable(format!("{}: {}", path.display(), err))
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        error!(
            error = err.to_string(),
            path = %path.display(),
            "failure to parse the topology file"
        );
        ConfigError::Unreadable(format!("{}: {}", path.display(), err))
    })
}

/// Splits the document into its category blocks. Absent and `null` blocks are empty.
fn sections(raw: &Value) -> Result<BTreeMap<Category, Map<String, Value>>, ConfigError> {
    let root = match raw {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Object(root) => root,
        other => {
            return Err(ConfigError::InvalidSection {
                section: "root".to_owned(),
                reason: format!("expected a map of sections, found {}", kind_of(other)),
            })
        }
    };

    let mut sections = BTreeMap::new();
    for (key, block) in root {
        let category = Category::ALL
            .into_iter()
            .find(|category| category.section() == key)
            .ok_or_else(|| ConfigError::UnknownSection(key.to_owned()))?;

        let entities = match block {
            Value::Null => Map::new(),
            Value::Object(entities) => entities.clone(),
            other => {
                return Err(ConfigError::InvalidSection {
                    section: key.to_owned(),
                    reason: format!("expected a map of entities, found {}", kind_of(other)),
                })
            }
        };
        sections.insert(category, entities);
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::DEFAULT_CONNECTION,
        handler::MockConsumerHandler,
        transport::MockConnector,
    };
    use serde_json::json;
    use std::io::Write;

    fn composer() -> Composer {
        Composer::new().connector(Arc::new(MockConnector::new()))
    }

    fn jobs() -> Value {
        json!({
            "connections": {},
            "queues": { "jobs": {} },
            "exchanges": {},
            "producers": {},
            "consumers": {},
        })
    }

    #[test]
    fn empty_document_composes_the_default_connection() {
        let client = composer().compose(&json!({})).unwrap();

        assert_eq!(client.connections().data_bag().names(), vec![DEFAULT_CONNECTION]);
        assert!(client.queues().data_bag().is_empty());
        assert!(client.consumers().data_bag().is_empty());
    }

    #[test]
    fn null_document_and_blocks_are_empty() {
        assert!(composer().compose(&Value::Null).is_ok());
        assert!(composer()
            .compose(&json!({ "queues": null, "consumers": null }))
            .is_ok());
    }

    #[test]
    fn queue_binds_to_the_implicit_default() {
        let client = composer().compose(&jobs()).unwrap();

        let queue = client.get_queue("jobs").unwrap();
        assert_eq!(queue.connection().name(), DEFAULT_CONNECTION);
    }

    #[test]
    fn missing_default_when_implicit_is_disabled() {
        let err = composer()
            .implicit_default_connection(false)
            .compose(&jobs())
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::MissingDefault {
                category: Category::Queue,
                entity: "jobs".to_owned(),
                target: Category::Connection,
                name: DEFAULT_CONNECTION.to_owned(),
            }
        );
    }

    #[test]
    fn declared_options_override_defaults_only() {
        let client = composer()
            .compose(&json!({
                "connections": { "default": { "host": "localhost" } },
                "queues": { "jobs": { "durable": false } },
            }))
            .unwrap();

        let conn = client.connections().data_bag().get("default").unwrap();
        assert_eq!(conn.host, "localhost");
        assert_eq!(conn.port, 5672);

        let queue = client.queues().data_bag().get("jobs").unwrap();
        assert!(!queue.durable);
        assert!(!queue.passive);
        assert!(!queue.exclusive);
        assert!(!queue.auto_delete);
        assert!(!queue.no_wait);
        assert!(queue.arguments.is_empty());
        assert_eq!(queue.connection, "default");
    }

    #[test]
    fn unknown_reference_aborts_composition() {
        let err = composer()
            .compose(&json!({ "queues": { "jobs": { "connection": "backup" } } }))
            .unwrap_err();

        assert!(matches!(err, ConfigError::Reference { name, .. } if name == "backup"));
    }

    #[test]
    fn failure_in_a_late_category_returns_no_client() {
        let res = composer().compose(&json!({
            "queues": { "jobs": {} },
            "consumers": { "worker": { "queue": "mails", "callback": "mailer" } },
        }));

        assert!(matches!(
            res,
            Err(ConfigError::Reference { category: Category::Consumer, .. })
        ));
    }

    #[test]
    fn entities_must_share_the_connection_of_their_queue() {
        let base = json!({
            "connections": { "backup": {} },
            "queues": { "audit": { "connection": "backup" } },
            "exchanges": { "events": { "connection": "backup" } },
        });
        let with = |category: &str, body: Value| {
            let mut raw = base.clone();
            raw[category] = body;
            raw
        };

        let consumer = composer()
            .compose(&with(
                "consumers",
                json!({ "auditor": { "queue": "audit", "callback": "audit.handler" } }),
            ))
            .unwrap_err();
        assert!(matches!(
            consumer,
            ConfigError::InvalidValue { category: Category::Consumer, key, .. }
                if key == "connection"
        ));

        let producer = composer()
            .compose(&with("producers", json!({ "notify": { "queue": "audit" } })))
            .unwrap_err();
        assert!(matches!(
            producer,
            ConfigError::InvalidValue { category: Category::Producer, key, .. }
                if key == "connection"
        ));

        let producer = composer()
            .compose(&with("producers", json!({ "emit": { "exchange": "events" } })))
            .unwrap_err();
        assert!(matches!(
            producer,
            ConfigError::InvalidValue { category: Category::Producer, key, .. }
                if key == "connection"
        ));

        let exchange = composer()
            .compose(&with(
                "exchanges",
                json!({ "fanout": { "queueBindings": { "audit": {} } } }),
            ))
            .unwrap_err();
        assert!(matches!(
            exchange,
            ConfigError::InvalidValue { category: Category::Exchange, key, .. }
                if key == "connection"
        ));

        let aligned = with(
            "consumers",
            json!({ "auditor": {
                "connection": "backup", "queue": "audit", "callback": "audit.handler"
            } }),
        );
        assert!(composer().compose(&aligned).is_ok());
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert_eq!(
            composer().compose(&json!({ "bindings": {} })).unwrap_err(),
            ConfigError::UnknownSection("bindings".to_owned())
        );
    }

    #[test]
    fn non_map_sections_are_rejected() {
        let err = composer().compose(&json!({ "queues": ["jobs"] })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection { section, .. } if section == "queues"));

        let err = composer().compose(&json!("queues")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection { section, .. } if section == "root"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = composer()
            .compose(&json!({ "queues": { "jobs": { "durabel": true } } }))
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::UnknownOption {
                category: Category::Queue,
                entity: "jobs".to_owned(),
                key: "durabel".to_owned(),
            }
        );
    }

    #[test]
    fn composition_is_deterministic() {
        let raw = json!({
            "connections": { "backup": {}, "analytics": {} },
            "queues": { "mails": {}, "jobs": {}, "audit": { "connection": "backup" } },
            "exchanges": { "events": { "queueBindings": { "jobs": {} } } },
            "producers": { "notify": { "queue": "mails" }, "emit": { "exchange": "events" } },
            "consumers": { "worker": { "queue": "jobs", "callback": "jobs.handler" } },
        });

        let first = composer().compose(&raw).unwrap();
        let second = composer().compose(&raw).unwrap();

        assert_eq!(
            first.connections().data_bag().names(),
            vec!["analytics", "backup", "default"]
        );
        assert_eq!(
            first.connections().data_bag().names(),
            second.connections().data_bag().names()
        );
        assert_eq!(first.queues().data_bag(), second.queues().data_bag());
        assert_eq!(first.exchanges().data_bag(), second.exchanges().data_bag());
        assert_eq!(first.producers().data_bag(), second.producers().data_bag());
        assert_eq!(first.consumers().data_bag(), second.consumers().data_bag());
    }

    #[test]
    fn handlers_are_not_required_at_composition() {
        let raw = json!({
            "queues": { "jobs": {} },
            "consumers": { "worker": { "queue": "jobs", "callback": "jobs.handler" } },
        });

        assert!(composer().compose(&raw).is_ok());

        let client = composer()
            .handler("jobs.handler", Arc::new(MockConsumerHandler::new()))
            .compose(&raw)
            .unwrap();
        assert_eq!(client.get_consumer("worker").unwrap().descriptor().callback, "jobs.handler");
    }

    #[test]
    fn topology_is_loaded_from_a_file() {
        let path = std::env::temp_dir().join(format!("topology-{}.json", uuid::Uuid::new_v4()));
        let mut file = File::create(&path).unwrap();
        file.write_all(jobs().to_string().as_bytes()).unwrap();

        let raw = load_topology(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(raw, jobs());
        assert!(composer().compose(&raw).is_ok());
    }

    #[test]
    fn unreadable_topology_file() {
        let err = load_topology("/nonexistent/topology.json").unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable(_)));
    }
}
