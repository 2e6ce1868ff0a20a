// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Configuration Validation
//!
//! Every entity category declares its recognized options as a constant
//! [`DefaultsTable`]. [`validate`] merges one entity's supplied options over that
//! table and rejects anything the table does not know about. The merged result,
//! a [`ValidatedConfig`], offers typed accessors that report the offending key
//! when a value has the wrong shape.

use crate::errors::ConfigError;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};

/// The five kinds of entities a topology is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Connection,
    Queue,
    Exchange,
    Producer,
    Consumer,
}

impl Category {
    /// All categories, in composition order.
    pub const ALL: [Category; 5] = [
        Category::Connection,
        Category::Queue,
        Category::Exchange,
        Category::Producer,
        Category::Consumer,
    ];

    /// Name of the top-level configuration block holding this category.
    pub fn section(&self) -> &'static str {
        match self {
            Category::Connection => "connections",
            Category::Queue => "queues",
            Category::Exchange => "exchanges",
            Category::Producer => "producers",
            Category::Consumer => "consumers",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Connection => "connection",
            Category::Queue => "queue",
            Category::Exchange => "exchange",
            Category::Producer => "producer",
            Category::Consumer => "consumer",
        };
        f.write_str(name)
    }
}

/// A constant default for one option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// No default; the option is either optional or required by the category
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
    /// An empty map, for free-form argument tables
    EmptyMap,
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Null => Value::Null,
            DefaultValue::Bool(v) => Value::Bool(v),
            DefaultValue::Int(v) => Value::from(v),
            DefaultValue::Float(v) => Value::from(v),
            DefaultValue::Str(v) => Value::String(v.to_owned()),
            DefaultValue::EmptyMap => Value::Object(Map::new()),
        }
    }
}

/// Recognized options of a category and their defaults.
pub type DefaultsTable = [(&'static str, DefaultValue)];

/// Merges `supplied` over `defaults` for a single entity.
///
/// The result holds every option of the table, supplied or defaulted. A supplied
/// key the table does not list fails with [`ConfigError::UnknownOption`].
pub fn validate(
    category: Category,
    entity: &str,
    defaults: &DefaultsTable,
    supplied: &Map<String, Value>,
) -> Result<ValidatedConfig, ConfigError> {
    if let Some(key) = supplied
        .keys()
        .find(|key| !defaults.iter().any(|(name, _)| *name == key.as_str()))
    {
        return Err(ConfigError::UnknownOption {
            category,
            entity: entity.to_owned(),
            key: key.to_owned(),
        });
    }

    let options = defaults
        .iter()
        .map(|(name, default)| {
            let value = supplied
                .get(*name)
                .cloned()
                .unwrap_or_else(|| default.to_value());
            ((*name).to_owned(), value)
        })
        .collect();

    Ok(ValidatedConfig {
        category,
        entity: entity.to_owned(),
        options,
    })
}

/// Reads the body of one entity: a map of options, where `null` stands for "all defaults".
pub(crate) fn entity_body(
    category: Category,
    entity: &str,
    body: &Value,
) -> Result<Map<String, Value>, ConfigError> {
    match body {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(ConfigError::InvalidValue {
            category,
            entity: entity.to_owned(),
            key: entity.to_owned(),
            reason: format!("expected a map of options, found {}", kind_of(other)),
        }),
    }
}

/// Validates every entity of a category section against the same defaults.
pub(crate) fn validate_all(
    category: Category,
    defaults: &DefaultsTable,
    section: &Map<String, Value>,
) -> Result<BTreeMap<String, ValidatedConfig>, ConfigError> {
    section
        .iter()
        .map(|(name, body)| {
            let supplied = entity_body(category, name, body)?;
            Ok((name.to_owned(), validate(category, name, defaults, &supplied)?))
        })
        .collect()
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a map",
    }
}

/// The merged option set of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    category: Category,
    entity: String,
    options: BTreeMap<String, Value>,
}

impl ValidatedConfig {
    pub fn category(&self) -> Category {
        self.category
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn bool(&self, key: &str) -> Result<bool, ConfigError> {
        let value = self.value(key)?;
        value.as_bool().ok_or_else(|| {
            self.invalid(key, format!("expected a boolean, found {}", kind_of(value)))
        })
    }

    pub fn str(&self, key: &str) -> Result<&str, ConfigError> {
        let value = self.value(key)?;
        value.as_str().ok_or_else(|| {
            self.invalid(key, format!("expected a string, found {}", kind_of(value)))
        })
    }

    /// A string option that may be left unset.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        match self.value(key)? {
            Value::Null => Ok(None),
            _ => self.str(key).map(Some),
        }
    }

    /// A string option that must be set.
    pub fn required_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.opt_str(key)?.ok_or_else(|| ConfigError::MissingOption {
            category: self.category,
            entity: self.entity.clone(),
            key: key.to_owned(),
        })
    }

    pub fn u64(&self, key: &str) -> Result<u64, ConfigError> {
        let value = self.value(key)?;
        value.as_u64().ok_or_else(|| {
            self.invalid(
                key,
                format!("expected a non-negative integer, found {}", kind_of(value)),
            )
        })
    }

    pub fn u16(&self, key: &str) -> Result<u16, ConfigError> {
        let value = self.u64(key)?;
        u16::try_from(value).map_err(|_| self.invalid(key, format!("{value} is out of range")))
    }

    pub fn u8(&self, key: &str) -> Result<u8, ConfigError> {
        let value = self.u64(key)?;
        u8::try_from(value).map_err(|_| self.invalid(key, format!("{value} is out of range")))
    }

    /// A non-negative number, integer or float.
    pub fn f64(&self, key: &str) -> Result<f64, ConfigError> {
        let value = self.value(key)?;
        match value.as_f64() {
            Some(v) if v >= 0.0 => Ok(v),
            Some(v) => Err(self.invalid(key, format!("{v} is negative"))),
            None => Err(self.invalid(key, format!("expected a number, found {}", kind_of(value)))),
        }
    }

    pub fn map(&self, key: &str) -> Result<&Map<String, Value>, ConfigError> {
        let value = self.value(key)?;
        value
            .as_object()
            .ok_or_else(|| self.invalid(key, format!("expected a map, found {}", kind_of(value))))
    }

    pub(crate) fn invalid(&self, key: &str, reason: String) -> ConfigError {
        ConfigError::InvalidValue {
            category: self.category,
            entity: self.entity.clone(),
            key: key.to_owned(),
            reason,
        }
    }

    fn value(&self, key: &str) -> Result<&Value, ConfigError> {
        // Only keys from the category's own table are ever asked for.
        self.options
            .get(key)
            .ok_or_else(|| ConfigError::UnknownOption {
                category: self.category,
                entity: self.entity.clone(),
                key: key.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection, consumer, exchange, producer, queue};
    use serde_json::json;

    fn tables() -> Vec<(Category, &'static DefaultsTable)> {
        vec![
            (Category::Connection, connection::DEFAULTS),
            (Category::Queue, queue::DEFAULTS),
            (Category::Exchange, exchange::DEFAULTS),
            (Category::Producer, producer::DEFAULTS),
            (Category::Consumer, consumer::DEFAULTS),
        ]
    }

    #[test]
    fn empty_override_yields_exactly_the_defaults() {
        for (category, defaults) in tables() {
            let validated = validate(category, "e", defaults, &Map::new()).unwrap();

            assert_eq!(validated.options().len(), defaults.len());
            for (name, default) in defaults {
                assert_eq!(validated.get(name), Some(&default.to_value()));
            }
        }
    }

    #[test]
    fn unknown_key_is_rejected_in_every_category() {
        for (category, defaults) in tables() {
            let supplied = json!({ "bogus": true });
            let err = validate(category, "e", defaults, supplied.as_object().unwrap()).unwrap_err();

            assert_eq!(
                err,
                ConfigError::UnknownOption {
                    category,
                    entity: "e".to_owned(),
                    key: "bogus".to_owned(),
                }
            );
        }
    }

    #[test]
    fn supplied_values_override_defaults_per_entity() {
        let section = json!({
            "jobs": { "durable": false },
            "mails": { "exclusive": true },
        });
        let validated =
            validate_all(Category::Queue, queue::DEFAULTS, section.as_object().unwrap()).unwrap();

        assert!(!validated["jobs"].bool("durable").unwrap());
        assert!(!validated["jobs"].bool("exclusive").unwrap());
        assert!(validated["mails"].bool("durable").unwrap());
        assert!(validated["mails"].bool("exclusive").unwrap());
    }

    #[test]
    fn null_body_means_all_defaults() {
        let section = json!({ "jobs": null });
        let validated =
            validate_all(Category::Queue, queue::DEFAULTS, section.as_object().unwrap()).unwrap();

        assert_eq!(validated["jobs"].str("connection").unwrap(), "default");
    }

    #[test]
    fn non_map_body_is_rejected() {
        let section = json!({ "jobs": 12 });
        let err = validate_all(Category::Queue, queue::DEFAULTS, section.as_object().unwrap())
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { entity, .. } if entity == "jobs"));
    }

    #[test]
    fn accessors_report_the_key_on_type_mismatch() {
        let supplied = json!({ "durable": "yes" });
        let validated =
            validate(Category::Queue, "jobs", queue::DEFAULTS, supplied.as_object().unwrap())
                .unwrap();

        let err = validated.bool("durable").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "durable"));
    }

    #[test]
    fn numeric_accessors_check_ranges() {
        let supplied = json!({ "port": 70000, "heartbeat": -1 });
        let validated = validate(
            Category::Connection,
            "default",
            connection::DEFAULTS,
            supplied.as_object().unwrap(),
        )
        .unwrap();

        assert!(validated.u16("port").is_err());
        assert!(validated.f64("heartbeat").is_err());
        assert_eq!(validated.f64("timeout").unwrap(), 10.0);
    }

    #[test]
    fn required_string_reports_missing_option() {
        let validated =
            validate(Category::Consumer, "mailer", consumer::DEFAULTS, &Map::new()).unwrap();

        assert_eq!(
            validated.required_str("queue").unwrap_err(),
            ConfigError::MissingOption {
                category: Category::Consumer,
                entity: "mailer".to_owned(),
                key: "queue".to_owned(),
            }
        );
    }
}
