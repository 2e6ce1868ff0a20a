// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Application Settings
//!
//! Process-level settings read from the environment. Before reading, the
//! `.env` file matching `RUST_ENV` is loaded when present.

use dotenvy::from_filename;
use std::{
    env,
    fmt::{Display, Formatter, Result},
};

pub const RUST_ENV_KEY: &str = "RUST_ENV";
pub const APP_NAME_ENV_KEY: &str = "APP_NAME";
pub const LOG_LEVEL_ENV_KEY: &str = "LOG_LEVEL";
pub const ENABLE_EXTERNAL_CREATES_LOGGING_ENV_KEY: &str = "ENABLE_EXTERNAL_CREATES_LOGGING";

pub const LOCAL_ENV_FILE_NAME: &str = ".env.local";
pub const DEV_ENV_FILE_NAME: &str = ".env.develop";
pub const STAGING_FILE_NAME: &str = ".env.staging";
pub const PROD_FILE_NAME: &str = ".env.prod";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Staging,
    Prod,
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let printable = match *self {
            Environment::Local => "local",
            Environment::Dev => "development",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        };
        write!(f, "{}", printable)
    }
}

impl Environment {
    pub fn from_rust_env() -> Environment {
        Environment::parse(&env::var(RUST_ENV_KEY).unwrap_or_default())
    }

    fn parse(value: &str) -> Environment {
        match value {
            "production" | "prod" | "PRODUCTION" | "PROD" => Environment::Prod,
            "staging" | "stg" | "STAGING" | "STG" => Environment::Staging,
            "develop" | "DEVELOP" | "dev" | "DEV" => Environment::Dev,
            _ => Environment::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        self == &Environment::Local
    }

    fn env_file(&self) -> &'static str {
        match self {
            Environment::Prod => PROD_FILE_NAME,
            Environment::Staging => STAGING_FILE_NAME,
            Environment::Dev => DEV_ENV_FILE_NAME,
            Environment::Local => LOCAL_ENV_FILE_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfigs {
    ///Default: rabbitmq-topology
    pub name: String,
    ///Default: Environment::Local
    pub env: Environment,
    ///Default: debug
    pub log_level: String,
    ///Default: false
    pub enable_external_creates_logging: bool,
}

impl Default for AppConfigs {
    fn default() -> Self {
        Self {
            name: "rabbitmq-topology".to_owned(),
            env: Environment::Local,
            log_level: "debug".to_owned(),
            enable_external_creates_logging: false,
        }
    }
}

impl AppConfigs {
    /// Loads the `.env` file of the current environment, then reads the settings.
    ///
    /// Missing or unparsable variables fall back to their defaults.
    pub fn from_env() -> AppConfigs {
        let env = Environment::from_rust_env();
        from_filename(env.env_file()).ok();

        let defaults = AppConfigs::default();

        AppConfigs {
            name: env::var(APP_NAME_ENV_KEY).unwrap_or(defaults.name),
            env,
            log_level: env::var(LOG_LEVEL_ENV_KEY).unwrap_or(defaults.log_level),
            enable_external_creates_logging: env::var(ENABLE_EXTERNAL_CREATES_LOGGING_ENV_KEY)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_external_creates_logging),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_is_parsed_from_aliases() {
        assert_eq!(Environment::parse("prod"), Environment::Prod);
        assert_eq!(Environment::parse("PRODUCTION"), Environment::Prod);
        assert_eq!(Environment::parse("stg"), Environment::Staging);
        assert_eq!(Environment::parse("develop"), Environment::Dev);
        assert_eq!(Environment::parse(""), Environment::Local);
        assert_eq!(Environment::parse("whatever"), Environment::Local);
    }

    #[test]
    fn environment_selects_its_env_file() {
        assert_eq!(Environment::Local.env_file(), ".env.local");
        assert_eq!(Environment::Dev.env_file(), ".env.develop");
        assert_eq!(Environment::Prod.env_file(), ".env.prod");
        assert!(Environment::Local.is_local());
        assert!(!Environment::Staging.is_local());
    }

    #[test]
    fn default_configs() {
        let cfg = AppConfigs::default();
        assert_eq!(cfg.env, Environment::Local);
        assert_eq!(cfg.log_level, "debug");
        assert!(!cfg.enable_external_creates_logging);
    }
}
