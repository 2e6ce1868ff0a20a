// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Logging Setup
//!
//! Installs the global `tracing` subscriber: human readable output when running
//! locally, Bunyan JSON everywhere else. Records emitted through the `log`
//! crate (as `lapin` does) are forwarded to `tracing`.

use crate::settings::{AppConfigs, Environment};
use thiserror::Error;
use tracing::warn;
use tracing_bunyan_formatter::BunyanFormattingLayer;
use tracing_log::LogTracer;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{
        format::{Format, Pretty},
        Layer,
    },
    layer::SubscriberExt,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoggingError {
    #[error("logging internal error")]
    InternalError,
}

/// Crates whose logs are capped at WARN unless external logging is enabled.
const EXTERNAL_CRATES: [&str; 5] = ["lapin", "amq_protocol", "pinky_swear", "async_io", "log"];

pub fn setup(cfg: &AppConfigs) -> Result<(), LoggingError> {
    if let Err(err) = LogTracer::init() {
        warn!(
            error = err.to_string(),
            "failure to initialize logger, probably the log was already initialized"
        );
    }

    let target_filters = targets(cfg);

    let mut fmt_pretty: Option<Layer<_, Pretty, Format<Pretty>>> = None;
    let mut fmt_json = None;

    if cfg.env == Environment::Local {
        fmt_pretty = Some(Layer::new().pretty());
    } else {
        fmt_json = Some(BunyanFormattingLayer::new(
            cfg.name.to_owned(),
            std::io::stdout,
        ));
    }

    match tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(fmt_json)
            .with(fmt_pretty)
            .with(target_filters),
    ) {
        Err(err) => {
            warn!(error = err.to_string(), "failure to set tracing subscribe");
            Err(LoggingError::InternalError)
        }
        _ => Ok(()),
    }
}

fn targets(cfg: &AppConfigs) -> Targets {
    let level_filter = get_log_level_filter(cfg);
    let targets = Targets::new().with_default(level_filter);

    if cfg.enable_external_creates_logging {
        return targets;
    }

    EXTERNAL_CRATES
        .iter()
        .fold(targets, |targets, krate| targets.with_target(*krate, LevelFilter::WARN))
}

fn get_log_level_filter(cfg: &AppConfigs) -> LevelFilter {
    match cfg.log_level.as_str() {
        "debug" | "Debug" | "DEBUG" => LevelFilter::DEBUG,
        "info" | "Info" | "INFO" => LevelFilter::INFO,
        "warn" | "Warn" | "WARN" => LevelFilter::WARN,
        "error" | "Error" | "ERROR" => LevelFilter::ERROR,
        "trace" | "Trace" | "TRACE" => LevelFilter::TRACE,
        _ => LevelFilter::OFF,
    }
}
