use serde::Deserialize;
use std::{fmt::Display, str::FromStr};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum LogLevel {
	Trace,
	Debug,
	Info,
	Warn,
	Error,
}

impl Default for LogLevel {
	fn default() -> Self {
		Self::Info
	}
}

impl Display for LogLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Trace => write!(f, "trace"),
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warn => write!(f, "warn"),
			Self::Error => write!(f, "error"),
		}
	}
}

/// Named logging configurations for the daemon.
#[derive(Debug, Deserialize)]
pub enum LoggingPreset {
	Default,
	Verbose,
	Develop,
	Trace,
}

impl Default for LoggingPreset {
	fn default() -> Self {
		return Self::Default;
	}
}

impl LoggingPreset {
	pub fn get_config(&self) -> LoggingConfig {
		match self {
			Self::Default => LoggingConfig {
				other: LogLevel::Warn,
				http: LogLevel::Warn,

				daemon: LogLevel::Info,
				engine: LogLevel::Info,
				coordinator: LogLevel::Info,
				connector: LogLevel::Warn,
			},

			Self::Verbose => LoggingConfig {
				other: LogLevel::Warn,
				http: LogLevel::Warn,

				daemon: LogLevel::Debug,
				engine: LogLevel::Debug,
				coordinator: LogLevel::Debug,
				connector: LogLevel::Info,
			},

			Self::Develop => LoggingConfig {
				other: LogLevel::Debug,
				http: LogLevel::Warn,

				daemon: LogLevel::Trace,
				engine: LogLevel::Trace,
				coordinator: LogLevel::Debug,
				connector: LogLevel::Debug,
			},

			Self::Trace => LoggingConfig {
				other: LogLevel::Trace,
				http: LogLevel::Warn,

				daemon: LogLevel::Trace,
				engine: LogLevel::Trace,
				coordinator: LogLevel::Trace,
				connector: LogLevel::Trace,
			},
		}
	}
}

/// Per-subsystem log levels, convertible to a tracing env filter.
pub struct LoggingConfig {
	other: LogLevel,
	http: LogLevel,

	daemon: LogLevel,
	engine: LogLevel,
	coordinator: LogLevel,
	connector: LogLevel,
}

impl From<LoggingConfig> for EnvFilter {
	fn from(conf: LoggingConfig) -> Self {
		EnvFilter::from_str(
			&[
				//
				// Non-configurable sources
				//
				format!("sqlx={}", LogLevel::Warn),
				format!("hyper={}", LogLevel::Warn),
				format!("reqwest={}", LogLevel::Warn),
				//
				// Configurable sources
				//
				format!("tower_http={}", conf.http),
				format!("anacostiad={}", conf.daemon),
				format!("anacostia_node={}", conf.engine),
				format!("anacostia_pipeline={}", conf.coordinator),
				format!("anacostia_connector={}", conf.connector),
				conf.other.to_string(),
			]
			.join(","),
		)
		.unwrap()
	}
}
