use serde::de::DeserializeOwned;
use smartstring::{LazyCompact, SmartString};
use std::{io::ErrorKind, path::PathBuf};
use thiserror::Error;

/// An error we encounter while reading configuration
/// from the environment
#[derive(Debug, Error)]
pub enum EnvLoadError {
	/// We could not read `.env`
	#[error("i/o error while reading .env")]
	IoError(#[from] std::io::Error),

	/// `.env` contains a line we could not parse
	#[error("line parse error: `{on_line}` at char {at_char}")]
	LineParse { on_line: String, at_char: usize },

	/// Some other dotenvy error
	#[error("dotenvy error")]
	Other(#[source] dotenvy::Error),

	/// A required variable was not set
	#[error("missing value {0}")]
	MissingValue(SmartString<LazyCompact>),

	/// A variable was set, but we could not parse it
	#[error("parse error: {0}")]
	BadValue(String),
}

/// The result of a successful [`load_env`] call.
/// Keeps track of where the config came from, so the daemon
/// can log it once logging is up.
pub enum LoadedEnv<T> {
	/// We loaded config from `.env` and env vars
	FoundFile { config: T, path: PathBuf },

	/// We could not find `.env` and only loaded env vars
	OnlyVars(T),
}

impl<T> LoadedEnv<T> {
	pub fn get_config(&self) -> &T {
		match self {
			Self::FoundFile { config, .. } => config,
			Self::OnlyVars(config) => config,
		}
	}
}

/// Load the configuration type `T` from the current environment,
/// including the `.env` if it exists.
pub fn load_env<T: DeserializeOwned>() -> Result<LoadedEnv<T>, EnvLoadError> {
	let env_path = match dotenvy::dotenv() {
		Ok(path) => Some(path),

		// A missing `.env` is fine, everything else is not.
		Err(dotenvy::Error::Io(err)) => match err.kind() {
			ErrorKind::NotFound => None,
			_ => return Err(EnvLoadError::IoError(err)),
		},

		Err(dotenvy::Error::LineParse(on_line, at_char)) => {
			return Err(EnvLoadError::LineParse { on_line, at_char });
		}

		Err(err) => {
			return Err(EnvLoadError::Other(err));
		}
	};

	let config = match envy::from_env::<T>() {
		Ok(config) => config,
		Err(envy::Error::MissingValue(value)) => {
			return Err(EnvLoadError::MissingValue(value.into()))
		}
		Err(envy::Error::Custom(message)) => return Err(EnvLoadError::BadValue(message)),
	};

	return match env_path {
		Some(path) => Ok(LoadedEnv::FoundFile { config, path }),
		None => Ok(LoadedEnv::OnlyVars(config)),
	};
}
