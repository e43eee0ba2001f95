use anacostia_util::LoggingPreset;
use axum::http::HeaderMap;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Daemon-level settings.
///
/// Note that the fields of this struct are not capitalized.
/// Envy is case-insensitive, and expects Rust fields to be snake_case;
/// `anacostiad_secret` is the env var `ANACOSTIAD_SECRET`.
#[derive(Debug, Deserialize)]
pub struct AnacostiadConfig {
	/// Path to this pipeline's TOML config
	pub anacostiad_config_path: PathBuf,

	/// The secret used to authenticate peers and callers.
	/// Every pipeline in a federation shares one secret.
	///
	/// This should be a long sequence of random characters;
	/// anyone with it can call all mutating endpoints.
	pub anacostiad_secret: String,

	/// Maximum request body size, in bytes.
	/// If you're using a reverse proxy, make sure it
	/// also accepts requests of this size!
	#[serde(default = "AnacostiadConfig::default_request_body_limit")]
	pub anacostiad_request_body_limit: usize,

	#[serde(default)]
	pub anacostiad_loglevel: LoggingPreset,
}

impl AnacostiadConfig {
	fn default_request_body_limit() -> usize {
		2_000_000
	}
}

// Capture this in a module to modify log source
mod auth {
	use super::*;
	use axum::http::Uri;

	impl AnacostiadConfig {
		/// Check the given header map for `self.anacostiad_secret`.
		///
		/// Returns `true` if authentication is successful and `false` otherwise.
		pub fn header_has_valid_auth(&self, uri: &Uri, headers: &HeaderMap) -> bool {
			let token = if let Some(header) = headers.get("authorization") {
				match header.to_str().map(|x| x.strip_prefix("Bearer ")) {
					Ok(Some(secret)) => secret,
					Ok(None) => {
						debug!(
							message = "Authentication failed",
							reason = "invalid header value",
							?uri,
						);
						return false;
					}
					Err(error) => {
						debug!(
							message = "Authentication failed",
							reason = "could not stringify auth header",
							?uri,
							?error,
						);
						return false;
					}
				}
			} else {
				info!(
					message = "Authentication failed",
					reason = "header missing",
					?uri
				);
				return false;
			};

			if token == self.anacostiad_secret {
				return true;
			} else {
				info!(
					message = "Authentication failed",
					reason = "header mismatch",
					?uri,
				);
				return false;
			}
		}
	}
}
