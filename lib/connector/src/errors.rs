//! Errors we can encounter when speaking to a remote pipeline

use reqwest::StatusCode;
use thiserror::Error;

/// An error from a single request to a peer
#[derive(Debug, Error)]
pub enum ConnectorRequestError {
	/// The peer answered with a non-ok status code
	#[error("peer answered with code {code}")]
	GenericHttp {
		code: StatusCode,
		message: Option<String>,
	},

	/// The peer refused the handshake
	#[error("peer refused handshake")]
	Refused,

	/// The request never completed (unreachable peer, timeout, ...)
	#[error("request error")]
	Other(#[from] reqwest::Error),
}

/// An error we surface after giving up on signal delivery
#[derive(Debug, Error)]
pub enum SendSignalError {
	/// Every attempt within the retry budget failed.
	/// The emitting node reports `ERROR` when it sees this.
	#[error("signal delivery failed after {attempts} attempts")]
	BudgetExhausted {
		attempts: u32,
		#[source]
		last: ConnectorRequestError,
	},

	/// This sender has not completed its handshake yet
	#[error("connector is not live")]
	NotConnected,
}

pub(crate) fn convert_error(e: reqwest::Error) -> ConnectorRequestError {
	if let Some(status) = e.status() {
		ConnectorRequestError::GenericHttp {
			code: status,
			message: Some(e.to_string()),
		}
	} else {
		ConnectorRequestError::Other(e)
	}
}
