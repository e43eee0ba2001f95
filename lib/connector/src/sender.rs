use anacostia_node::{engine::RemoteSignalSender, signal::Signal};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{header, Client, IntoUrl, StatusCode, Url};
use smartstring::{LazyCompact, SmartString};
use std::{
	error::Error,
	sync::atomic::{AtomicBool, Ordering},
	time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
	errors::{convert_error, ConnectorRequestError, SendSignalError},
	wire::{ConnectRequest, ConnectResponse, SignalRequest},
};

/// Retry behaviour for signal delivery
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
	/// Give up after this many attempts
	pub max_attempts: u32,

	/// Delay before the second attempt. Doubles each retry,
	/// with a little jitter on top.
	pub base_delay_ms: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			base_delay_ms: 100,
		}
	}
}

/// The sending half of one remote edge.
///
/// Bound to a single `(predecessor node, successor node)` pair at
/// pipeline assembly. Signals flow through [`RemoteSignalSender`];
/// the handshake happens once at launch.
pub struct ConnectorSender {
	client: Client,
	peer_url: Url,
	secret: String,

	/// The node on the peer pipeline we deliver to
	target_node: SmartString<LazyCompact>,

	/// What we introduce ourselves as
	request: ConnectRequest,

	retry: RetryConfig,

	/// Set once the peer accepted our handshake
	live: AtomicBool,
}

impl ConnectorSender {
	pub fn new(
		peer_url: impl IntoUrl,
		secret: &str,
		target_node: &str,
		predecessor_id: &str,
		pipeline_id: &str,
		run_id_space: &str,
		retry: RetryConfig,
	) -> Result<Self, reqwest::Error> {
		Ok(Self {
			// A dead peer must fail fast: the retry budget, not the
			// OS connect timeout, decides when we give up.
			client: Client::builder()
				.connect_timeout(Duration::from_secs(5))
				.timeout(Duration::from_secs(10))
				.build()?,
			peer_url: peer_url.into_url()?,
			secret: secret.into(),
			target_node: target_node.into(),
			request: ConnectRequest {
				predecessor_id: predecessor_id.into(),
				pipeline_id: pipeline_id.into(),
				run_id_space: run_id_space.into(),
			},
			retry,
			live: AtomicBool::new(false),
		})
	}

	/// Where this sender delivers to, for logs
	pub fn peer_url(&self) -> &Url {
		&self.peer_url
	}

	/// Has the peer accepted our handshake?
	pub fn is_live(&self) -> bool {
		self.live.load(Ordering::SeqCst)
	}

	/// One handshake attempt.
	pub async fn handshake(&self) -> Result<ConnectResponse, ConnectorRequestError> {
		let res = self
			.client
			.post(self.peer_url.join("/connect").unwrap())
			.json(&self.request)
			.header(header::AUTHORIZATION, format!("Bearer {}", self.secret))
			.send()
			.await
			.map_err(convert_error)?;

		match res.status() {
			StatusCode::OK => {
				let response: ConnectResponse = res.json().await.map_err(convert_error)?;

				if !response.accepted {
					warn!(
						message = "Peer refused handshake",
						peer = %self.peer_url,
						predecessor = %self.request.predecessor_id,
					);
					return Err(ConnectorRequestError::Refused);
				}

				info!(
					message = "Connector handshake complete",
					peer = %self.peer_url,
					receiver = %response.receiver_id,
					predecessor = %self.request.predecessor_id,
				);
				self.live.store(true, Ordering::SeqCst);
				return Ok(response);
			}

			x => {
				return Err(ConnectorRequestError::GenericHttp {
					code: x,
					message: res.text().await.ok(),
				})
			}
		}
	}

	/// One delivery attempt.
	async fn send_signal_once(&self, signal: &Signal) -> Result<(), ConnectorRequestError> {
		let res = self
			.client
			.post(self.peer_url.join("/signal").unwrap())
			.json(&SignalRequest::from(signal))
			.header(header::AUTHORIZATION, format!("Bearer {}", self.secret))
			.send()
			.await
			.map_err(convert_error)?;

		match res.status() {
			StatusCode::OK => return Ok(()),
			x => {
				return Err(ConnectorRequestError::GenericHttp {
					code: x,
					message: res.text().await.ok(),
				})
			}
		}
	}

	/// Deliver a signal, retrying with exponential backoff until the
	/// budget runs out. Receivers dedup by `(from, run)`, so a retry
	/// of a delivery that silently succeeded is harmless.
	pub async fn deliver(&self, signal: &Signal) -> Result<(), SendSignalError> {
		if !self.is_live() {
			return Err(SendSignalError::NotConnected);
		}

		let mut last = None;
		for attempt in 0..self.retry.max_attempts {
			if attempt > 0 {
				let backoff = self.retry.base_delay_ms << (attempt - 1);
				let jitter = rand::thread_rng().gen_range(0..=self.retry.base_delay_ms);
				tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
			}

			match self.send_signal_once(signal).await {
				Ok(()) => return Ok(()),
				Err(error) => {
					debug!(
						message = "Signal delivery attempt failed",
						peer = %self.peer_url,
						target = %self.target_node,
						attempt,
						?error,
					);
					last = Some(error);
				}
			}
		}

		return Err(SendSignalError::BudgetExhausted {
			attempts: self.retry.max_attempts,
			// max_attempts is checked nonzero at config load
			last: last.unwrap(),
		});
	}
}

#[async_trait]
impl RemoteSignalSender for ConnectorSender {
	fn target_node(&self) -> &str {
		&self.target_node
	}

	async fn send_signal(&self, signal: Signal) -> Result<(), Box<dyn Error + Send + Sync>> {
		self.deliver(&signal).await.map_err(|e| Box::new(e) as _)
	}
}
