use anacostia_metadb::{data::ArtifactEntry, id::RunId};
use base64::Engine;
use reqwest::{header, Client, IntoUrl, StatusCode, Url};

use crate::{
	errors::{convert_error, ConnectorRequestError},
	wire::{FetchArtifactResponse, PutArtifactRequest},
};

/// Reads and writes a remote resource node's artifacts.
///
/// Artifact bytes are owned by the resource node that created them;
/// everyone else goes through this proxy.
pub struct HttpResourceClient {
	client: Client,
	pipeline_url: Url,
	secret: String,

	/// The resource node on the remote pipeline
	node: String,
}

impl HttpResourceClient {
	pub fn new(
		pipeline_url: impl IntoUrl,
		secret: &str,
		node: &str,
	) -> Result<Self, reqwest::Error> {
		Ok(Self {
			client: Client::new(),
			pipeline_url: pipeline_url.into_url()?,
			secret: secret.into(),
			node: node.into(),
		})
	}

	fn auth(&self) -> String {
		format!("Bearer {}", self.secret)
	}

	/// List the artifact entries a run is consuming
	pub async fn list_artifacts(
		&self,
		run: RunId,
	) -> Result<Vec<ArtifactEntry>, ConnectorRequestError> {
		let res = self
			.client
			.get(
				self.pipeline_url
					.join(&format!("/rpc/resource/{}/artifacts", self.node))
					.unwrap(),
			)
			.query(&[("run_id", i64::from(run).to_string())])
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(convert_error)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(convert_error)?),
			x => {
				return Err(ConnectorRequestError::GenericHttp {
					code: x,
					message: res.text().await.ok(),
				})
			}
		}
	}

	/// Fetch one artifact's bytes by path
	pub async fn fetch(&self, path: &str) -> Result<Vec<u8>, ConnectorRequestError> {
		let res = self
			.client
			.get(
				self.pipeline_url
					.join(&format!("/rpc/resource/{}/fetch", self.node))
					.unwrap(),
			)
			.query(&[("path", path)])
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(convert_error)?;

		match res.status() {
			StatusCode::OK => {
				let body: FetchArtifactResponse = res.json().await.map_err(convert_error)?;
				return base64::engine::general_purpose::STANDARD
					.decode(&body.data)
					.map_err(|e| ConnectorRequestError::GenericHttp {
						code: StatusCode::OK,
						message: Some(format!("bad base64 in fetch response: {e}")),
					});
			}
			x => {
				return Err(ConnectorRequestError::GenericHttp {
					code: x,
					message: res.text().await.ok(),
				})
			}
		}
	}

	/// Upload an artifact into the resource node's root
	pub async fn put(&self, path: &str, data: &[u8]) -> Result<(), ConnectorRequestError> {
		let res = self
			.client
			.post(
				self.pipeline_url
					.join(&format!("/rpc/resource/{}/put", self.node))
					.unwrap(),
			)
			.json(&PutArtifactRequest {
				path: path.into(),
				data: base64::engine::general_purpose::STANDARD.encode(data),
			})
			.header(header::AUTHORIZATION, self.auth())
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
}
