use anacostia_metadb::{
	base::{
		client::MetadataClient,
		errors::{
			AddNodeError, CreateEntryError, EndRunError, GetEntriesError, GetMetricsError,
			GetRunError, LogMetricError, RecordEventError, RequestError, StartRunError,
		},
	},
	data::{ArtifactEntry, ArtifactState, NodeDescriptor, RunInfo},
	id::{EntryId, RunId},
};
use async_trait::async_trait;
use reqwest::{header, Client, IntoUrl, StatusCode, Url};
use smartstring::{LazyCompact, SmartString};

use crate::wire::{CreateEntryRequest, EndRunRequest, LogMetricRequest, RecordEventRequest};

/// The in-process metadata store contract, spoken over HTTP.
///
/// Leaf pipelines use this as their store: every node on a leaf reads
/// and writes the root's store through the root's `/rpc/metadata/*`
/// endpoints.
pub struct HttpMetadataClient {
	client: Client,
	store_url: Url,
	secret: String,
}

impl HttpMetadataClient {
	pub fn new(store_url: impl IntoUrl, secret: &str) -> Result<Self, reqwest::Error> {
		Ok(Self {
			client: Client::new(),
			store_url: store_url.into_url()?,
			secret: secret.into(),
		})
	}

	fn auth(&self) -> String {
		format!("Bearer {}", self.secret)
	}

	fn url(&self, path: &str) -> Url {
		self.store_url.join(path).unwrap()
	}
}

fn req_err(e: reqwest::Error) -> RequestError {
	if let Some(status) = e.status() {
		RequestError::GenericHttp {
			code: status.as_u16(),
			message: Some(e.to_string()),
		}
	} else {
		RequestError::Other(Box::new(e))
	}
}

async fn unexpected(res: reqwest::Response) -> RequestError {
	RequestError::GenericHttp {
		code: res.status().as_u16(),
		message: res.text().await.ok(),
	}
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
	//
	// MARK: Runs
	//

	async fn start_run(&self) -> Result<RunId, StartRunError> {
		let res = self
			.client
			.post(self.url("/rpc/metadata/run/start"))
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => {
				let run: RunId = res.json().await.map_err(req_err)?;
				return Ok(run);
			}
			StatusCode::CONFLICT => return Err(StartRunError::RunActive),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn end_run(&self, run: RunId) -> Result<(), EndRunError> {
		let res = self
			.client
			.post(self.url("/rpc/metadata/run/end"))
			.json(&EndRunRequest { run_id: run })
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(()),
			StatusCode::CONFLICT => return Err(EndRunError::NotActive),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn active_run(&self) -> Result<Option<RunId>, GetRunError> {
		let res = self
			.client
			.get(self.url("/rpc/metadata/run/active"))
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn get_run(&self, run: RunId) -> Result<Option<RunInfo>, GetRunError> {
		let res = self
			.client
			.get(self.url(&format!("/rpc/metadata/run/{}", i64::from(run))))
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	//
	// MARK: Artifact entries
	//

	async fn create_entry(&self, location: &str) -> Result<EntryId, CreateEntryError> {
		let res = self
			.client
			.post(self.url("/rpc/metadata/entry"))
			.json(&CreateEntryRequest {
				location: location.into(),
			})
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			StatusCode::CONFLICT => return Err(CreateEntryError::AlreadyExists),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn entry_exists(&self, location: &str) -> Result<bool, GetEntriesError> {
		let res = self
			.client
			.get(self.url("/rpc/metadata/entry/exists"))
			.query(&[("location", location)])
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn get_num_entries(
		&self,
		state: Option<ArtifactState>,
		run: Option<RunId>,
	) -> Result<i64, GetEntriesError> {
		let mut query: Vec<(&str, String)> = Vec::new();
		if let Some(state) = state {
			query.push(("state", state.as_db_str().into()));
		}
		if let Some(run) = run {
			query.push(("run_id", i64::from(run).to_string()));
		}

		let res = self
			.client
			.get(self.url("/rpc/metadata/entry/count"))
			.query(&query)
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn list_entries(
		&self,
		state: Option<ArtifactState>,
		run: Option<RunId>,
	) -> Result<Vec<ArtifactEntry>, GetEntriesError> {
		let mut query: Vec<(&str, String)> = Vec::new();
		if let Some(state) = state {
			query.push(("state", state.as_db_str().into()));
		}
		if let Some(run) = run {
			query.push(("run_id", i64::from(run).to_string()));
		}

		let res = self
			.client
			.get(self.url("/rpc/metadata/entry/list"))
			.query(&query)
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	//
	// MARK: Metrics
	//

	async fn log_metric(&self, name: &str, value: f64) -> Result<(), LogMetricError> {
		let res = self
			.client
			.post(self.url("/rpc/metadata/metric"))
			.json(&LogMetricRequest {
				name: name.into(),
				value,
			})
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(()),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn get_metrics(
		&self,
		name: &str,
		run: Option<RunId>,
	) -> Result<Vec<f64>, GetMetricsError> {
		let mut query: Vec<(&str, String)> = vec![("name", name.into())];
		if let Some(run) = run {
			query.push(("run_id", i64::from(run).to_string()));
		}

		let res = self
			.client
			.get(self.url("/rpc/metadata/metric"))
			.query(&query)
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(res.json().await.map_err(req_err)?),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	//
	// MARK: Nodes
	//

	async fn add_node(&self, node: &NodeDescriptor) -> Result<(), AddNodeError> {
		let res = self
			.client
			.post(self.url("/rpc/metadata/node"))
			.json(node)
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(()),
			_ => return Err(unexpected(res).await.into()),
		}
	}

	async fn record_node_event(
		&self,
		run: RunId,
		node: &SmartString<LazyCompact>,
		status: &str,
	) -> Result<(), RecordEventError> {
		let res = self
			.client
			.post(self.url("/rpc/metadata/event"))
			.json(&RecordEventRequest {
				run_id: run,
				node: node.clone(),
				status: status.into(),
			})
			.header(header::AUTHORIZATION, self.auth())
			.send()
			.await
			.map_err(req_err)?;

		match res.status() {
			StatusCode::OK => return Ok(()),
			_ => return Err(unexpected(res).await.into()),
		}
	}
}
