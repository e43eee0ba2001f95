//! The Anacostia pipeline daemon.
//!
//! One process per pipeline: loads the pipeline's TOML config, opens
//! (or connects to) the metadata store, launches the node engines,
//! and serves the HTTP surface connectors and dashboards speak to.

use anacostia_connector::HttpMetadataClient;
use anacostia_metadb::{base::client::MetadataClient, sqlite::SqliteMetadataClient};
use anacostia_node::base::NodeDispatcher;
use anacostia_pipeline::{
	config::{PipelineConfig, PipelineRole},
	pipeline::Pipeline,
};
use anacostia_util::{load_env, LoadedEnv};
use api::RouterState;
use config::AnacostiadConfig;
use std::{error::Error, future::IntoFuture, sync::Arc};
use tracing::{debug, error, info};

mod api;
mod config;

/// Open the store this pipeline works against: the SQLite backend on
/// a root, the root's RPC mirror on a leaf.
async fn open_store(
	pipeline_config: &PipelineConfig,
	secret: &str,
) -> Result<Arc<dyn MetadataClient>, Box<dyn Error + Send + Sync>> {
	match pipeline_config.pipeline.role {
		PipelineRole::Root => {
			let db_addr = pipeline_config
				.metadata
				.db_addr
				.as_ref()
				.ok_or("root pipelines need `metadata.db_addr`")?;
			Ok(Arc::new(SqliteMetadataClient::open(db_addr).await?))
		}

		PipelineRole::Leaf => {
			let store_url = pipeline_config
				.metadata
				.store_url
				.as_ref()
				.ok_or("leaf pipelines need `metadata.store_url`")?;
			Ok(Arc::new(HttpMetadataClient::new(store_url.as_str(), secret)?))
		}
	}
}

/// Assemble a pipeline with the built-in node types registered.
async fn make_pipeline(
	pipeline_config: &PipelineConfig,
	secret: &str,
) -> Result<Arc<Pipeline>, Box<dyn Error + Send + Sync>> {
	let mut dispatcher = NodeDispatcher::new();
	anacostia_nodes_basic::register(&mut dispatcher)?;

	let metadb = open_store(pipeline_config, secret).await?;
	let pipeline = Pipeline::build(pipeline_config, &dispatcher, metadb, secret)?;
	return Ok(Arc::new(pipeline));
}

#[tokio::main]
async fn main() {
	let config_res = match load_env::<AnacostiadConfig>() {
		Ok(x) => x,
		Err(err) => {
			println!("Error while loading .env: {err}");
			std::process::exit(1);
		}
	};

	let config: Arc<AnacostiadConfig> = Arc::new(match config_res {
		LoadedEnv::FoundFile { config, .. } => config,
		LoadedEnv::OnlyVars(config) => config,
	});

	tracing_subscriber::fmt()
		.with_env_filter(config.anacostiad_loglevel.get_config())
		.without_time()
		.with_ansi(true)
		.init();

	debug!(message = "Loaded daemon config", ?config.anacostiad_config_path);

	let pipeline_config = match PipelineConfig::load_from_file(&config.anacostiad_config_path) {
		Ok(x) => x,
		Err(error) => {
			error!(message = "Could not load pipeline config", ?error);
			std::process::exit(1);
		}
	};

	if pipeline_config.pipeline.tls.is_some() {
		info!(
			message = "TLS cert configured; this daemon serves plain http, terminate TLS in a fronting proxy"
		);
	}

	let pipeline = match make_pipeline(&pipeline_config, &config.anacostiad_secret).await {
		Ok(x) => x,
		Err(error) => {
			error!(message = "Could not assemble pipeline", ?error);
			std::process::exit(1);
		}
	};

	let listener = match tokio::net::TcpListener::bind(pipeline_config.server_addr()).await {
		Ok(x) => x,
		Err(e) => {
			match e.kind() {
				std::io::ErrorKind::AddrInUse => {
					error!(
						message = "Cannot bind to address, already in use",
						server_addr = pipeline_config.server_addr()
					);
				}
				_ => {
					error!(message = "Error while binding server address", err = ?e);
				}
			}

			std::process::exit(1);
		}
	};

	match listener.local_addr() {
		Ok(x) => info!("listening on http://{x}"),
		Err(error) => {
			error!(message = "Could not determine local address", ?error);
			std::process::exit(1);
		}
	}

	let state = RouterState {
		config: config.clone(),
		pipeline: pipeline.clone(),
	};
	let app = api::router(state);

	// The server must be up before setup: our peers handshake and
	// RPC against us while we bring nodes up, and vice versa.
	let server = tokio::spawn(axum::serve(listener, app).into_future());

	match pipeline.setup_nodes().await {
		Ok(()) => {}
		Err(error) => {
			error!(message = "Pipeline setup failed", ?error);
			pipeline.teardown().await;
			std::process::exit(1);
		}
	}

	pipeline.launch_nodes();

	// The coordinator only returns early if the metadata store is
	// gone, and without the store nothing can be ordered. Tear down
	// and exit.
	match pipeline.coordinate().await {
		Ok(()) => {
			info!(message = "Coordinator stopped, shutting down");
			pipeline.teardown().await;
		}
		Err(error) => {
			error!(message = "Metadata store failure, aborting", ?error);
			pipeline.teardown().await;
			std::process::exit(1);
		}
	}

	server.abort();
}

#[cfg(test)]
mod tests {
	use super::*;
	use anacostia_metadb::{data::ArtifactState, id::RunId};
	use axum::{
		body::Body,
		http::{Method, Request, Response},
		Router,
	};
	use serde::de::DeserializeOwned;
	use std::{path::PathBuf, time::Duration};
	use tower::Service;

	const TEST_SECRET: &str = "test-secret";

	fn manifest_path(name: &str) -> PathBuf {
		PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/")).join(name)
	}

	/// Delete-and-recreate a scratch directory
	fn fresh_dir(name: &str) -> PathBuf {
		let dir = manifest_path(name);
		if dir.exists() {
			std::fs::remove_dir_all(&dir).unwrap();
		}
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	/// Delete a scratch database and return its sqlx address
	fn fresh_db(name: &str) -> String {
		let file = manifest_path(name);
		if file.exists() {
			std::fs::remove_file(&file).unwrap();
		}
		format!("sqlite://{}?mode=rwc", file.display())
	}

	fn daemon_config() -> Arc<AnacostiadConfig> {
		Arc::new(AnacostiadConfig {
			anacostiad_config_path: PathBuf::new(),
			anacostiad_secret: TEST_SECRET.into(),
			anacostiad_request_body_limit: 2_000_000,
			anacostiad_loglevel: Default::default(),
		})
	}

	async fn wait_for<F, Fut>(what: &str, mut check: F)
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = bool>,
	{
		for _ in 0..600 {
			if check().await {
				return;
			}
			tokio::time::sleep(Duration::from_millis(25)).await;
		}
		panic!("timed out waiting for {what}");
	}

	async fn app_request(
		app: &mut Router,
		method: Method,
		url: &str,
		auth: bool,
		body: serde_json::Value,
	) -> Response<Body> {
		let mut builder = Request::builder()
			.method(method)
			.header(axum::http::header::CONTENT_TYPE, "application/json")
			.uri(url);
		if auth {
			builder = builder.header(
				axum::http::header::AUTHORIZATION,
				format!("Bearer {TEST_SECRET}"),
			);
		}

		app.call(
			builder
				.body(Body::from(serde_json::to_string(&body).unwrap()))
				.unwrap(),
		)
		.await
		.unwrap()
	}

	async fn response_json<T: DeserializeOwned>(resp: Response<Body>) -> T {
		serde_json::from_str(
			&String::from_utf8(
				axum::body::to_bytes(resp.into_body(), usize::MAX)
					.await
					.unwrap()
					.to_vec(),
			)
			.unwrap(),
		)
		.unwrap()
	}

	//
	// MARK: Router surface
	//

	#[tokio::test]
	async fn router_surface() {
		let config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "surface_store"
			kind = "MetadataStore"

			[[node]]
			name = "surface_train"
			kind = "Noop"
			"#,
			fresh_db("test_surface.sqlite"),
		))
		.unwrap();

		let pipeline = make_pipeline(&config, TEST_SECRET).await.unwrap();
		let mut app = api::router(RouterState {
			config: daemon_config(),
			pipeline,
		});

		// The graph is public
		let resp = app_request(&mut app, Method::GET, "/graph", false, serde_json::json!({})).await;
		assert_eq!(resp.status(), 200);
		let graph: serde_json::Value = response_json(resp).await;
		assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);

		// Signals are not
		let signal = serde_json::json!({
			"from": "elsewhere/x",
			"to": "surface_train",
			"run_id": 1,
			"kind": "success",
		});
		let resp = app_request(&mut app, Method::POST, "/signal", false, signal.clone()).await;
		assert_eq!(resp.status(), 401);

		let resp = app_request(&mut app, Method::POST, "/signal", true, signal).await;
		assert_eq!(resp.status(), 200);

		// Unknown target node
		let resp = app_request(
			&mut app,
			Method::POST,
			"/signal",
			true,
			serde_json::json!({
				"from": "elsewhere/x",
				"to": "ghost",
				"run_id": 1,
				"kind": "success",
			}),
		)
		.await;
		assert_eq!(resp.status(), 404);

		// Handshake
		let resp = app_request(
			&mut app,
			Method::POST,
			"/connect",
			true,
			serde_json::json!({
				"predecessor_id": "other/up",
				"pipeline_id": "other",
				"run_id_space": "http://the-root/",
			}),
		)
		.await;
		assert_eq!(resp.status(), 200);
		let body: serde_json::Value = response_json(resp).await;
		assert_eq!(body["accepted"], serde_json::json!(true));
		assert_eq!(body["receiver_id"], serde_json::json!("root"));
	}

	//
	// MARK: Single-pipeline scenarios
	//

	/// Drop a file, watch the whole run happen.
	#[tokio::test]
	async fn filesystem_trigger_single_pipeline() {
		let data_dir = fresh_dir("test_s1_data");

		let config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0
			monitor_poll_ms = 50

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "s1_store"
			kind = "MetadataStore"

			[[node]]
			name = "s1_watch"
			kind = "FilesystemResource"
			trigger_threshold = 1
			params = {{ path = "{}" }}

			[[node]]
			name = "s1_train"
			kind = "Noop"
			predecessors = ["s1_watch"]
			"#,
			fresh_db("test_s1.sqlite"),
			data_dir.display(),
		))
		.unwrap();

		let pipeline = make_pipeline(&config, TEST_SECRET).await.unwrap();
		pipeline.setup_nodes().await.unwrap();
		pipeline.launch_nodes();
		let coordinator = {
			let pipeline = pipeline.clone();
			tokio::spawn(async move { pipeline.coordinate().await })
		};

		// The external change
		std::fs::write(data_dir.join("a.txt"), "hello").unwrap();

		// Exactly one run, and it finishes
		let store = pipeline.metadb.clone();
		wait_for("run 1 to end", || {
			let store = store.clone();
			async move {
				match store.get_run(RunId::from(1)).await.unwrap() {
					Some(run) => run.end_time.is_some(),
					None => false,
				}
			}
		})
		.await;
		assert!(store.get_run(RunId::from(2)).await.unwrap().is_none());

		// The artifact was consumed
		let old = store
			.list_entries(Some(ArtifactState::Old), Some(RunId::from(1)))
			.await
			.unwrap();
		assert_eq!(old.len(), 1);
		assert!(old[0].location.ends_with("a.txt"));
		assert_eq!(old[0].run_id, Some(RunId::from(1)));

		// The action executed, then completed
		let run = store.get_run(RunId::from(1)).await.unwrap().unwrap();
		let train_events: Vec<_> = run
			.events
			.iter()
			.filter(|e| e.node == "s1_train")
			.map(|e| e.status.as_str())
			.collect();
		let executing = train_events.iter().position(|s| *s == "EXECUTING").unwrap();
		let complete = train_events.iter().position(|s| *s == "COMPLETE").unwrap();
		assert!(executing < complete);

		// Topological order: the action started executing no earlier
		// than its predecessor finished cleanup
		let watch_cleanup = run
			.events
			.iter()
			.find(|e| e.node == "s1_watch" && e.status == "CLEANUP")
			.unwrap();
		let train_executing = run
			.events
			.iter()
			.find(|e| e.node == "s1_train" && e.status == "EXECUTING")
			.unwrap();
		assert!(train_executing.at >= watch_cleanup.at);

		pipeline.teardown().await;
		coordinator.await.unwrap().unwrap();
	}

	/// Metrics logged before launch trigger one run and get claimed.
	#[tokio::test]
	async fn metric_trigger() {
		let config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0
			monitor_poll_ms = 50

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "s3_store"
			kind = "MetadataStore"
			metric = {{ name = "x", threshold = 0.4 }}

			[[node]]
			name = "s3_train"
			kind = "Noop"
			"#,
			fresh_db("test_s3.sqlite"),
		))
		.unwrap();

		let pipeline = make_pipeline(&config, TEST_SECRET).await.unwrap();

		// Pre-run metrics
		let store = pipeline.metadb.clone();
		store.log_metric("x", 0.1).await.unwrap();
		store.log_metric("x", 0.2).await.unwrap();
		store.log_metric("x", 0.5).await.unwrap();

		pipeline.setup_nodes().await.unwrap();
		pipeline.launch_nodes();
		let coordinator = {
			let pipeline = pipeline.clone();
			tokio::spawn(async move { pipeline.coordinate().await })
		};

		wait_for("run 1 to end", || {
			let store = store.clone();
			async move {
				match store.get_run(RunId::from(1)).await.unwrap() {
					Some(run) => run.end_time.is_some(),
					None => false,
				}
			}
		})
		.await;

		// Metrics were claimed by the run; nothing left to trigger on
		assert!(store.get_metrics("x", None).await.unwrap().is_empty());
		assert_eq!(
			store.get_metrics("x", Some(RunId::from(1))).await.unwrap(),
			vec![0.1, 0.2, 0.5]
		);

		// And no second run starts
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert!(store.get_run(RunId::from(2)).await.unwrap().is_none());

		pipeline.teardown().await;
		coordinator.await.unwrap().unwrap();
	}

	/// A dead remote successor turns the emitting node ERROR, but the
	/// run still ends and nothing re-triggers.
	#[tokio::test]
	async fn remote_unreachable() {
		let data_dir = fresh_dir("test_s4_data");

		let config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0
			monitor_poll_ms = 50
			signal_retry_attempts = 2
			signal_retry_base_ms = 10

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "s4_store"
			kind = "MetadataStore"

			[[node]]
			name = "s4_watch"
			kind = "FilesystemResource"
			trigger_threshold = 1
			params = {{ path = "{}" }}

			[[node]]
			name = "s4_train"
			kind = "Noop"
			predecessors = ["s4_watch"]

			[[node.remote_successors]]
			url = "http://127.0.0.1:1/"
			node = "never"
			"#,
			fresh_db("test_s4.sqlite"),
			data_dir.display(),
		))
		.unwrap();

		let pipeline = make_pipeline(&config, TEST_SECRET).await.unwrap();
		pipeline.setup_nodes().await.unwrap();
		pipeline.launch_nodes();
		let coordinator = {
			let pipeline = pipeline.clone();
			tokio::spawn(async move { pipeline.coordinate().await })
		};

		std::fs::write(data_dir.join("a.txt"), "hello").unwrap();

		let store = pipeline.metadb.clone();
		wait_for("run 1 to end", || {
			let store = store.clone();
			async move {
				match store.get_run(RunId::from(1)).await.unwrap() {
					Some(run) => run.end_time.is_some(),
					None => false,
				}
			}
		})
		.await;

		// The emitter exhausted its budget and reported ERROR
		let run = store.get_run(RunId::from(1)).await.unwrap().unwrap();
		assert!(run
			.events
			.iter()
			.any(|e| e.node == "s4_train" && e.status == "ERROR"));

		// No second run until something else changes
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert!(store.get_run(RunId::from(2)).await.unwrap().is_none());

		pipeline.teardown().await;
		coordinator.await.unwrap().unwrap();
	}

	/// Artifacts move through the resource proxy: upload, then fetch.
	#[tokio::test]
	async fn resource_rpc_roundtrip() {
		let data_dir = fresh_dir("test_rpc_data");

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = format!("http://{}", listener.local_addr().unwrap());

		let config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0
			public_url = "{addr}"

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "rpc_store"
			kind = "MetadataStore"

			[[node]]
			name = "rpc_watch"
			kind = "FilesystemResource"
			params = {{ path = "{}" }}
			"#,
			fresh_db("test_rpc.sqlite"),
			data_dir.display(),
		))
		.unwrap();

		let pipeline = make_pipeline(&config, TEST_SECRET).await.unwrap();
		let app = api::router(RouterState {
			config: daemon_config(),
			pipeline: pipeline.clone(),
		});
		tokio::spawn(axum::serve(listener, app).into_future());

		let client =
			anacostia_connector::HttpResourceClient::new(addr.as_str(), TEST_SECRET, "rpc_watch")
				.unwrap();

		client.put("model/weights.bin", b"0123456789").await.unwrap();

		let on_disk = data_dir.join("model/weights.bin");
		assert_eq!(std::fs::read(&on_disk).unwrap(), b"0123456789");

		let fetched = client
			.fetch(&on_disk.canonicalize().unwrap().display().to_string())
			.await
			.unwrap();
		assert_eq!(fetched, b"0123456789");

		// Escaping the artifact root is refused
		assert!(client.put("../escape.bin", b"nope").await.is_err());
	}

	//
	// MARK: Two-pipeline chain
	//

	/// Root action signals a leaf action over a connector; the leaf
	/// node completes for the same run.
	#[tokio::test]
	async fn two_pipeline_chain() {
		let data_dir = fresh_dir("test_s2_data");

		// Bind both servers first: the configs need real ports
		let root_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let root_addr = format!("http://{}", root_listener.local_addr().unwrap());
		let leaf_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let leaf_addr = format!("http://{}", leaf_listener.local_addr().unwrap());

		let root_config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0
			public_url = "{root_addr}"
			monitor_poll_ms = 50

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "s2_store"
			kind = "MetadataStore"

			[[node]]
			name = "s2_watch"
			kind = "FilesystemResource"
			trigger_threshold = 1
			params = {{ path = "{}" }}

			[[node]]
			name = "s2_train"
			kind = "Noop"
			predecessors = ["s2_watch"]
			wait_for_connection = true

			[[node.remote_successors]]
			url = "{leaf_addr}"
			node = "s2_evaluate"
			"#,
			fresh_db("test_s2.sqlite"),
			data_dir.display(),
		))
		.unwrap();

		let leaf_config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "leaf"
			role = "leaf"
			host = "127.0.0.1"
			port = 0

			[metadata]
			store_url = "{root_addr}"

			[[node]]
			name = "s2_leaf_store"
			kind = "MetadataStore"

			[[node]]
			name = "s2_evaluate"
			kind = "Noop"
			remote_predecessors = ["root/s2_train"]
			"#,
		))
		.unwrap();

		let root = make_pipeline(&root_config, TEST_SECRET).await.unwrap();
		let leaf = make_pipeline(&leaf_config, TEST_SECRET).await.unwrap();

		// Serve both before any setup: the leaf's store RPCs against
		// the root, and the root's handshake targets the leaf.
		let root_app = api::router(RouterState {
			config: daemon_config(),
			pipeline: root.clone(),
		});
		let leaf_app = api::router(RouterState {
			config: daemon_config(),
			pipeline: leaf.clone(),
		});
		tokio::spawn(axum::serve(root_listener, root_app).into_future());
		tokio::spawn(axum::serve(leaf_listener, leaf_app).into_future());

		// Successor pipelines launch first
		leaf.setup_nodes().await.unwrap();
		leaf.launch_nodes();
		let leaf_coordinator = {
			let leaf = leaf.clone();
			tokio::spawn(async move { leaf.coordinate().await })
		};

		root.setup_nodes().await.unwrap();
		root.launch_nodes();
		let root_coordinator = {
			let root = root.clone();
			tokio::spawn(async move { root.coordinate().await })
		};

		// The external change, on the root
		std::fs::write(data_dir.join("a.txt"), "hello").unwrap();

		// The leaf action completes for run 1, recorded in the
		// root's store over RPC
		let store = root.metadb.clone();
		wait_for("leaf action to complete", || {
			let store = store.clone();
			async move {
				match store.get_run(RunId::from(1)).await.unwrap() {
					Some(run) => run
						.events
						.iter()
						.any(|e| e.node == "s2_evaluate" && e.status == "COMPLETE"),
					None => false,
				}
			}
		})
		.await;

		wait_for("run 1 to end", || {
			let store = store.clone();
			async move {
				match store.get_run(RunId::from(1)).await.unwrap() {
					Some(run) => run.end_time.is_some(),
					None => false,
				}
			}
		})
		.await;

		// Delivered exactly once: one terminal event, despite retries
		let run = store.get_run(RunId::from(1)).await.unwrap().unwrap();
		let completes = run
			.events
			.iter()
			.filter(|e| e.node == "s2_evaluate" && e.status == "COMPLETE")
			.count();
		assert_eq!(completes, 1);

		root.teardown().await;
		leaf.teardown().await;
		root_coordinator.await.unwrap().unwrap();
		leaf_coordinator.await.unwrap().unwrap();
	}

	/// Root -> leaf1 -> leaf2. One trigger walks the whole chain, in
	/// topological order.
	#[tokio::test]
	async fn three_pipeline_chain() {
		let data_dir = fresh_dir("test_s5_data");

		let root_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let root_addr = format!("http://{}", root_listener.local_addr().unwrap());
		let leaf1_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let leaf1_addr = format!("http://{}", leaf1_listener.local_addr().unwrap());
		let leaf2_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let leaf2_addr = format!("http://{}", leaf2_listener.local_addr().unwrap());

		let root_config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0
			public_url = "{root_addr}"
			monitor_poll_ms = 50

			[metadata]
			db_addr = "{}"

			[[node]]
			name = "s5_store"
			kind = "MetadataStore"

			[[node]]
			name = "s5_watch"
			kind = "FilesystemResource"
			trigger_threshold = 1
			params = {{ path = "{}" }}

			[[node]]
			name = "s5_train"
			kind = "Noop"
			predecessors = ["s5_watch"]
			wait_for_connection = true

			[[node.remote_successors]]
			url = "{leaf1_addr}"
			node = "s5_package"
			"#,
			fresh_db("test_s5.sqlite"),
			data_dir.display(),
		))
		.unwrap();

		let leaf1_config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "leaf1"
			role = "leaf"
			host = "127.0.0.1"
			port = 0

			[metadata]
			store_url = "{root_addr}"

			[[node]]
			name = "s5_leaf1_store"
			kind = "MetadataStore"

			[[node]]
			name = "s5_package"
			kind = "Noop"
			remote_predecessors = ["root/s5_train"]
			wait_for_connection = true

			[[node.remote_successors]]
			url = "{leaf2_addr}"
			node = "s5_deploy"
			"#,
		))
		.unwrap();

		let leaf2_config: PipelineConfig = toml::from_str(&format!(
			r#"
			[pipeline]
			id = "leaf2"
			role = "leaf"
			host = "127.0.0.1"
			port = 0

			[metadata]
			store_url = "{root_addr}"

			[[node]]
			name = "s5_leaf2_store"
			kind = "MetadataStore"

			[[node]]
			name = "s5_deploy"
			kind = "Noop"
			remote_predecessors = ["leaf1/s5_package"]
			"#,
		))
		.unwrap();

		let root = make_pipeline(&root_config, TEST_SECRET).await.unwrap();
		let leaf1 = make_pipeline(&leaf1_config, TEST_SECRET).await.unwrap();
		let leaf2 = make_pipeline(&leaf2_config, TEST_SECRET).await.unwrap();

		for (pipeline, listener) in [
			(root.clone(), root_listener),
			(leaf1.clone(), leaf1_listener),
			(leaf2.clone(), leaf2_listener),
		] {
			let app = api::router(RouterState {
				config: daemon_config(),
				pipeline,
			});
			tokio::spawn(axum::serve(listener, app).into_future());
		}

		// Launch from the end of the chain backwards, so every
		// wait_for_connection handshake has a live peer
		let mut coordinators = Vec::new();
		for pipeline in [leaf2.clone(), leaf1.clone(), root.clone()] {
			pipeline.setup_nodes().await.unwrap();
			pipeline.launch_nodes();
			let handle = {
				let pipeline = pipeline.clone();
				tokio::spawn(async move { pipeline.coordinate().await })
			};
			coordinators.push(handle);
		}

		std::fs::write(data_dir.join("a.txt"), "hello").unwrap();

		// The far end of the chain completes for run 1
		let store = root.metadb.clone();
		wait_for("the whole chain to complete", || {
			let store = store.clone();
			async move {
				match store.get_run(RunId::from(1)).await.unwrap() {
					Some(run) => run
						.events
						.iter()
						.any(|e| e.node == "s5_deploy" && e.status == "COMPLETE"),
					None => false,
				}
			}
		})
		.await;

		// Execution was topological across all three pipelines
		let run = store.get_run(RunId::from(1)).await.unwrap().unwrap();
		let event_at = |node: &str, status: &str| {
			run.events
				.iter()
				.find(|e| e.node == node && e.status == status)
				.unwrap_or_else(|| panic!("no {status} event for {node}"))
				.at
		};

		for node in ["s5_train", "s5_package", "s5_deploy"] {
			let _ = event_at(node, "COMPLETE");
		}
		assert!(event_at("s5_package", "EXECUTING") >= event_at("s5_train", "CLEANUP"));
		assert!(event_at("s5_deploy", "EXECUTING") >= event_at("s5_package", "CLEANUP"));

		root.teardown().await;
		leaf1.teardown().await;
		leaf2.teardown().await;
		for handle in coordinators {
			handle.await.unwrap().unwrap();
		}
	}
}
