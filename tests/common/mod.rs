//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a full [`AppContext`] around a
//! [`ScriptedEngine`] and a temporary downloads directory. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mg_core::config::Config;
use mg_core::JobSnapshot;
use mg_engine::testing::ScriptedEngine;
use mg_engine::ToolRegistry;
use mg_server::context::AppContext;
use mg_server::router::build_router;
use tempfile::TempDir;

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub engine: Arc<ScriptedEngine>,
    downloads: TempDir,
}

impl TestHarness {
    /// Default configuration and a default scripted engine.
    pub fn new() -> Self {
        Self::with_engine(ScriptedEngine::new())
    }

    pub fn with_engine(engine: ScriptedEngine) -> Self {
        Self::build(test_config(), engine)
    }

    /// Build from `config`; the downloads directory is always replaced by a
    /// fresh temporary one.
    pub fn build(mut config: Config, engine: ScriptedEngine) -> Self {
        let downloads = tempfile::tempdir().expect("failed to create downloads dir");
        config.downloads.dir = downloads.path().to_path_buf();

        let engine = Arc::new(engine);
        let ctx = AppContext::new(config, engine.clone(), Arc::new(ToolRegistry::default()));

        Self {
            ctx,
            engine,
            downloads,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Serve this harness on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone(), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    pub fn downloads_dir(&self) -> &std::path::Path {
        self.downloads.path()
    }

    /// Poll the registry until job `id` is terminal.
    pub async fn wait_terminal(&self, id: &str) -> JobSnapshot {
        for _ in 0..500 {
            let cell = self.ctx.registry.cell(id).expect("unknown job");
            let snapshot = cell.snapshot();
            if snapshot.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal state");
    }
}

/// Defaults with a fast observation interval.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.static_dir = None;
    config.workers.progress_interval_ms = 50;
    config
}

/// POST a download request and return the task id.
pub async fn start_download(addr: SocketAddr, body: serde_json::Value) -> String {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/download"))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    json["task_id"].as_str().expect("missing task_id").to_string()
}
