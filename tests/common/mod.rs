//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use worker_api::{ApiServer, ServerError};

/// A live server on an ephemeral loopback port.
pub struct TestServer {
    pub server: Arc<ApiServer>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start `server` in the background and wait until its listener is bound.
pub async fn spawn_server(server: ApiServer) -> TestServer {
    let server = Arc::new(server);
    let runner = Arc::clone(&server);
    let handle = tokio::spawn(async move { runner.run().await });

    for _ in 0..100 {
        if let Some(addr) = server.local_addr() {
            return TestServer { server, addr, handle };
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not bind within one second");
}

/// A client that never reuses connections.
#[allow(dead_code)]
pub fn fresh_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
