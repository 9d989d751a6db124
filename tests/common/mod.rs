//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use echo_server::config::ServerConfig;
use echo_server::{HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A running echo server bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server with `config` on 127.0.0.1:0.
pub async fn start_server(mut config: ServerConfig) -> TestServer {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Give the accept loop a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, shutdown }
}

/// A client that never reuses connections or goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
