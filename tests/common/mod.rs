//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use paes_resilience::health::probe::{ProbeError, ResourceProbe};
use paes_resilience::navigation::store::MemoryStore;
use paes_resilience::{ResilienceContext, ServiceConfig};

pub const API_KEY: &str = "test-admin-key";

/// Start a programmable mock backend on an ephemeral port.
///
/// Each connection gets the status returned by `f` and an empty body.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let status = f().await;
                        let reason = match status {
                            200 => "OK",
                            204 => "No Content",
                            404 => "Not Found",
                            500 => "Internal Server Error",
                            503 => "Service Unavailable",
                            _ => "Unknown",
                        };
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status, reason
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Probe answering every URL with a fixed status, without touching the network.
#[allow(dead_code)]
pub struct StaticProbe(pub Result<u16, ProbeError>);

#[async_trait::async_trait]
impl ResourceProbe for StaticProbe {
    async fn probe(&self, _url: &str) -> Result<u16, ProbeError> {
        self.0.clone()
    }
}

/// Context with in-memory collaborators and a known admin key.
#[allow(dead_code)]
pub fn test_context(probe: StaticProbe) -> Arc<ResilienceContext> {
    let mut config = ServiceConfig::default();
    config.admin.api_key = API_KEY.to_string();
    config.logging.capture_panics = false;
    let ctx = ResilienceContext::new(config, Arc::new(probe), Arc::new(MemoryStore::new()));
    ctx.initialize();
    ctx
}
