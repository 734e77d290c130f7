use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use axum::{Router, extract::State, routing::get};
use tracing::info;

use crate::SharedMetrics;

/// Where the `/metrics` endpoint listens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsServerConfig {
    pub address: IpAddr,
    pub port: u16,
}

impl MetricsServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

async fn prometheus_metrics_handler(State(metrics): State<SharedMetrics>) -> String {
    metrics.gather()
}

pub fn router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics_handler))
        .with_state(metrics)
}

/// Serves the archiver metrics until the listener fails.
pub async fn run_metrics_server(config: MetricsServerConfig, metrics: SharedMetrics) -> Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics server on {addr}"))?;
    info!(%addr, "Metrics server listening");

    axum::serve(listener, router(metrics))
        .await
        .context("metrics server stopped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metrics;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_socket_addr() {
        let config = MetricsServerConfig {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9464,
        };
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9464");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_registry() {
        let metrics = Arc::new(Metrics::new());
        metrics.set_tip_height(7);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(metrics)).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("archiver_tip_height 7"));
    }
}
