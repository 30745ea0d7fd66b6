use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::types::{ProbeError, ProbeResult, SlotProbe};

/// HTTP client for the container-side control API.
pub struct HttpProbe {
    http: reqwest::Client,
    control_port: String,
    retries: u32,
    cooldown: Duration,
}

impl HttpProbe {
    /// `timeout` applies per attempt; `retries`/`cooldown` bound the
    /// re-attempts of `reserve` when called with `retry`.
    pub fn new(
        control_port: &str,
        timeout: Duration,
        retries: u32,
        cooldown: Duration,
    ) -> ProbeResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpProbe {
            http,
            control_port: control_port.to_string(),
            retries,
            cooldown,
        })
    }

    fn reservation_url(&self, address: &str, request_id: &str) -> String {
        format!(
            "http://{}:{}/reservation/{}",
            address, self.control_port, request_id
        )
    }
}

#[async_trait]
impl SlotProbe for HttpProbe {
    async fn reserve(&self, address: &str, request_id: &str, retry: bool) -> ProbeResult<bool> {
        let url = self.reservation_url(address, request_id);

        let mut attempt = 0;
        loop {
            match self.http.post(&url).send().await {
                Ok(response) => return Ok(response.status() == StatusCode::OK),
                Err(err) => {
                    attempt += 1;
                    if !retry || attempt > self.retries {
                        return Err(err.into());
                    }
                    debug!(attempt, error = %err, "reservation attempt failed, retrying");
                    tokio::time::sleep(self.cooldown).await;
                }
            }
        }
    }

    async fn verify(&self, address: &str, request_id: &str) -> ProbeResult<bool> {
        let url = self.reservation_url(address, request_id);
        let response = self.http.get(&url).send().await?;
        Ok(response.status() == StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    fn probe(port: u16, retries: u32) -> HttpProbe {
        HttpProbe::new(
            &port.to_string(),
            Duration::from_secs(5),
            retries,
            Duration::from_millis(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn reserve_reports_acceptance() {
        let router = Router::new().route(
            "/reservation/{id}",
            post(|| async { StatusCode::OK }),
        );
        let port = serve(router).await;

        let reserved = probe(port, 0).reserve("127.0.0.1", "r1", false).await.unwrap();
        assert!(reserved);
    }

    #[tokio::test]
    async fn non_200_is_a_refusal_not_an_error() {
        let router = Router::new().route(
            "/reservation/{id}",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let port = serve(router).await;

        let reserved = probe(port, 3).reserve("127.0.0.1", "r1", true).await.unwrap();
        assert!(!reserved);
    }

    #[tokio::test]
    async fn verify_uses_get() {
        let router = Router::new().route(
            "/reservation/{id}",
            get(|| async { StatusCode::OK }).post(|| async { StatusCode::NOT_FOUND }),
        );
        let port = serve(router).await;

        let held = probe(port, 0).verify("127.0.0.1", "r1").await.unwrap();
        assert!(held);
    }

    #[tokio::test]
    async fn transport_error_without_retry_surfaces_immediately() {
        // Bind and drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe(port, 3).reserve("127.0.0.1", "r1", false).await;
        assert!(matches!(result, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn retry_survives_a_dropped_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            // First connection closed unanswered, as a container still
            // starting up would.
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 1024];
            let _ = socket.read(&mut buffer).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await;
        });

        let reserved = probe(port, 3).reserve("127.0.0.1", "r1", true).await.unwrap();
        assert!(reserved);
    }
}
