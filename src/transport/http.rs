//! Direct HTTP transport used for live calls while recording

use std::time::Duration;

use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::{Body, Transport};
use crate::config::TransportConfig;
use crate::error::BoxError;
use crate::{Result, TapedeckError};

/// Pooled HTTP client forwarding requests to the network
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
}

impl HttpTransport {
    /// Create a new HTTP transport with default pool settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&TransportConfig::default())
    }

    /// Create a new HTTP transport from configuration
    #[must_use]
    pub fn with_config(config: &TransportConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build_http();

        Self { client }
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        debug!("Forwarding {} {}", request.method(), request.uri());

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Request failed: {e}");
            TapedeckError::Transport(Box::new(e))
        })?;

        Ok(response.map(|body| body.map_err(|e| Box::new(e) as BoxError).boxed_unsync()))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>> {
        Box::pin(self.send(request))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}
