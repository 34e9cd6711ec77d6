//! Workbench provider client
//!
//! HTTP client for the Spec & Validation Provider: the service that lists the
//! available models, returns each model's argument specification and
//! validates argument maps.
//!
//! The client makes one request per call and never retries. A failed call is
//! surfaced to the caller as-is.
//!
//! # Example
//!
//! ```no_run
//! use workbench_client::{ProviderClient, SpecProvider};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ProviderClient::new("http://localhost:56789/api");
//!     let spec = client.get_spec("carbon").await?;
//!     println!("{} takes {} arguments", spec.model_name, spec.args.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod provider;

pub use error::{ClientError, Result};
pub use provider::SpecProvider;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Spec & Validation Provider
#[derive(Debug, Clone)]
pub struct ProviderClient {
    /// Base URL of the provider (e.g., "http://localhost:56789/api")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ProviderClient {
    /// Create a new provider client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the provider API
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new provider client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the provider API
    /// * `client` - A configured reqwest Client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the provider
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Checks the status of `endpoint`'s response and decodes its JSON body
    async fn handle_response<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Rejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| ClientError::UnexpectedReply {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}
