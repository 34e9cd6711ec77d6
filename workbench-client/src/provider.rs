//! Spec & Validation Provider endpoints

use async_trait::async_trait;
use tracing::debug;
use workbench_core::domain::args::ArgsValues;
use workbench_core::dto::spec::{ModelListing, ModelSpec};
use workbench_core::dto::validation::{ValidationIssue, ValidationRequest};

use crate::ProviderClient;
use crate::error::{ClientError, Result};

const MODELS: &str = "models";
const GET_SPEC: &str = "getspec";
const VALIDATE: &str = "validate";

/// Source of model specifications and argument validation
///
/// Every call is a single asynchronous request; implementations do not retry.
#[async_trait]
pub trait SpecProvider: Send + Sync {
    /// Lists the available models, keyed by display name
    async fn list_models(&self) -> Result<ModelListing>;

    /// Fetches the argument specification of one model
    ///
    /// # Arguments
    /// * `model_run_name` - The model's internal run name (e.g. "carbon")
    async fn get_spec(&self, model_run_name: &str) -> Result<ModelSpec>;

    /// Validates an argument map
    ///
    /// # Arguments
    /// * `model_module` - The module named in the model's spec
    /// * `args` - The full argument map
    ///
    /// # Returns
    /// One entry per problem; an empty list means every argument is valid
    async fn validate(&self, model_module: &str, args: &ArgsValues) -> Result<Vec<ValidationIssue>>;
}

#[async_trait]
impl SpecProvider for ProviderClient {
    async fn list_models(&self) -> Result<ModelListing> {
        let response = self.client.get(self.url(MODELS)).send().await?;

        self.handle_response(MODELS, response).await
    }

    async fn get_spec(&self, model_run_name: &str) -> Result<ModelSpec> {
        debug!("Fetching spec for model {}", model_run_name);
        let response = self
            .client
            .post(self.url(GET_SPEC))
            .json(&model_run_name)
            .send()
            .await?;

        self.handle_response(GET_SPEC, response).await
    }

    async fn validate(&self, model_module: &str, args: &ArgsValues) -> Result<Vec<ValidationIssue>> {
        let args = serde_json::to_string(args).map_err(ClientError::EncodeArgs)?;
        let request = ValidationRequest {
            model_module: model_module.to_string(),
            args,
        };

        let response = self
            .client
            .post(self.url(VALIDATE))
            .json(&request)
            .send()
            .await?;

        let issues: Vec<ValidationIssue> = self.handle_response(VALIDATE, response).await?;
        debug!(
            "Provider reported {} validation issue(s) for {}",
            issues.len(),
            model_module
        );
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use workbench_core::domain::args::ArgValue;

    /// Serves one canned response and hands back the raw request it received
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{}/api", addr), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn test_list_models() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"Carbon Storage and Sequestration": {"internal_name": "carbon", "aliases": []}}"#,
        )
        .await;
        let client = ProviderClient::new(url);

        let models = client.list_models().await.unwrap();
        assert_eq!(models["Carbon Storage and Sequestration"].internal_name, "carbon");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/models "));
    }

    #[tokio::test]
    async fn test_validate_sends_args_as_string() {
        let (url, server) = serve_once("200 OK", r#"[[["workspace_dir"], "is a required key"]]"#).await;
        let client = ProviderClient::new(url);

        let mut args = ArgsValues::new();
        args.insert("workspace_dir".into(), ArgValue::from(""));
        let issues = client
            .validate("natcap.invest.carbon", &args)
            .await
            .unwrap();

        assert_eq!(
            issues,
            vec![ValidationIssue::new(["workspace_dir"], "is a required key")]
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/validate "));
        assert!(request.contains(r#""model_module":"natcap.invest.carbon""#));
        assert!(request.contains(r#""args":"{\"workspace_dir\":\"\"}""#));
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let (url, server) = serve_once("500 Internal Server Error", r#""model not found""#).await;
        let client = ProviderClient::new(url);

        let err = client.get_spec("nope").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 500, .. }));
        assert!(!err.is_unknown_model());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/getspec "));
    }

    #[tokio::test]
    async fn test_unparseable_body() {
        let (url, _server) = serve_once("200 OK", "not json").await;
        let client = ProviderClient::new(url);

        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedReply { ref endpoint, .. } if endpoint == "models"));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let (url, _server) = serve_once("404 Not Found", r#""no model named nope""#).await;
        let client = ProviderClient::new(url);

        let err = client.get_spec("nope").await.unwrap_err();
        assert!(err.is_unknown_model());
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ProviderClient::new(format!("http://{}/api", addr));
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable(_)));
    }
}
