//! HTTP tag provider for a gateway's web API.
//!
//! Imports are posted as raw tag JSON to the import endpoint with
//! `provider`, `path`, `type=json` and `collisionPolicy` query parameters.
//! Removals post `{"paths": ["[provider]path", ...]}` to the delete endpoint.
//! Either endpoint may answer with an array of quality names (`"Good"`,
//! `"Bad_NotFound"`, ...) or with a bare success status.

use crate::path::{CollisionPolicy, QualityCode, TagPath};
use crate::provider::{ProviderError, TagProvider};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Header carrying the gateway API token.
pub const API_TOKEN_HEADER: &str = "X-Ignition-API-Token";

/// HTTP provider configuration.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Gateway base URL (e.g., <http://localhost:8088>)
    pub base_url: String,
    /// Provider name on the gateway
    pub provider: String,
    /// Path of the import endpoint
    pub import_endpoint: String,
    /// Path of the delete endpoint
    pub remove_endpoint: String,
    /// Optional API token
    pub api_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8088".to_string(),
            provider: "default".to_string(),
            import_endpoint: "/data/api/v1/tags/import".to_string(),
            remove_endpoint: "/data/api/v1/tags/delete".to_string(),
            api_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tag provider backed by the gateway's HTTP API.
pub struct HttpTagProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpTagProvider {
    /// Create a new HTTP provider.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.header(API_TOKEN_HEADER, token),
            None => request,
        }
    }

    fn provider_for<'a>(&'a self, path: &'a TagPath) -> &'a str {
        if path.provider.is_empty() {
            &self.config.provider
        } else {
            &path.provider
        }
    }

    async fn qualities(response: Response, expected: usize) -> Result<Vec<QualityCode>, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        parse_qualities(&body, expected)
    }
}

impl TagProvider for HttpTagProvider {
    fn name(&self) -> &str {
        &self.config.provider
    }

    async fn import_tags(
        &self,
        base: &TagPath,
        json: &str,
        policy: CollisionPolicy,
    ) -> Result<Vec<QualityCode>, ProviderError> {
        let url = self.url(&self.config.import_endpoint);
        let expected = match serde_json::from_str::<Value>(json) {
            Ok(Value::Array(items)) => items.len(),
            _ => 1,
        };

        tracing::debug!(url, base = %base, policy = policy.code(), "POST tag import");

        let request = self
            .client
            .post(&url)
            .query(&[
                ("provider", self.provider_for(base)),
                ("path", base.path.as_str()),
                ("type", "json"),
                ("collisionPolicy", policy.code()),
            ])
            .header("Content-Type", "application/json")
            .body(json.to_string());

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Self::qualities(response, expected).await
    }

    async fn remove_tag_configs(&self, paths: &[TagPath]) -> Result<Vec<QualityCode>, ProviderError> {
        let url = self.url(&self.config.remove_endpoint);
        let qualified: Vec<String> = paths
            .iter()
            .map(|p| TagPath::new(self.provider_for(p), p.path.clone()).to_string())
            .collect();

        tracing::debug!(url, paths = ?qualified, "POST tag delete");

        let request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "paths": qualified }));

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Self::qualities(response, paths.len()).await
    }
}

/// Interpret a successful response body.
fn parse_qualities(body: &str, expected: usize) -> Result<Vec<QualityCode>, ProviderError> {
    if body.trim().is_empty() {
        return Ok(vec![QualityCode::Good; expected]);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items.iter().map(quality_of).collect()),
        _ => Ok(vec![QualityCode::Good; expected]),
    }
}

fn quality_of(item: &Value) -> QualityCode {
    let name = match item {
        Value::String(name) => Some(name.as_str()),
        Value::Object(map) => map.get("quality").and_then(Value::as_str),
        _ => None,
    };
    name.map_or_else(
        || QualityCode::Bad(format!("unrecognized quality: {item}")),
        QualityCode::from_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    #[test]
    fn config_default() {
        let config = HttpProviderConfig::default();
        assert_eq!(config.base_url, "http://localhost:8088");
        assert_eq!(config.provider, "default");
        assert!(config.api_token.is_none());
    }

    #[test]
    fn url_joins_without_double_slash() {
        let provider = HttpTagProvider::new(HttpProviderConfig {
            base_url: "http://gw:8088/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            provider.url("/data/api/v1/tags/import"),
            "http://gw:8088/data/api/v1/tags/import"
        );
    }

    #[test]
    fn provider_name_falls_back_to_config() {
        let provider = HttpTagProvider::new(HttpProviderConfig::default()).unwrap();
        let bare = TagPath::new("", "_types_");
        let edge = TagPath::new("edge", "_types_");
        assert_eq!(provider.provider_for(&bare), "default");
        assert_eq!(provider.provider_for(&edge), "edge");
    }

    /// Accept one connection, answer it, and return the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (format!("http://{addr}"), server)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn provider(base_url: String) -> HttpTagProvider {
        HttpTagProvider::new(HttpProviderConfig {
            base_url,
            api_token: Some("secret".to_string()),
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn import_posts_json_with_query_and_token() {
        let (base_url, server) = serve_once("200 OK", r#"["Good"]"#).await;
        let json = r#"{"name": "Tank", "tagType": "UdtType"}"#;

        let results = provider(base_url)
            .import_tags(&TagPath::new("", "_types_"), json, CollisionPolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(results, [QualityCode::Good]);

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("POST /data/api/v1/tags/import?"), "{request_line}");
        for param in ["provider=default", "path=_types_", "type=json", "collisionPolicy=o"] {
            assert!(request_line.contains(param), "{param} missing from {request_line}");
        }

        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("x-ignition-api-token: secret"));
        assert!(lower.contains("content-type: application/json"));
        assert!(request.ends_with(json));
    }

    #[tokio::test]
    async fn remove_posts_qualified_paths() {
        let (base_url, server) = serve_once("200 OK", "").await;

        let results = provider(base_url)
            .remove_tag_configs(&[TagPath::new("", "_types_/A")])
            .await
            .unwrap();
        assert_eq!(results, [QualityCode::Good]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /data/api/v1/tags/delete HTTP/1.1"));
        assert!(request
            .to_ascii_lowercase()
            .contains("x-ignition-api-token: secret"));
        assert!(request.ends_with(r#"{"paths":["[default]_types_/A"]}"#));
    }

    #[tokio::test]
    async fn error_status_is_an_api_error() {
        let (base_url, server) = serve_once("500 Internal Server Error", "boom").await;

        let err = provider(base_url)
            .import_tags(&TagPath::new("", "_types_"), r#"{"name": "A"}"#, CollisionPolicy::Overwrite)
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn qualities_from_body() {
        assert_eq!(
            parse_qualities("", 2).unwrap(),
            [QualityCode::Good, QualityCode::Good]
        );
        assert_eq!(
            parse_qualities(r#"{"ok": true}"#, 1).unwrap(),
            [QualityCode::Good]
        );
        assert_eq!(
            parse_qualities(r#"["Good", {"quality": "Bad_NotFound"}, 3]"#, 3).unwrap(),
            [
                QualityCode::Good,
                QualityCode::Bad("Bad_NotFound".to_string()),
                QualityCode::Bad("unrecognized quality: 3".to_string()),
            ]
        );
        assert!(matches!(
            parse_qualities("<html>", 1),
            Err(ProviderError::Parse(_))
        ));
    }
}
