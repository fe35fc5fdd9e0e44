//! HTTP session seam between flows and the network

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE};
use tracing::debug;

use crate::config::TargetConfig;
use crate::error::{LoadTestError, Result, TransportError};
use crate::session::SessionBundle;

/// Response body, parsed as JSON when possible
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    /// Best-effort parse: JSON first, raw text otherwise
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Short prefix of the body for log lines
    pub fn snippet(&self, max_chars: usize) -> String {
        let full = match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        };
        full.chars().take(max_chars).collect()
    }
}

/// Response to a single API call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Status in the 2xx range
    pub ok: bool,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            ok: (200..300).contains(&status),
            body,
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status, ResponseBody::Json(value))
    }
}

/// Request context owned by one flow
///
/// Dropping the session releases whatever it holds (connection pool,
/// cookies), so flows release it on every exit path just by returning.
#[async_trait]
pub trait ApiSession: Send + Sync {
    async fn get(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> std::result::Result<ApiResponse, TransportError>;
}

/// Opens a fresh request context for each flow
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self, user_id: u64) -> Result<Box<dyn ApiSession>>;
}

/// Join base URL and endpoint with exactly one `/`
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Opens reqwest-backed sessions carrying the bundle cookies and API token
pub struct HttpSessionProvider {
    target: Arc<TargetConfig>,
}

impl HttpSessionProvider {
    pub fn new(target: TargetConfig) -> Self {
        Self {
            target: Arc::new(target),
        }
    }

    fn default_headers(&self, bundle: &SessionBundle) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let token = HeaderValue::from_str(&format!("Token {}", self.target.api_token))
            .map_err(|e| LoadTestError::config(format!("invalid API token: {}", e)))?;
        headers.insert(AUTHORIZATION, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-requested-with",
            HeaderValue::from_static("XMLHttpRequest"),
        );

        if let Some(cookies) = bundle.cookie_header() {
            let value = HeaderValue::from_str(&cookies).map_err(|e| LoadTestError::Session {
                path: self.target.session_bundle.clone(),
                reason: format!("cookie not usable as header: {}", e),
            })?;
            headers.insert(COOKIE, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn open(&self, user_id: u64) -> Result<Box<dyn ApiSession>> {
        let bundle = SessionBundle::load(&self.target.session_bundle).await?;
        let headers = self.default_headers(&bundle)?;

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(self.target.accept_invalid_certs)
            .timeout(Duration::from_secs(self.target.request_timeout_secs))
            .build()?;

        debug!(
            "[User {}] Session opened with {} cookies",
            user_id,
            bundle.cookies.len()
        );

        Ok(Box::new(HttpSession {
            client,
            base_url: self.target.base_url.clone(),
        }))
    }
}

/// One flow's HTTP client
pub struct HttpSession {
    client: reqwest::Client,
    base_url: String,
}

#[async_trait]
impl ApiSession for HttpSession {
    async fn get(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> std::result::Result<ApiResponse, TransportError> {
        let url = join_url(&self.base_url, endpoint);
        let timeout_ms = timeout.as_millis() as u64;
        let classify = |e: reqwest::Error| TransportError::from_reqwest(endpoint, timeout_ms, &e);

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let raw = response.text().await.map_err(classify)?;

        Ok(ApiResponse::new(status, ResponseBody::parse(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://ctf.example.org/", "/api/v1/users"),
            "https://ctf.example.org/api/v1/users"
        );
        assert_eq!(
            join_url("https://ctf.example.org", "api/v1/users"),
            "https://ctf.example.org/api/v1/users"
        );
    }

    #[test]
    fn test_body_parse() {
        let body = ResponseBody::parse(r#"{"success": true, "data": []}"#.to_string());
        assert_eq!(body.as_json(), Some(&json!({"success": true, "data": []})));

        let body = ResponseBody::parse("<html>Forbidden</html>".to_string());
        assert!(body.as_json().is_none());
        assert_eq!(body.snippet(6), "<html>");
    }

    #[test]
    fn test_response_ok_flag() {
        assert!(ApiResponse::json(200, json!({})).ok);
        assert!(ApiResponse::json(204, json!(null)).ok);
        assert!(!ApiResponse::json(302, json!(null)).ok);
        assert!(!ApiResponse::json(500, json!(null)).ok);
    }

    #[test]
    fn test_default_headers() {
        let provider = HttpSessionProvider::new(TargetConfig {
            api_token: "ctfd_abc".to_string(),
            ..Default::default()
        });
        let bundle = SessionBundle::parse(
            r#"{"cookies": [{"name": "session", "value": "s1", "domain": "x"}]}"#,
        )
        .unwrap();

        let headers = provider.default_headers(&bundle).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Token ctfd_abc");
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers[COOKIE], "session=s1");
    }

    #[tokio::test]
    async fn test_open_fails_without_bundle() {
        let provider = HttpSessionProvider::new(TargetConfig {
            base_url: "https://ctf.example.org".to_string(),
            api_token: "ctfd_abc".to_string(),
            session_bundle: "/nonexistent/auth.json".into(),
            ..Default::default()
        });

        assert!(matches!(
            provider.open(1).await,
            Err(LoadTestError::Session { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_with_bundle() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"cookies": [], "origins": []}"#).unwrap();

        let provider = HttpSessionProvider::new(TargetConfig {
            base_url: "https://ctf.example.org".to_string(),
            api_token: "ctfd_abc".to_string(),
            session_bundle: file.path().to_path_buf(),
            ..Default::default()
        });

        assert!(provider.open(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let session = HttpSession {
            client: reqwest::Client::new(),
            base_url: "http://127.0.0.1:1".to_string(),
        };

        let err = session
            .get("/api/v1/users", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        ));
    }
}
