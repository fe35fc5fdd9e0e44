//! Pre-captured session bundle
//!
//! The bundle is browser storage-state JSON written by an out-of-band login
//! step. Flows only read it; nothing here logs in or refreshes cookies.

use crate::error::{LoadTestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Storage state captured after an interactive login
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionBundle {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,

    /// Per-origin local storage; carried through but unused for API calls
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl SessionBundle {
    /// Read and parse a bundle from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoadTestError::Session {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Self::parse(&content).map_err(|e| match e {
            LoadTestError::Session { reason, .. } => LoadTestError::Session {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| LoadTestError::Session {
            path: Default::default(),
            reason: e.to_string(),
        })
    }

    /// `Cookie` header value, or `None` when the bundle holds no cookies
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        let header = self
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BUNDLE: &str = r#"{
        "cookies": [
            {"name": "session", "value": "abc.def", "domain": "ctf.example.org",
             "path": "/", "expires": -1, "httpOnly": true, "secure": false, "sameSite": "Lax"},
            {"name": "csrf", "value": "xyz", "domain": "ctf.example.org"}
        ],
        "origins": []
    }"#;

    #[test]
    fn test_parse_storage_state() {
        let bundle = SessionBundle::parse(BUNDLE).unwrap();
        assert_eq!(bundle.cookies.len(), 2);
        assert!(bundle.cookies[0].http_only);
        assert_eq!(bundle.cookies[1].path, "/");
        assert_eq!(
            bundle.cookie_header().as_deref(),
            Some("session=abc.def; csrf=xyz")
        );
    }

    #[test]
    fn test_empty_bundle_has_no_cookie_header() {
        let bundle = SessionBundle::parse("{}").unwrap();
        assert!(bundle.cookie_header().is_none());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            SessionBundle::parse("not json"),
            Err(LoadTestError::Session { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BUNDLE.as_bytes()).unwrap();

        let bundle = SessionBundle::load(file.path()).await.unwrap();
        assert_eq!(bundle.cookies[0].name, "session");
    }

    #[tokio::test]
    async fn test_load_missing_file_names_path() {
        let err = SessionBundle::load(Path::new("/nonexistent/auth.json"))
            .await
            .unwrap_err();
        match err {
            LoadTestError::Session { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/auth.json"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
