use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::http::HttpVersion;
use crate::http::error::{HttpError, Result};

static CONFIG: OnceCell<HttpConfig> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Version used when a request environment carries no usable
    /// `SERVER_PROTOCOL`, and by new responses.
    pub protocol_version: HttpVersion,

    pub method_override_header: String,
    pub method_override_field: String,

    /// URL-decode names and values of incoming `Cookie` headers.
    pub decode_cookies: bool,

    pub upload_buffer_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            protocol_version: HttpVersion::V1_1,

            method_override_header: "X-Http-Method-Override".to_string(),
            method_override_field: "_METHOD".to_string(),

            decode_cookies: false,

            upload_buffer_size: 1024,
        }
    }
}

impl HttpConfig {
    pub fn from_file(path: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path, error = %err, "Fail to read config, falling back to defaults");
                return HttpConfig::default();
            }
        };

        Self::from_toml(&content).unwrap_or_else(|err| {
            tracing::warn!(path, error = %err, "Fail to deserialize config, falling back to defaults");
            HttpConfig::default()
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<HttpConfig>(content)
            .map_err(|err| HttpError::invalid(format!("malformed config: {err}")))
    }
}

pub fn set_config(cfg: HttpConfig) -> Result<()> {
    CONFIG
        .set(cfg)
        .map_err(|_| HttpError::runtime("config already set"))
}

/// Process-wide configuration, defaults unless [`set_config`] ran first.
pub fn config() -> &'static HttpConfig {
    CONFIG.get_or_init(HttpConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = HttpConfig::from_toml(
            r#"
            protocol_version = "2.0"
            decode_cookies = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.protocol_version, HttpVersion::V2_0);
        assert!(cfg.decode_cookies);
        assert_eq!(cfg.method_override_field, "_METHOD");
        assert_eq!(cfg.upload_buffer_size, 1024);
    }

    #[test]
    fn bad_version_is_rejected() {
        let err = HttpConfig::from_toml(r#"protocol_version = "0.9""#).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = HttpConfig::from_file("/nonexistent/httpmsg.toml");
        assert_eq!(cfg.method_override_header, "X-Http-Method-Override");
    }
}
