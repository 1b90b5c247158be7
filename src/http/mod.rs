use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

pub mod cookie;
pub mod error;
pub mod headers;
pub mod message;
pub mod parser;
pub mod request;
pub mod response;
pub mod status;
pub mod stream;
pub mod upload;
pub mod uri;
pub mod validator;

use error::{HttpError, Result};

/// Flat gateway variable set (`HTTP_HOST`, `REQUEST_URI`, ...) a request is
/// ingested from.
pub type Environment = IndexMap<String, String>;

/// Protocol versions a message may carry.
/// The default for new messages is given in the config (see [`protocol_version`](crate::config::HttpConfig::protocol_version))
#[derive(PartialEq, Eq, PartialOrd, Debug, Clone, Copy, Default, Deserialize)]
pub enum HttpVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[default]
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "2.0")]
    V2_0,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::V1_0 => "1.0",
            HttpVersion::V1_1 => "1.1",
            HttpVersion::V2_0 => "2.0",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.0" => Ok(HttpVersion::V1_0),
            "1.1" => Ok(HttpVersion::V1_1),
            "2.0" => Ok(HttpVersion::V2_0),
            _ => Err(HttpError::invalid(format!(
                "invalid HTTP version `{s}`, must be one of: `1.0`, `1.1`, `2.0`"
            ))),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum HttpMethod {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    Link,
    Unlink,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Link => "LINK",
            HttpMethod::Unlink => "UNLINK",
        }
    }
}

/// Case-insensitive lookup, `None` for anything outside the supported set.
pub fn http_method_from_str(method: &str) -> Option<HttpMethod> {
    match method.to_ascii_uppercase().as_str() {
        "CONNECT" => Some(HttpMethod::Connect),
        "DELETE" => Some(HttpMethod::Delete),
        "GET" => Some(HttpMethod::Get),
        "HEAD" => Some(HttpMethod::Head),
        "OPTIONS" => Some(HttpMethod::Options),
        "PATCH" => Some(HttpMethod::Patch),
        "POST" => Some(HttpMethod::Post),
        "PUT" => Some(HttpMethod::Put),
        "TRACE" => Some(HttpMethod::Trace),
        "LINK" => Some(HttpMethod::Link),
        "UNLINK" => Some(HttpMethod::Unlink),
        _ => None,
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!("1.0".parse::<HttpVersion>().unwrap(), HttpVersion::V1_0);
        assert_eq!("2.0".parse::<HttpVersion>().unwrap(), HttpVersion::V2_0);
        assert!("3.0".parse::<HttpVersion>().unwrap_err().is_invalid_argument());
        assert!("HTTP/1.1".parse::<HttpVersion>().is_err());
        assert_eq!(HttpVersion::default().to_string(), "1.1");
    }

    #[test]
    fn method_lookup_is_case_insensitive() {
        assert_eq!(http_method_from_str("post"), Some(HttpMethod::Post));
        assert_eq!(http_method_from_str("Unlink"), Some(HttpMethod::Unlink));
        assert_eq!(http_method_from_str("BREW"), None);
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }
}
