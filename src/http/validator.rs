use crate::http::error::{HttpError, Result};
use crate::http::{HttpMethod, HttpVersion, http_method_from_str};

/// Characters PHP-style cookie names may never contain.
const COOKIE_NAME_FORBIDDEN: &[char] = &['=', ',', ';', ' ', '\t', '\r', '\n', '\u{0b}', '\u{0c}'];

/// Boundary checks applied wherever a message component receives outside input.
pub struct Validator;

impl Validator {
    pub fn validate_method(method: &str) -> Result<HttpMethod> {
        http_method_from_str(method)
            .ok_or_else(|| HttpError::invalid(format!("invalid HTTP method `{method}`")))
    }

    pub fn validate_http_version(version: &str) -> Result<HttpVersion> {
        version.parse()
    }

    pub fn validate_status(code: u16) -> Result<u16> {
        if !(100..=599).contains(&code) {
            return Err(HttpError::invalid(format!("invalid HTTP status code {code}")));
        }
        Ok(code)
    }

    pub fn validate_port(port: u32) -> Result<u16> {
        match u16::try_from(port) {
            Ok(port) if port >= 1 => Ok(port),
            _ => Err(HttpError::invalid(format!(
                "uri port must be between 1 and 65535 (inclusive), got {port}"
            ))),
        }
    }

    pub fn validate_request_target(target: &str) -> Result<&str> {
        if target.chars().any(char::is_whitespace) {
            return Err(HttpError::invalid(
                "invalid request target provided; cannot contain whitespace",
            ));
        }
        Ok(target)
    }

    pub fn validate_header_name(name: &str) -> Result<&str> {
        if name.is_empty() {
            return Err(HttpError::invalid("header name cannot be empty"));
        }
        Ok(name)
    }

    pub fn validate_cookie_name(name: &str) -> Result<&str> {
        if name.is_empty() {
            return Err(HttpError::invalid("the cookie name cannot be empty"));
        }
        if name.contains(COOKIE_NAME_FORBIDDEN) {
            return Err(HttpError::invalid(format!(
                "the cookie name `{name}` contains invalid characters"
            )));
        }
        Ok(name)
    }
}
