//! HTTP headers abstraction for [`ServerRequest`](crate::http::request::ServerRequest) and
//! [`HttpResponse`](crate::http::response::HttpResponse)
//!
//! Headers are stored in an ordered map keyed by the normalized (lowercase)
//! name, so every lookup and mutation is case-insensitive. Each entry keeps
//! the casing the name was first given with, which is what [`HttpHeaders::all`]
//! echoes back, and the full list of values in insertion order.
//!
//! `Set-Cookie` is the one header with semantics: every value stored under it
//! is run through the [`Cookie`] model first, so the collection only ever
//! holds fully serialized cookie strings.

use indexmap::IndexMap;

use crate::http::Environment;
use crate::http::cookie::Cookie;
use crate::http::error::Result;
use crate::http::validator::Validator;

/// Gateway prefix marking a variable as a request header.
const ENV_PREFIX: &str = "HTTP_";

/// Gateway variables carrying header data without the `HTTP_` prefix.
const UNPREFIXED_HEADERS: &[&str] = &[
    "CONTENT_TYPE",
    "CONTENT_LENGTH",
    "PHP_AUTH_USER",
    "PHP_AUTH_PW",
    "PHP_AUTH_DIGEST",
    "AUTH_TYPE",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    original_name: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    headers: IndexMap<String, HeaderEntry>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the request headers out of a gateway variable set.
    ///
    /// `HTTP_ACCEPT_LANGUAGE` becomes `Accept-Language`; of the unprefixed
    /// variables only the known header-bearing ones are taken.
    pub fn from_environment(env: &Environment) -> Result<Self> {
        let mut headers = HttpHeaders::new();

        for (key, value) in env {
            let name = match key.strip_prefix(ENV_PREFIX) {
                Some(name) if !name.is_empty() => name,
                Some(_) => continue,
                None if UNPREFIXED_HEADERS.contains(&key.as_str()) => key.as_str(),
                None => continue,
            };
            headers.set(&env_name_to_header(name), value)?;
        }

        Ok(headers)
    }

    /// Replaces every value stored under `name`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let key = self.normalize_key(name)?;
        let value = coerce_value(&key, value)?;
        let original_name = match self.headers.get(&key) {
            Some(entry) => entry.original_name.clone(),
            None => name.to_string(),
        };

        self.headers.insert(
            key,
            HeaderEntry {
                original_name,
                values: vec![value],
            },
        );
        Ok(())
    }

    /// Appends a value after any already stored under `name`.
    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        let key = self.normalize_key(name)?;
        let value = coerce_value(&key, value)?;

        self.headers
            .entry(key)
            .or_insert_with(|| HeaderEntry {
                original_name: name.to_string(),
                values: Vec::new(),
            })
            .values
            .push(value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        let key = self.normalize_key(name).ok()?;
        self.headers.get(&key).map(|entry| entry.values.as_slice())
    }

    /// Like [`get`](Self::get), falling back to `default` when absent.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a [String]) -> &'a [String] {
        self.get(name).unwrap_or(default)
    }

    /// Every value of `name` joined with `,`, empty when absent.
    pub fn line(&self, name: &str) -> String {
        self.get(name).map(|values| values.join(",")).unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.normalize_key(name)
            .is_ok_and(|key| self.headers.contains_key(&key))
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        let key = self.normalize_key(name)?;
        self.headers.shift_remove(&key);
        Ok(())
    }

    /// Original-cased name to comma-joined value, in insertion order.
    pub fn all(&self) -> IndexMap<String, String> {
        self.headers
            .values()
            .map(|entry| (entry.original_name.clone(), entry.values.join(",")))
            .collect()
    }

    /// Normalized name and values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.headers
            .iter()
            .map(|(key, entry)| (key.as_str(), entry.values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Strips a leading `HTTP_` and lowercases. Idempotent.
    pub fn normalize_key(&self, name: &str) -> Result<String> {
        Validator::validate_header_name(name)?;
        let name = name.strip_prefix(ENV_PREFIX).unwrap_or(name);
        Ok(name.to_ascii_lowercase())
    }
}

fn coerce_value(key: &str, value: &str) -> Result<String> {
    if key == "set-cookie" {
        return Ok(Cookie::parse(value, false)?.to_string());
    }
    Ok(value.to_string())
}

/// `ACCEPT_LANGUAGE` -> `Accept-Language`
fn env_name_to_header(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
