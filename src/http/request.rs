//! Server-side view of an incoming HTTP request.
//!
//! A [`ServerRequest`] is assembled from its URI, headers, cookies, gateway
//! variables and body stream, either explicitly through
//! [`ServerRequest::new`] or in one go with
//! [`ServerRequest::from_environment`].
//!
//! Two values are computed lazily and memoized: the query parameters (from
//! the URI query string, on first access) and the parsed body (by the body
//! parser registered for the request media type). The effective method is
//! resolved lazily as well, since a `POST` may carry its real method in a
//! body field. All three caches sit behind `OnceCell`, so reading them only
//! needs `&self`.

use base64ct::{Base64, Encoding};
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};

use crate::config::config;
use crate::http::cookie::Cookie;
use crate::http::error::{HttpError, Result};
use crate::http::headers::HttpHeaders;
use crate::http::message::{Message, MessageParts};
use crate::http::parser::{self, BodyParser, BodyParsers};
use crate::http::stream::Stream;
use crate::http::upload::UploadedFiles;
use crate::http::uri::Uri;
use crate::http::validator::Validator;
use crate::http::{Environment, HttpMethod, HttpVersion};

#[derive(Debug, Clone)]
pub struct ServerRequest {
    message: MessageParts,

    /// Effective method, resolved on first [`method`](Self::method) call.
    method: OnceCell<HttpMethod>,
    original_method: HttpMethod,

    uri: Uri,
    request_target: Option<String>,

    query_params: Option<Map<String, Value>>,
    query_cache: OnceCell<Map<String, Value>>,
    cookie_params: IndexMap<String, String>,
    server_params: Environment,
    attributes: IndexMap<String, Value>,

    /// Unset until a parser ran or a value was given.
    parsed_body: OnceCell<Option<Value>>,
    body_parsers: BodyParsers,
    uploaded_files: UploadedFiles,
}

impl Message for ServerRequest {
    fn parts(&self) -> &MessageParts {
        &self.message
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.message
    }
}

impl ServerRequest {
    /// The protocol version is read from `SERVER_PROTOCOL` in `server_params`,
    /// falling back to the configured default. A `Host` header is derived
    /// from the URI whenever the URI carries a host.
    pub fn new(
        method: &str,
        uri: Uri,
        mut headers: HttpHeaders,
        cookies: IndexMap<String, String>,
        server_params: Environment,
        body: Stream,
        uploaded_files: UploadedFiles,
    ) -> Result<Self> {
        let original_method = Validator::validate_method(method)?;

        let protocol = server_params
            .get("SERVER_PROTOCOL")
            .and_then(|proto| proto.trim_start_matches("HTTP/").parse::<HttpVersion>().ok())
            .unwrap_or(config().protocol_version);

        if !uri.host().is_empty() {
            headers.set("Host", &host_header(&uri))?;
        }

        Ok(Self {
            message: MessageParts::new(headers, protocol, body),
            method: OnceCell::new(),
            original_method,
            uri,
            request_target: None,
            query_params: None,
            query_cache: OnceCell::new(),
            cookie_params: cookies,
            server_params,
            attributes: IndexMap::new(),
            parsed_body: OnceCell::new(),
            body_parsers: BodyParsers::default(),
            uploaded_files,
        })
    }

    /// Builds a request out of gateway variables.
    ///
    /// `REQUEST_METHOD` defaults to `GET`; cookies come from the first
    /// `Cookie` header, URL-decoded if the config says so.
    pub fn from_environment(env: Environment, body: Stream) -> Result<Self> {
        let method = env
            .get("REQUEST_METHOD")
            .filter(|method| !method.is_empty())
            .cloned()
            .unwrap_or_else(|| HttpMethod::Get.to_string());
        let uri = Uri::from_environment(&env)?;
        let headers = HttpHeaders::from_environment(&env)?;

        let cookie_header = headers
            .get("Cookie")
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or_default();
        let cookies = Cookie::parse_request_header(cookie_header, config().decode_cookies);

        Self::new(&method, uri, headers, cookies, env, body, UploadedFiles::new())
    }

    /// Effective method.
    ///
    /// The method override header wins; otherwise a `POST` may name its
    /// method in the override field of its parsed body. Parsing reads a
    /// snapshot of the body, so its position is left where it was.
    pub fn method(&self) -> Result<HttpMethod> {
        if let Some(method) = self.method.get() {
            return Ok(*method);
        }

        let cfg = config();
        let mut method = self.original_method;

        let header = self.header_line(&cfg.method_override_header);
        if !header.is_empty() {
            method = Validator::validate_method(&header)?;
        } else if self.original_method == HttpMethod::Post {
            let field = self
                .parsed_body_param(&cfg.method_override_field)?
                .and_then(Value::as_str);
            if let Some(field) = field {
                method = Validator::validate_method(field)?;
            }
        }

        if method != self.original_method {
            tracing::debug!(original = %self.original_method, %method, "Method overridden");
        }
        Ok(*self.method.get_or_init(|| method))
    }

    /// Method as given at construction, ignoring any override.
    pub fn original_method(&self) -> HttpMethod {
        self.original_method
    }

    pub fn with_method(&self, method: &str) -> Result<Self> {
        let method = Validator::validate_method(method)?;
        let mut clone = self.clone();
        clone.original_method = method;
        clone.method = OnceCell::with_value(method);
        Ok(clone)
    }

    pub fn is_method(&self, method: &str) -> Result<bool> {
        Ok(self.method()?.as_str().eq_ignore_ascii_case(method))
    }

    pub fn is_get(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Get)
    }

    pub fn is_post(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Post)
    }

    pub fn is_put(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Put)
    }

    pub fn is_patch(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Patch)
    }

    pub fn is_delete(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Delete)
    }

    pub fn is_head(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Head)
    }

    pub fn is_options(&self) -> Result<bool> {
        Ok(self.method()? == HttpMethod::Options)
    }

    pub fn is_xhr(&self) -> bool {
        self.header_line("X-Requested-With") == "XMLHttpRequest"
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Replaces the URI.
    ///
    /// The `Host` header follows the new URI's host unless `preserve_host`
    /// is set and the request already has a non-empty `Host`. A URI without
    /// a host never touches the header.
    pub fn with_uri(&self, uri: Uri, preserve_host: bool) -> Result<Self> {
        let mut clone = self.clone();
        clone.uri = uri;
        clone.query_cache = OnceCell::new();

        let keep_current = preserve_host && !self.header_line("Host").is_empty();
        if !clone.uri.host().is_empty() && !keep_current {
            let host = host_header(&clone.uri);
            clone.message.headers.set("Host", &host)?;
        }
        Ok(clone)
    }

    /// `origin-form` of the URI unless a target was set explicitly.
    pub fn request_target(&self) -> String {
        if let Some(target) = &self.request_target {
            return target.clone();
        }

        let mut target = match self.uri.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        if !self.uri.query().is_empty() {
            target.push('?');
            target.push_str(self.uri.query());
        }
        target
    }

    pub fn with_request_target(&self, target: &str) -> Result<Self> {
        let target = Validator::validate_request_target(target)?;
        let mut clone = self.clone();
        clone.request_target = Some(target.to_string());
        Ok(clone)
    }

    pub fn query_params(&self) -> &Map<String, Value> {
        match &self.query_params {
            Some(params) => params,
            None => self
                .query_cache
                .get_or_init(|| parser::parse_query(self.uri.query())),
        }
    }

    pub fn query_param(&self, key: &str) -> Result<Option<&Value>> {
        if key.is_empty() {
            return Err(HttpError::invalid("query param cannot be empty"));
        }
        Ok(self.query_params().get(key))
    }

    pub fn with_query_params(&self, params: Map<String, Value>) -> Self {
        let mut clone = self.clone();
        clone.query_params = Some(params);
        clone
    }

    pub fn cookie_params(&self) -> &IndexMap<String, String> {
        &self.cookie_params
    }

    pub fn cookie_param(&self, name: &str) -> Option<&str> {
        self.cookie_params.get(name).map(String::as_str)
    }

    pub fn with_cookie_params(&self, cookies: IndexMap<String, String>) -> Self {
        let mut clone = self.clone();
        clone.cookie_params = cookies;
        clone
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn with_attribute(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut clone = self.clone();
        clone.attributes.insert(name.to_string(), value.into());
        clone
    }

    pub fn with_attributes(&self, attributes: IndexMap<String, Value>) -> Self {
        let mut clone = self.clone();
        clone.attributes = attributes;
        clone
    }

    pub fn without_attribute(&self, name: &str) -> Self {
        let mut clone = self.clone();
        clone.attributes.shift_remove(name);
        clone
    }

    /// Body decoded by the parser registered for the request media type.
    ///
    /// `Ok(None)` when there is no `Content-Type`, no parser for it, or the
    /// parser found nothing. The result is memoized once a parser ran; a
    /// parser returning a scalar is an error.
    pub fn parsed_body(&self) -> Result<Option<&Value>> {
        if let Some(parsed) = self.parsed_body.get() {
            return Ok(parsed.as_ref());
        }

        match self.run_body_parser()? {
            Some(value) => Ok(self.parsed_body.get_or_init(|| value).as_ref()),
            None => Ok(None),
        }
    }

    /// A top-level entry of the parsed body; array indices are given as
    /// decimal strings.
    pub fn parsed_body_param(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.parsed_body()?.and_then(|body| match body {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        }))
    }

    /// Query and body parameters side by side, as
    /// `{"GET": <query params>, "POST": <parsed body or {}>}`.
    pub fn params(&self) -> Result<Map<String, Value>> {
        let body = self
            .parsed_body()?
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let mut params = Map::new();
        params.insert("GET".to_string(), Value::Object(self.query_params().clone()));
        params.insert("POST".to_string(), body);
        Ok(params)
    }

    /// Only objects, arrays and `None` (or `Null`) are accepted.
    pub fn with_parsed_body(&self, data: Option<Value>) -> Result<Self> {
        let data = match data {
            None | Some(Value::Null) => None,
            Some(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
            Some(_) => {
                return Err(HttpError::invalid(
                    "parsed body value must be an object, an array, or nothing",
                ));
            }
        };

        let mut clone = self.clone();
        clone.parsed_body = OnceCell::with_value(data);
        Ok(clone)
    }

    /// A copy whose body will be parsed again on next access.
    pub fn reparse_body(&self) -> Self {
        let mut clone = self.clone();
        clone.parsed_body = OnceCell::new();
        clone
    }

    /// A copy with `parser` handling `media_type` (parameters excluded).
    pub fn with_media_type_parser(
        &self,
        media_type: &str,
        parser: impl BodyParser + 'static,
    ) -> Self {
        let mut clone = self.clone();
        clone.body_parsers.register(media_type, parser);
        clone
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type").first().map(String::as_str)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")
            .first()
            .and_then(|length| length.trim().parse().ok())
    }

    pub fn media_type(&self) -> Option<String> {
        self.content_type().and_then(parser::media_type)
    }

    pub fn media_type_params(&self) -> IndexMap<String, String> {
        self.content_type()
            .map(parser::media_type_params)
            .unwrap_or_default()
    }

    pub fn content_charset(&self) -> Option<String> {
        self.media_type_params().shift_remove("charset")
    }

    pub fn server_params(&self) -> &Environment {
        &self.server_params
    }

    pub fn server_param(&self, key: &str) -> Option<&str> {
        self.server_params.get(key).map(String::as_str)
    }

    /// Basic auth user and password, empty strings when none were sent.
    ///
    /// Looks at `PHP_AUTH_USER`/`PHP_AUTH_PW` first, then any gateway
    /// variable ending in `HTTP_AUTHORIZATION` (rewritten by some servers
    /// as `REDIRECT_HTTP_AUTHORIZATION`), then the `Authorization` header.
    pub fn credentials(&self) -> (String, String) {
        if let (Some(user), Some(password)) = (
            self.server_param("PHP_AUTH_USER"),
            self.server_param("PHP_AUTH_PW"),
        ) {
            return (user.to_string(), password.to_string());
        }

        let from_env = self.server_params.iter().find_map(|(key, value)| {
            let matches = key
                .to_ascii_uppercase()
                .ends_with("HTTP_AUTHORIZATION");
            (matches && !value.is_empty()).then_some(value.clone())
        });
        let authorization = from_env.or_else(|| {
            let header = self.header_line("Authorization");
            (!header.is_empty()).then_some(header)
        });

        authorization
            .map(|value| decode_basic(&value))
            .unwrap_or_default()
    }

    pub fn uploaded_files(&self) -> &UploadedFiles {
        &self.uploaded_files
    }

    pub fn with_uploaded_files(&self, files: UploadedFiles) -> Self {
        let mut clone = self.clone();
        clone.uploaded_files = files;
        clone
    }

    /// `Ok(None)` when no parser applies, otherwise the parser's verdict
    /// with `Null` folded into `None`.
    fn run_body_parser(&self) -> Result<Option<Option<Value>>> {
        let Some(media_type) = self.media_type() else {
            return Ok(None);
        };
        let media_type = parser::parser_media_type(&media_type);

        let Some(parser) = self.body_parsers.get(&media_type) else {
            tracing::trace!(media_type, "No body parser registered");
            return Ok(None);
        };
        let body = self.body().snapshot()?;
        tracing::trace!(media_type, len = body.len(), "Parsing request body");

        match parser.parse(&body) {
            Value::Null => Ok(Some(None)),
            value @ (Value::Object(_) | Value::Array(_)) => Ok(Some(Some(value))),
            _ => Err(HttpError::ParserContract { media_type }),
        }
    }
}

/// `host[:port]`, the port only when it is not the scheme default.
fn host_header(uri: &Uri) -> String {
    match uri.port() {
        Some(port) => format!("{}:{port}", uri.host()),
        None => uri.host().to_string(),
    }
}

/// `Basic dXNlcjpwYXNz` -> `("user", "pass")`.
fn decode_basic(authorization: &str) -> (String, String) {
    let encoded = match authorization.split_once(' ') {
        Some((_, encoded)) => encoded.trim(),
        None => authorization.trim(),
    };

    let Ok(decoded) = Base64::decode_vec(encoded) else {
        tracing::debug!("Ignoring undecodable authorization credentials");
        return Default::default();
    };
    let decoded = String::from_utf8_lossy(&decoded);
    match decoded.split_once(':') {
        Some((user, password)) => (user.to_string(), password.to_string()),
        None => (decoded.into_owned(), String::new()),
    }
}
