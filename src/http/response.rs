use serde::Serialize;
use std::fmt;

use crate::config::config;
use crate::http::error::{HttpError, Result};
use crate::http::headers::HttpHeaders;
use crate::http::message::{Message, MessageParts};
use crate::http::status::HttpStatus;
use crate::http::stream::Stream;
use crate::http::validator::Validator;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    message: MessageParts,
    status_code: u16,
    reason: String,
}

impl Message for HttpResponse {
    fn parts(&self) -> &MessageParts {
        &self.message
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.message
    }
}

impl Default for HttpResponse {
    /// `200 OK` with no headers, an empty in-memory body and the configured
    /// protocol version.
    fn default() -> Self {
        Self {
            message: MessageParts::new(HttpHeaders::new(), config().protocol_version, Stream::temp()),
            status_code: HttpStatus::Ok.code(),
            reason: HttpStatus::Ok.reason_phrase().to_string(),
        }
    }
}

impl HttpResponse {
    /// Only codes with a known reason phrase are accepted here; use
    /// [`with_status`](Self::with_status) to give a custom one.
    pub fn new(code: u16) -> Result<Self> {
        Self::default().with_status(code, "")
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    /// An empty `reason` takes the standard phrase for `code`, which must
    /// then exist.
    pub fn with_status(&self, code: u16, reason: &str) -> Result<Self> {
        let code = Validator::validate_status(code)?;
        let reason = match (reason, HttpStatus::from_code(code)) {
            ("", Some(status)) => status.reason_phrase(),
            ("", None) => {
                return Err(HttpError::invalid(format!(
                    "reason phrase must be supplied for status code {code}"
                )));
            }
            (reason, _) => reason,
        };

        let mut clone = self.clone();
        clone.status_code = code;
        clone.reason = reason.to_string();
        Ok(clone)
    }

    /// Writes to this response's body at its current position.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> Result<usize> {
        self.body_mut().write(data.as_ref())
    }

    /// A copy with `data` pretty-printed into its body as JSON.
    pub fn with_json<T: Serialize + ?Sized>(&self, data: &T) -> Result<Self> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|err| HttpError::invalid(format!("cannot encode JSON body: {err}")))?;

        let mut clone = self.with_header("Content-Type", "application/json")?;
        clone.write(json)?;
        Ok(clone)
    }

    /// `Location: url` with `301 Moved Permanently` or `303 See Other`.
    pub fn with_redirect(&self, url: &str, permanent: bool) -> Result<Self> {
        let status = if permanent {
            HttpStatus::MovedPermanently
        } else {
            HttpStatus::SeeOther
        };
        self.with_header("Location", url)?
            .with_status(status.code(), "")
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.status_code, 204 | 205 | 304)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status_code, 301 | 302 | 303 | 307)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status_code == 403
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }
}

/// Wire form of the response.
///
/// HTTP/<version> <code> <reason>\r\n
/// \r\n
/// Set-Cookie: <cookie>\r\n          (one line per cookie)
/// <Header-Name>: <v1,v2>\r\n
/// \r\n
/// <body>
impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP/{} {} {}\r\n\r\n",
            self.protocol_version(),
            self.status_code,
            self.reason
        )?;

        for (name, values) in self.header_map().iter() {
            if name == "set-cookie" {
                for cookie in values {
                    write!(f, "Set-Cookie: {cookie}\r\n")?;
                }
            } else {
                write!(f, "{}: {}\r\n", title_case(name), values.join(","))?;
            }
        }
        f.write_str("\r\n")?;

        let body = self.body().snapshot().unwrap_or_default();
        f.write_str(&String::from_utf8_lossy(&body))
    }
}

/// `content-TYPE` -> `Content-Type`
fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}
