//! `Set-Cookie` / `Cookie` header model.
//!
//! A [`Cookie`] is parsed from, and serialised back to, the
//! `name=value; attr=val; flag` wire form. Serialisation always emits the
//! attributes in the same order (`expires`, `max-age`, `path`, `domain`,
//! `secure`, `httponly`, `samesite`) and turns a cookie with an empty value
//! into an explicit deletion dated one year in the past.

use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::http::error::{HttpError, Result};
use crate::http::validator::Validator;

/// `max-age` of a deletion cookie, one year and a second.
const DELETION_AGE: i64 = 31_536_001;

/// 9999-12-31T23:59:59Z, the last instant an HTTP date can express.
const MAX_HTTP_DATE: i64 = 253_402_300_799;

/// Bytes `urlencode` escapes: all but `A-Z a-z 0-9 - _ .`.
const FORM: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "lax",
            SameSite::Strict => "strict",
        }
    }
}

impl FromStr for SameSite {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lax" => Ok(SameSite::Lax),
            "strict" => Ok(SameSite::Strict),
            _ => Err(HttpError::invalid(format!(
                "the `samesite` value `{s}` is not valid, expected `lax` or `strict`"
            ))),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: Option<String>,
    /// Unix timestamp, `0` for a session cookie.
    expires: i64,
    path: String,
    secure: bool,
    http_only: bool,
    raw: bool,
    same_site: Option<SameSite>,
    extensions: IndexMap<String, String>,
}

impl Cookie {
    /// New session cookie on `/`, http-only, URL-encoded on output.
    pub fn new(name: &str, value: &str) -> Result<Self> {
        Validator::validate_cookie_name(name)?;

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: None,
            expires: 0,
            path: "/".to_string(),
            secure: false,
            http_only: true,
            raw: false,
            same_site: None,
            extensions: IndexMap::new(),
        })
    }

    /// Parses `name=value; attr=val; flag`.
    ///
    /// The first part is always the name/value pair. Attribute keys are
    /// case-insensitive and a part without `=` is a flag. `max-age` wins over
    /// `expires` wherever it appears. With `decode` the name and value are
    /// URL-decoded and the cookie re-encodes them on output; without it they
    /// are kept raw.
    pub fn parse(raw: &str, decode: bool) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(HttpError::invalid("cookie cannot be empty"));
        }

        let mut parts = raw.split(';');
        let first = parts.next().unwrap_or_default();
        let (name, value) = match first.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (first.trim(), ""),
        };
        let (name, value) = if decode {
            (url_decode(name), url_decode(value))
        } else {
            (Cow::Borrowed(name), Cow::Borrowed(value))
        };

        let mut cookie = Cookie::new(&name, &value)?.with_raw(!decode);
        let mut max_age = None;

        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (part, None),
            };

            match key.to_ascii_lowercase().as_str() {
                "expires" => match value.and_then(parse_http_date) {
                    Some(at) => cookie.expires = at,
                    None => tracing::debug!(cookie = %cookie.name, ?value, "Ignoring unparsable expires"),
                },
                "max-age" => max_age = value.and_then(|v| v.parse::<i64>().ok()),
                "path" => {
                    cookie.path = value.filter(|v| !v.is_empty()).unwrap_or("/").to_string();
                }
                "domain" => {
                    cookie.domain = value.filter(|v| !v.is_empty()).map(str::to_string);
                }
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "samesite" => cookie.same_site = Some(value.unwrap_or_default().parse()?),
                other => {
                    cookie
                        .extensions
                        .insert(other.to_string(), value.unwrap_or_default().to_string());
                }
            }
        }

        if let Some(seconds) = max_age {
            cookie.expires = now().saturating_add(seconds);
        }

        Ok(cookie)
    }

    /// Parses a request `Cookie:` header into a name to value map.
    ///
    /// Later duplicates win. Pieces that do not form a valid cookie are
    /// skipped.
    pub fn parse_request_header(header: &str, decode: bool) -> IndexMap<String, String> {
        let mut cookies = IndexMap::new();

        for piece in header.trim_end_matches(['\r', '\n']).split(';') {
            let piece = piece.trim_start();
            if piece.trim().is_empty() {
                continue;
            }
            match Cookie::parse(piece, decode) {
                Ok(cookie) => {
                    cookies.insert(cookie.name, cookie.value);
                }
                Err(err) => tracing::debug!(piece, error = %err, "Skipping malformed cookie"),
            }
        }

        cookies
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Unix timestamp the cookie expires at, `0` for a session cookie.
    pub fn expires_at(&self) -> i64 {
        self.expires
    }

    /// Seconds left until expiry, `0` for a session cookie.
    pub fn max_age(&self) -> i64 {
        if self.expires != 0 {
            self.expires.saturating_sub(now())
        } else {
            0
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    pub fn is_cleared(&self) -> bool {
        self.expires < now()
    }

    /// Value of an attribute this model does not know about.
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn extensions(&self) -> &IndexMap<String, String> {
        &self.extensions
    }

    pub fn with_domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(str::to_string);
        self
    }

    /// Absolute expiry as a Unix timestamp, `0` for a session cookie.
    pub fn with_expires(mut self, at: i64) -> Self {
        self.expires = at;
        self
    }

    /// Expire `seconds` from now, `0` for a session cookie.
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.expires = if seconds == 0 { 0 } else { now().saturating_add(seconds) };
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = if path.is_empty() { "/" } else { path }.to_string();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    fn encode<'a>(&self, s: &'a str) -> Cow<'a, str> {
        if self.raw {
            Cow::Borrowed(s)
        } else {
            Cow::Owned(url_encode(s))
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.encode(&self.name))?;

        if self.value.is_empty() {
            write!(
                f,
                "deleted; expires={}; max-age=-{DELETION_AGE}",
                format_http_date(now() - DELETION_AGE)
            )?;
        } else {
            f.write_str(&self.encode(&self.value))?;
            if self.expires != 0 {
                write!(
                    f,
                    "; expires={}; max-age={}",
                    format_http_date(self.expires),
                    self.max_age()
                )?;
            }
        }

        if !self.path.is_empty() {
            write!(f, "; path={}", self.path)?;
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            write!(f, "; domain={domain}")?;
        }
        if self.secure {
            f.write_str("; secure")?;
        }
        if self.http_only {
            f.write_str("; httponly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; samesite={same_site}")?;
        }
        Ok(())
    }
}

impl FromStr for Cookie {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self> {
        Cookie::parse(s, false)
    }
}

pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `D, d-M-Y H:i:s GMT`, e.g. `Thu, 01-Jan-1970 00:00:00 GMT`.
fn format_http_date(at: i64) -> String {
    let secs = at.clamp(0, MAX_HTTP_DATE) as u64;
    let mut date = httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs));
    // IMF-fixdate is fixed width: "Thu, 01 Jan 1970 00:00:00 GMT"
    date.replace_range(7..8, "-");
    date.replace_range(11..12, "-");
    date
}

fn parse_http_date(value: &str) -> Option<i64> {
    httpdate::parse_http_date(value)
        .or_else(|_| httpdate::parse_http_date(&value.replacen('-', " ", 2)))
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

fn url_encode(s: &str) -> String {
    utf8_percent_encode(s, FORM).to_string().replace("%20", "+")
}

fn url_decode(s: &str) -> Cow<'_, str> {
    if !s.contains(['+', '%']) {
        return Cow::Borrowed(s);
    }
    let spaced = s.replace('+', " ");
    Cow::Owned(percent_decode_str(&spaced).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes() {
        let cookie = Cookie::parse(
            "id=abc; Path=/app; Domain=example.com; Secure; HttpOnly; SameSite=Strict",
            false,
        )
        .unwrap();

        assert_eq!(cookie.name(), "id");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), "/app");
        assert_eq!(cookie.domain(), Some("example.com"));
        assert!(cookie.is_secure());
        assert!(cookie.is_http_only());
        assert!(cookie.is_raw());
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.expires_at(), 0);
    }

    #[test]
    fn max_age_serialisation() {
        let wire = Cookie::parse("id=abc; Max-Age=60; Path=/; HttpOnly", false)
            .unwrap()
            .to_string();

        assert!(wire.starts_with("id=abc; expires="));
        assert!(wire.contains("max-age=60") || wire.contains("max-age=59"));
        assert!(wire.contains("; path=/"));
        assert!(wire.contains("; httponly"));
        assert!(!wire.contains("secure"));
        assert!(!wire.contains("samesite"));
    }

    #[test]
    fn max_age_overrides_expires_in_any_order() {
        let before = now();
        let cookie =
            Cookie::parse("a=1; Max-Age=100; Expires=Wed, 21 Oct 2015 07:28:00 GMT", false).unwrap();
        assert!(cookie.expires_at() >= before + 100);
        assert!(!cookie.is_cleared());
    }

    #[test]
    fn expires_is_parsed_as_http_date() {
        let imf = Cookie::parse("a=1; expires=Wed, 21 Oct 2015 07:28:00 GMT", false).unwrap();
        assert_eq!(imf.expires_at(), 1_445_412_480);
        assert!(imf.is_cleared());

        let dashed = Cookie::parse("a=1; expires=Wed, 21-Oct-2015 07:28:00 GMT", false).unwrap();
        assert_eq!(dashed.expires_at(), 1_445_412_480);

        let junk = Cookie::parse("a=1; expires=someday", false).unwrap();
        assert_eq!(junk.expires_at(), 0);
    }

    #[test]
    fn empty_value_serialises_as_deletion() {
        let cookie = Cookie::new("id", "").unwrap().with_max_age(3600);
        let wire = cookie.to_string();

        assert!(wire.starts_with("id=deleted; expires="));
        assert!(wire.contains("; max-age=-31536001; path=/; httponly"));
        assert!(!wire.contains("max-age=3600") && !wire.contains("max-age=3599"));
    }

    #[test]
    fn deletion_date_is_in_the_past() {
        let wire = Cookie::new("id", "").unwrap().to_string();
        let expires = wire
            .split("; ")
            .find_map(|part| part.strip_prefix("expires="))
            .unwrap();
        let at = parse_http_date(expires).unwrap();
        assert!(at < now() - 31_536_000);
        assert_eq!(&expires[7..8], "-");
        assert_eq!(&expires[11..12], "-");
    }

    #[test]
    fn fixed_attribute_order() {
        let cookie = Cookie::new("n", "v")
            .unwrap()
            .with_same_site(Some(SameSite::Lax))
            .with_secure(true)
            .with_domain(Some("example.org"))
            .with_path("/p");

        assert_eq!(
            cookie.to_string(),
            "n=v; path=/p; domain=example.org; secure; httponly; samesite=lax"
        );
    }

    #[test]
    fn encodes_unless_raw() {
        let cookie = Cookie::new("greeting", "hello world&more").unwrap().with_http_only(false);
        assert_eq!(cookie.to_string(), "greeting=hello+world%26more; path=/");
        assert_eq!(cookie.with_raw(true).to_string(), "greeting=hello world&more; path=/");
    }

    #[test]
    fn decoding_is_optional() {
        let decoded = Cookie::parse("msg=a+b%21", true).unwrap();
        assert_eq!(decoded.value(), "a b!");
        assert!(!decoded.is_raw());

        let raw = Cookie::parse("msg=a+b%21", false).unwrap();
        assert_eq!(raw.value(), "a+b%21");
    }

    #[test]
    fn invalid_names_and_same_site() {
        assert!(Cookie::new("", "v").is_err());
        assert!(Cookie::new("bad name", "v").is_err());
        assert!(Cookie::parse("", false).is_err());
        assert!(Cookie::parse("=value", false).is_err());
        assert!(Cookie::parse("a=1; SameSite=None", false).unwrap_err().is_invalid_argument());
        assert_eq!(
            Cookie::parse("a=1; samesite=LAX", false).unwrap().same_site(),
            Some(SameSite::Lax)
        );
    }

    #[test]
    fn unknown_attributes_are_kept() {
        let cookie = Cookie::parse("a=1; Priority=High; Partitioned", false).unwrap();
        assert_eq!(cookie.extension("priority"), Some("High"));
        assert_eq!(cookie.extension("Partitioned"), Some(""));
        assert!(!cookie.to_string().contains("Priority"));
    }

    #[test]
    fn max_age_and_clearing() {
        let session = Cookie::new("s", "1").unwrap();
        assert_eq!(session.max_age(), 0);

        let future = Cookie::new("f", "1").unwrap().with_expires(now() + 500);
        assert!(future.max_age() > 490);
        assert!(!future.is_cleared());

        let past = Cookie::new("p", "1").unwrap().with_expires(now() - 10);
        assert!(past.is_cleared());
    }

    #[test]
    fn request_header_last_wins() {
        let cookies = Cookie::parse_request_header("a=1; b=two;c=3; a=4\r\n", false);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies["a"], "4");
        assert_eq!(cookies["b"], "two");
        assert_eq!(cookies["c"], "3");
    }

    #[test]
    fn extreme_expiry_values_saturate() {
        let far = Cookie::parse("id=1; Max-Age=9223372036854775807", false).unwrap();
        assert_eq!(far.expires_at(), i64::MAX);
        assert!(far.to_string().contains("expires=Fri, 31-Dec-9999 23:59:59 GMT"));

        let past = Cookie::parse("id=1; Max-Age=-9223372036854775808", false).unwrap();
        assert!(past.is_cleared());

        let ancient = Cookie::new("a", "b").unwrap().with_expires(i64::MIN);
        assert_eq!(ancient.max_age(), i64::MIN);
        assert!(ancient.to_string().contains("expires=Thu, 01-Jan-1970 00:00:00 GMT"));

        let max = Cookie::new("a", "b").unwrap().with_max_age(i64::MAX);
        assert_eq!(max.expires_at(), i64::MAX);

        let mut headers = crate::http::headers::HttpHeaders::new();
        headers.set("Set-Cookie", "id=1; Max-Age=9223372036854775807").unwrap();
        assert!(headers.get("set-cookie").unwrap()[0].starts_with("id=1; expires="));
    }

    #[test]
    fn request_header_edge_cases() {
        assert!(Cookie::parse_request_header("", false).is_empty());

        let cookies = Cookie::parse_request_header("flag; =broken; tok=ab==;", false);
        assert_eq!(cookies["flag"], "");
        assert_eq!(cookies["tok"], "ab==");
        assert_eq!(cookies.len(), 2);

        let decoded = Cookie::parse_request_header("name=J%C3%BCrgen", true);
        assert_eq!(decoded["name"], "Jürgen");
    }
}
