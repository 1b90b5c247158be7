//! Immutable HTTP message model: URIs, cookies, headers, server requests and
//! responses, with every derivation returning an independent copy.

pub mod config;
pub mod http;

pub use http::cookie::{Cookie, SameSite};
pub use http::error::{HttpError, Result};
pub use http::headers::HttpHeaders;
pub use http::message::{Message, MessageParts};
pub use http::request::ServerRequest;
pub use http::response::HttpResponse;
pub use http::stream::Stream;
pub use http::upload::{UploadError, UploadedFile, UploadedFileNode, UploadedFiles};
pub use http::uri::Uri;
pub use http::{Environment, HttpMethod, HttpVersion};
