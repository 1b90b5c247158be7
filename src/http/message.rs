//! State and behaviour shared by [`ServerRequest`](crate::http::request::ServerRequest)
//! and [`HttpResponse`](crate::http::response::HttpResponse).
//!
//! Every `with_*` method clones the receiver and changes the clone. The clone
//! owns its own header map and its own body stream (see the `Clone` impl of
//! [`Stream`]), so a derived message never observes later changes made to the
//! one it came from, and the other way around.

use indexmap::IndexMap;

use crate::http::HttpVersion;
use crate::http::error::Result;
use crate::http::headers::HttpHeaders;
use crate::http::stream::Stream;
use crate::http::validator::Validator;

#[derive(Debug, Clone, Default)]
pub struct MessageParts {
    pub headers: HttpHeaders,
    pub protocol: HttpVersion,
    pub body: Stream,
}

impl MessageParts {
    pub fn new(headers: HttpHeaders, protocol: HttpVersion, body: Stream) -> Self {
        Self {
            headers,
            protocol,
            body,
        }
    }
}

pub trait Message: Clone {
    fn parts(&self) -> &MessageParts;
    fn parts_mut(&mut self) -> &mut MessageParts;

    fn protocol_version(&self) -> HttpVersion {
        self.parts().protocol
    }

    fn with_protocol_version(&self, version: &str) -> Result<Self> {
        let protocol = Validator::validate_http_version(version)?;
        let mut clone = self.clone();
        clone.parts_mut().protocol = protocol;
        Ok(clone)
    }

    /// Original-cased header names mapped to their comma-joined values.
    fn headers(&self) -> IndexMap<String, String> {
        self.parts().headers.all()
    }

    fn header_map(&self) -> &HttpHeaders {
        &self.parts().headers
    }

    /// All values of `name`, empty when absent.
    fn header(&self, name: &str) -> &[String] {
        self.parts().headers.get(name).unwrap_or(&[])
    }

    fn header_line(&self, name: &str) -> String {
        self.parts().headers.line(name)
    }

    fn has_header(&self, name: &str) -> bool {
        self.parts().headers.has(name)
    }

    fn with_header(&self, name: &str, value: &str) -> Result<Self> {
        let mut clone = self.clone();
        clone.parts_mut().headers.set(name, value)?;
        Ok(clone)
    }

    fn with_added_header(&self, name: &str, value: &str) -> Result<Self> {
        let mut clone = self.clone();
        clone.parts_mut().headers.add(name, value)?;
        Ok(clone)
    }

    fn without_header(&self, name: &str) -> Result<Self> {
        let mut clone = self.clone();
        clone.parts_mut().headers.remove(name)?;
        Ok(clone)
    }

    fn body(&self) -> &Stream {
        &self.parts().body
    }

    fn body_mut(&mut self) -> &mut Stream {
        &mut self.parts_mut().body
    }

    fn with_body(&self, body: Stream) -> Self {
        let mut clone = self.clone();
        clone.parts_mut().body = body;
        clone
    }
}
