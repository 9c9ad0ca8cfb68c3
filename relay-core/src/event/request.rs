//! Read-only request view.

use crate::event::headers::Headers;
use crate::route::Method;

/// A parsed HTTP request, as produced by [`crate::httpwire::parse_request`]
/// and handed to the dispatcher. Everything here is an owned copy: the
/// wire-parsing layer is out of this crate's scope, but whatever
/// produces a `Request` must not leave it borrowing the connection's read
/// buffer, since that buffer is reused on keep-alive.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub raw_url: String,
    pub path: String,
    pub raw_query: Option<String>,
    pub version: HttpVersion,
    pub headers: Headers,
    pub body: Option<bytes::Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl Request {
    pub fn new(method: Method, raw_url: String) -> Self {
        let (path, raw_query) = split_path_and_query(&raw_url);
        Request {
            method,
            path,
            raw_query,
            raw_url,
            version: HttpVersion::Http11,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Reset back to a blank request, retaining the `Headers` map's
    /// capacity.
    pub fn reset(&mut self) {
        self.method = Method::Get;
        self.raw_url.clear();
        self.path.clear();
        self.raw_query = None;
        self.version = HttpVersion::Http11;
        self.headers.reset();
        self.body = None;
    }
}

impl Default for Request {
    fn default() -> Self {
        Request {
            method: Method::Get,
            raw_url: String::new(),
            path: String::new(),
            raw_query: None,
            version: HttpVersion::Http11,
            headers: Headers::new(),
            body: None,
        }
    }
}

fn split_path_and_query(raw_url: &str) -> (String, Option<String>) {
    match raw_url.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (raw_url.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_query() {
        let req = Request::new(Method::Get, "/search?q=rust".to_string());
        assert_eq!(req.path, "/search");
        assert_eq!(req.raw_query.as_deref(), Some("q=rust"));
    }

    #[test]
    fn no_query_leaves_raw_query_none() {
        let req = Request::new(Method::Get, "/health".to_string());
        assert_eq!(req.path, "/health");
        assert_eq!(req.raw_query, None);
    }
}
