//! Owned key/value maps used by [`crate::event::Event`].
//!
//! Every string stored here is a heap-owned copy — the underlying request
//! buffer is reused across keep-alive requests, so nothing may borrow from
//! it past the current request. `reset()` drops every owned string and then
//! clears the backing `Vec`/`HashMap` while retaining its capacity, so pool
//! reuse stays allocation-free in steady state.

use std::collections::HashMap;

/// Path parameters extracted during route matching.
///
/// Backed by a flat `Vec` rather than a `HashMap`: at most
/// [`ServerOptions::max_params`](crate::config::ServerOptions) entries
/// (default 16) are ever stored, and a linear scan over that many short
/// strings is faster and allocates less than hashing would be on the
/// request hot path.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Params { entries: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Params { entries: Vec::with_capacity(cap) }
    }

    /// Insert or overwrite a parameter. Copies both strings.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value.into();
        } else {
            self.entries.push((name, value.into()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop all owned strings and clear, keeping the `Vec`'s capacity.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

/// Decoded query-string parameters.
#[derive(Debug, Clone, Default)]
pub struct Query {
    map: HashMap<String, String>,
    parsed: bool,
}

impl Query {
    pub fn new() -> Self {
        Query { map: HashMap::new(), parsed: false }
    }

    /// Parse `raw_query` into this map. Idempotent: repeated calls clear and
    /// repopulate rather than append.
    pub fn parse(&mut self, raw_query: &str) {
        self.map.clear();
        for (k, v) in form_urlencoded::parse(raw_query.as_bytes()) {
            self.map.insert(k.into_owned(), v.into_owned());
        }
        self.parsed = true;
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(|s| s.as_str())
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn reset(&mut self) {
        self.map.clear();
        self.parsed = false;
    }
}

/// Inter-middleware scratch storage: keys and values
/// are heap-owned copies, just like [`Params`] and [`Query`].
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    map: HashMap<String, String>,
}

impl UserContext {
    pub fn new() -> Self {
        UserContext { map: HashMap::new() }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn reset(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_decodes_plus_and_percent_escapes() {
        let mut q = Query::new();
        q.parse("a=1&b=hello%20world&c=");
        assert_eq!(q.get("a"), Some("1"));
        assert_eq!(q.get("b"), Some("hello world"));
        assert_eq!(q.get("c"), Some(""));
    }

    #[test]
    fn query_parse_is_idempotent() {
        let mut q = Query::new();
        q.parse("a=1&b=2");
        let first: Vec<_> = {
            let mut v: Vec<_> = q.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            v.sort();
            v
        };
        q.parse("a=1&b=2");
        let second: Vec<_> = {
            let mut v: Vec<_> = q.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            v.sort();
            v
        };
        assert_eq!(first, second);
    }

    #[test]
    fn params_reset_clears_but_keeps_usable() {
        let mut p = Params::new();
        p.insert("id", "42");
        assert_eq!(p.get("id"), Some("42"));
        p.reset();
        assert!(p.is_empty());
        assert_eq!(p.get("id"), None);
    }
}
