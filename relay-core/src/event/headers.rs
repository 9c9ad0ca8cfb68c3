//! Case-insensitive header storage.
//!
//! Keyed internally by a lowercased copy of the name so lookups are
//! case-insensitive, while the originally-supplied casing is kept alongside
//! for wire emission.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Headers {
    // lowercased name -> (original-case name, value)
    map: HashMap<String, (String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers { map: HashMap::new() }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.map.insert(key, (name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&name.to_ascii_lowercase()).map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map.remove(&name.to_ascii_lowercase()).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate in original-case `(name, value)` pairs, for wire emission.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.values().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn reset(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_but_emission_preserves_casing() {
        let mut h = Headers::new();
        h.set("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        let (name, _) = h.iter().next().unwrap();
        assert_eq!(name, "Content-Type");
    }
}
