//! Case-insensitive header collections.
//!
//! Keys are stored lowercased. Lookup, replacement and removal ignore case,
//! while iteration preserves the order in which keys were first added. For
//! diagnostics a [`HeaderSet`] renders every key in its canonical
//! `Content-Length` form.

use std::fmt;

/// A single header entry. The key is always lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    key: String,
    value: String,
}

impl Header {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_ascii_lowercase(),
            value: value.into(),
        }
    }

    /// The lowercase header key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The header value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The key with the first character and every character following a
    /// `-` upper-cased.
    pub fn canonical_key(&self) -> String {
        canonical_key(&self.key)
    }

    /// Parses the value as an unsigned integer. Returns `None` for values
    /// that are not entirely numeric.
    pub fn value_as_u64(&self) -> Option<u64> {
        self.value.trim().parse().ok()
    }
}

/// Renders a header key in canonical form, e.g. `x-storage-url` becomes
/// `X-Storage-Url`.
pub fn canonical_key(key: &str) -> String {
    let mut canonical = String::with_capacity(key.len());
    let mut upper = true;
    for c in key.chars() {
        if upper {
            canonical.extend(c.to_uppercase());
        } else {
            canonical.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    canonical
}

/// An ordered, case-insensitive collection of headers with at most one entry
/// per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<Header>,
}

impl HeaderSet {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header. An existing entry with the same key (ignoring case)
    /// has its value replaced and keeps its position.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        let header = Header::new(key, value);
        match self.position(&header.key) {
            Some(index) => self.entries[index] = header,
            None => self.entries.push(header),
        }
    }

    /// Looks up a header by key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&Header> {
        self.position(key).map(|index| &self.entries[index])
    }

    /// Looks up the value of a header by key, ignoring case.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(Header::value)
    }

    /// Returns true if a header with this key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Removes the header with this key. Returns whether one was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every header.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of headers in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the set holds no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|header| header.key.eq_ignore_ascii_case(key))
    }
}

impl<'a> IntoIterator for &'a HeaderSet {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for header in &self.entries {
            writeln!(f, "{}: {}", header.canonical_key(), header.value)?;
        }
        Ok(())
    }
}
