//! Header multimap shared by live responses and cached records.

use serde::{Deserialize, Serialize};

/// Ordered HTTP header multimap.
///
/// Values are grouped per name: names compare case-insensitively and keep the
/// spelling they were first inserted with, and each name's values keep their
/// insertion order. [`insert`](Self::insert) always appends, so repeated
/// headers such as `Set-Cookie` survive capture and replay intact.
///
/// Serializes as a list of `[name, [values…]]` pairs.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Set-Cookie", "a=1");
/// headers.insert("Content-Type", "text/plain");
/// headers.insert("set-cookie", "b=2");
///
/// assert_eq!(headers.get("content-type"), Some("text/plain"));
/// assert_eq!(headers.get_all("SET-COOKIE").collect::<Vec<_>>(), ["a=1", "b=2"]);
/// assert_eq!(headers.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    groups: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `name`, after any values already present for it.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.values_mut(&name) {
            Some(values) => values.push(value),
            None => self.groups.push((name, vec![value])),
        }
    }

    /// First value recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value recorded for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.groups
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .into_iter()
            .flat_map(|(_, values)| values.iter().map(String::as_str))
    }

    /// `(name, values)` groups in the order names were first seen.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Flattened `(name, value)` pairs, grouped by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups().flat_map(|(name, values)| {
            values.iter().map(move |value| (name, value.as_str()))
        })
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn values_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        self.groups
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }
}
