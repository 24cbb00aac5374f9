//! Deterministic query-string codec.
//!
//! Pairs are sorted by their full `key=value` text before joining, so the
//! output (and any signature computed over it) does not depend on the order
//! parameters were inserted in.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Characters left untouched by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A flat string-keyed parameter mapping.
///
/// A key may be present with no value (`None`); such keys are skipped by
/// [`encode`] but still count as "supplied" for [`Params::set_default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Option<String>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any existing one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), Some(value.into()));
        self
    }

    /// Set a possibly-absent value. `None` keeps the key but drops it from the wire.
    pub fn set_opt(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> &mut Self {
        self.0.insert(key.into(), value.map(Into::into));
        self
    }

    /// Set a value only if the key was not supplied yet. Returns true if it was set.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, Some(value.into()));
        true
    }

    /// Merge every entry of `other` that is not already present.
    pub fn merge_defaults(&mut self, other: &Params) {
        for (k, v) in &other.0 {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key).flatten()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries that carry a value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// Encode with `&` separators and URI escaping.
pub fn encode(params: &Params) -> String {
    encode_with(params, "&", true)
}

/// Encode with an explicit separator, optionally leaving keys and values raw.
///
/// The raw, separator-less form is the canonical input to request signing.
pub fn encode_with(params: &Params, separator: &str, escape: bool) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            if escape {
                format!("{}={}", escape_component(k), escape_component(v))
            } else {
                format!("{k}={v}")
            }
        })
        .collect();
    pairs.sort();
    pairs.join(separator)
}

/// Decode a query string. Pairs without `=` are dropped; values may contain `=`.
pub fn decode(query: &str) -> Params {
    let mut params = Params::new();
    for part in query.split('&') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        params.set(unescape_component(key), unescape_component(value));
    }
    params
}

pub fn escape_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

pub fn unescape_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
