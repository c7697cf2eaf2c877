use crate::error::{Error, ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// The absolute URL an anchor points at, used as the cache key.
///
/// Always stored in [`Url`]'s normalized serialization, so `HTTPS://X/repo`
/// and `https://x/repo` are the same identity.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("{_0}")]
pub struct LinkIdentity(String);

impl LinkIdentity {
    /// Parse an absolute link.
    pub fn parse(href: &str) -> Result<Self> {
        Self::resolve(None, href)
    }

    /// Resolve `href` against `base` the way a browser resolves an anchor's
    /// `href` attribute. Without a base, `href` must already be absolute.
    pub fn resolve(base: Option<&Url>, href: &str) -> Result<Self> {
        let href = href.trim();
        let url = match base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        }
        .or_raise(|| ErrorKind::InvalidLink(href.to_string()))?;
        Ok(Self(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl FromStr for LinkIdentity {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}
impl AsRef<str> for LinkIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Providers hand out numbers and booleans as often as strings; they all end
/// up as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum FactValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}
impl From<FactValue> for String {
    fn from(value: FactValue) -> Self {
        match value {
            FactValue::Text(text) => text,
            FactValue::Number(number) => number.to_string(),
            FactValue::Flag(flag) => flag.to_string(),
        }
    }
}

/// Opaque key-value metadata describing a remote repository.
///
/// An empty mapping means "no data".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facts(BTreeMap<String, String>);

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Facts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
impl<'de> Deserialize<'de> for Facts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, FactValue>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, v)| (k, String::from(v))).collect())
    }
}
impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Facts {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Facts {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Repository information: a non-empty set of [`Facts`].
///
/// Cheap to clone, since it's handed to every subscriber of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    facts: Arc<Facts>,
}
impl Source {
    /// Returns `None` for an empty mapping; empty facts never make a source.
    pub fn new(facts: Facts) -> Option<Self> {
        (!facts.is_empty()).then(|| Self { facts: Arc::new(facts) })
    }

    pub fn facts(&self) -> &Facts {
        &self.facts
    }
}
