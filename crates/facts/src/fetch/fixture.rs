//! Facts read from a JSON document instead of the network.

use crate::FactsFetcher;
use crate::error::{ErrorKind, Result};
use crate::models::{Facts, LinkIdentity};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::HashMap;
use std::path::Path;
use tracing::instrument;

/// Serves facts from a fixture document of the form:
///
/// ```json
/// {
///     "https://github.com/owner/repo": { "version": "v1.2.3", "stars": 1204, "forks": 96 },
///     "https://gitlab.com/owner/empty": {}
/// }
/// ```
///
/// Keys are normalized to [`LinkIdentity`]s on load, so the document doesn't
/// have to use canonical URLs. Links missing from the document fail with
/// [`ErrorKind::NotFound`].
#[derive(Debug, Default)]
pub struct FixtureFetcher {
    name: String,
    fixtures: HashMap<LinkIdentity, Facts>,
}

impl FixtureFetcher {
    /// Load fixtures from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Facts> = serde_json::from_str(json).or_raise(|| ErrorKind::InvalidData)?;
        let fixtures = raw
            .into_iter()
            .map(|(href, facts)| Ok((LinkIdentity::parse(&href)?, facts)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { name: "fixture".to_string(), fixtures })
    }

    /// Load fixtures from a JSON file on disk.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).or_raise(|| ErrorKind::Io)?;
        let fetcher = Self::from_json(&json)?.with_name(path.display().to_string());
        tracing::debug!(repositories = fetcher.len(), "Loaded facts fixtures");
        Ok(fetcher)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

#[async_trait]
impl FactsFetcher for FixtureFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, link: &LinkIdentity) -> Result<Facts> {
        self.fixtures.get(link).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(link.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURES: &str = r#"{
        "https://github.com/owner/repo": { "version": "v1.2.3", "stars": 1204 },
        "HTTPS://GITLAB.COM/owner/empty": {}
    }"#;

    #[tokio::test]
    async fn test_fetch_known_link() {
        let fetcher = FixtureFetcher::from_json(FIXTURES).unwrap();
        let facts = fetcher.fetch(&"https://github.com/owner/repo".parse().unwrap()).await.unwrap();
        assert_eq!(facts.get("version"), Some("v1.2.3"));
        assert_eq!(facts.get("stars"), Some("1204"));
    }

    #[tokio::test]
    async fn test_keys_are_normalized() {
        let fetcher = FixtureFetcher::from_json(FIXTURES).unwrap();
        let facts = fetcher.fetch(&"https://gitlab.com/owner/empty".parse().unwrap()).await.unwrap();
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_link_not_found() {
        let fetcher = FixtureFetcher::from_json(FIXTURES).unwrap();
        let err = fetcher.fetch(&"https://github.com/owner/other".parse().unwrap()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("https://github.com/owner/other".to_string()));
    }

    #[test]
    fn test_invalid_documents() {
        assert_eq!(*FixtureFetcher::from_json("[]").unwrap_err(), ErrorKind::InvalidData);
        assert_eq!(
            *FixtureFetcher::from_json(r#"{"not a url": {}}"#).unwrap_err(),
            ErrorKind::InvalidLink("not a url".to_string())
        );
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURES.as_bytes()).unwrap();
        let fetcher = FixtureFetcher::from_path(file.path()).unwrap();
        assert_eq!(fetcher.len(), 2);
        assert_eq!(fetcher.name(), file.path().display().to_string());
    }

    #[test]
    fn test_from_missing_path() {
        let err = FixtureFetcher::from_path("/definitely/not/here.json").unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
    }
}
