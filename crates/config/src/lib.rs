//! Layered configuration for srcfacts.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. built-in defaults (everything unset),
//! 2. `config.toml` in the user's config directory, if present,
//! 3. an explicitly given file, as TOML, YAML or JSON depending on its extension,
//! 4. `SRCFACTS_*` environment variables (`SRCFACTS_FETCH_TIMEOUT=2000`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;
use url::Url;

const ENV_PREFIX: &str = "SRCFACTS_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL relative `href`s are resolved against.
    pub base_url: Option<Url>,
    /// Fetch timeout in milliseconds. Unset or `0` means no timeout.
    pub fetch_timeout: Option<u64>,
    /// Template used to render facts, in place of the built-in markup.
    pub template: Option<String>,
    /// JSON file mapping repository links to their facts.
    pub fixtures: Option<PathBuf>,
}

impl Config {
    /// Load the configuration from every source, `path` being the explicitly
    /// requested file (if any).
    #[instrument(skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let user = Self::user_file();
        tracing::debug!(user = ?user, explicit = ?path, "Loading configuration");
        let figment = layered(user.as_deref(), path)?.merge(Env::prefixed(ENV_PREFIX));
        figment.extract().or_raise(|| ErrorKind::Load)
    }

    /// `config.toml` in the platform's config directory for srcfacts.
    pub fn user_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "srcfacts").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// Every file-based layer. A missing user file is skipped, a missing explicit
/// file is an error.
fn layered(user: Option<&Path>, explicit: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::new();
    if let Some(user) = user {
        figment = figment.merge(Toml::file(user));
    }
    if let Some(path) = explicit {
        if !path.is_file() {
            tracing::error!(path = %path.display(), "Config file does not exist");
            exn::bail!(ErrorKind::Load);
        }
        let extension = path.extension().and_then(OsStr::to_str).unwrap_or_default().to_ascii_lowercase();
        figment = match extension.as_str() {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
        };
    }
    Ok(figment)
}
