// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::feed::is_url;
use crate::tracklist::ProviderKind;

/// Configuration file looked up when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "podstash.toml";

/// Library-wide configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of the library tree; also holds the ledger and playlists
    pub library_directory: PathBuf,
    /// Place every episode in its own sub-directory of the channel directory
    #[serde(default = "default_true")]
    pub episode_directories: bool,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub tracklist: TracklistConfig,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

/// External programs and the scratch area they work in
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub convert: String,
    /// Parent directory for per-episode workspaces (system temp dir if unset)
    pub workspace_root: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            convert: "convert".to_string(),
            workspace_root: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracklistConfig {
    pub provider: ProviderKind,
}

/// A single podcast subscription
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Subscription {
    pub title: String,
    pub feed_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub external_tracklist_merge_enabled: bool,
    #[serde(default)]
    pub external_tracklist_merge_critical: bool,
    /// Only ever look at the first `recent` items of the feed
    #[serde(default)]
    pub recent: Option<usize>,
    #[serde(default)]
    pub create_playlist: bool,
}

impl Subscription {
    /// Create an enabled subscription with every optional feature switched off
    pub fn new(title: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            feed_url: feed_url.into(),
            enabled: true,
            external_tracklist_merge_enabled: false,
            external_tracklist_merge_critical: false,
            recent: None,
            create_playlist: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "library_directory must not be empty".to_string(),
            ));
        }

        for subscription in &self.subscriptions {
            if subscription.title.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "subscription with feed '{}' has an empty title",
                    subscription.feed_url
                )));
            }

            if subscription.feed_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "subscription '{}' has an empty feed_url",
                    subscription.title
                )));
            }

            if is_url(&subscription.feed_url)
                && let Err(e) = Url::parse(&subscription.feed_url)
            {
                return Err(ConfigError::Invalid(format!(
                    "subscription '{}' has an invalid feed_url: {e}",
                    subscription.title
                )));
            }

            if subscription.recent == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "subscription '{}': recent must be at least 1",
                    subscription.title
                )));
            }

            if subscription.external_tracklist_merge_critical
                && !subscription.external_tracklist_merge_enabled
            {
                return Err(ConfigError::Invalid(format!(
                    "subscription '{}': external_tracklist_merge_critical requires external_tracklist_merge_enabled",
                    subscription.title
                )));
            }
        }

        Ok(())
    }

    /// Directory under which per-episode workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.tools
            .workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
