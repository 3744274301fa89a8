// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod thousand_one;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

pub use thousand_one::ThousandAndOneTracklists;

/// A named time range of an episode, in whole seconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub start: u64,
    pub end: u64,
    pub title: String,
}

/// A service that knows track listings of DJ mixes and similar shows
#[async_trait]
pub trait TracklistProvider: Send + Sync {
    /// Find the tracklist page best matching a free-text query
    ///
    /// `Ok(None)` means the service answered but had nothing to offer.
    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError>;

    /// Extract the chapters of a tracklist page found by [`search`](Self::search)
    async fn get(&self, url: &str) -> Result<Vec<Chapter>, ProviderError>;
}

/// Tracklist services selectable in the configuration file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "1001tracklists")]
    ThousandAndOneTracklists,
}

impl ProviderKind {
    pub fn build(self) -> Result<Box<dyn TracklistProvider>, ProviderError> {
        match self {
            ProviderKind::ThousandAndOneTracklists => {
                Ok(Box::new(ThousandAndOneTracklists::new()?))
            }
        }
    }
}

/// Turn `(offset, title)` pairs into consecutive chapters
///
/// Tracks are ordered by offset, keeping the page order for equal offsets.
/// Each chapter ends where the next one starts; the total duration is
/// unknown, so the last chapter ends at its own start.
pub fn synthesize_chapters(mut tracks: Vec<(u64, String)>) -> Vec<Chapter> {
    tracks.sort_by_key(|(offset, _)| *offset);

    let starts: Vec<u64> = tracks.iter().map(|(offset, _)| *offset).collect();

    tracks
        .into_iter()
        .enumerate()
        .map(|(i, (start, title))| Chapter {
            start,
            end: starts.get(i + 1).copied().unwrap_or(start),
            title,
        })
        .collect()
}
