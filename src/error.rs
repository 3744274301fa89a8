// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineStep;

/// Errors that can occur when loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while decoding a feed document into a channel
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed feed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Feed document has no root element")]
    Empty,

    #[error("Required tag '{0}' missing")]
    MissingChannelField(&'static str),

    #[error("Item #{index} is missing required field '{field}'")]
    MissingItemField { index: usize, field: &'static str },

    #[error("Failed to parse date '{date_str}' as RFC 2822: {reason}")]
    InvalidDate { date_str: String, reason: String },
}

/// Errors that can occur when fetching or decoding feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode feed: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors that can occur while downloading a file into a workspace
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} produced no data")]
    Empty { url: String },

    #[error("Download target {path} is missing after download")]
    Missing { path: PathBuf },
}

/// Errors raised by an external media tool invocation
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Errors raised by a tracklist provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Tracklist request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to set up tracklist HTTP client: {0}")]
    ClientSetup(#[source] reqwest::Error),

    #[error("Tracklist service returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Tracklist service blocked the request to {url}")]
    Blocked { url: String },

    #[error("Unexpected tracklist page structure: {0}")]
    Structure(String),

    #[error("Invalid cue offset '{value}' in tracklist")]
    InvalidOffset { value: String },

    #[error("Invalid tracklist URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors of the download ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to read ledger {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write ledger {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while moving a finished episode into the library
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while updating an M3U playlist
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Failed to read playlist {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write playlist {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Playlist item {0} does not exist in the library")]
    MissingItem(PathBuf),
}

/// Errors while acquiring the media of an episode into its workspace
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Unable to create workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cover art download failed: {0}")]
    CoverArt(#[source] DownloadError),

    #[error("Cover art conversion failed: {0}")]
    CoverConversion(#[source] ToolError),

    #[error("Cover art conversion produced no output at {path}")]
    CoverMissing { path: PathBuf },

    #[error("Unable to remove original cover art {path}: {source}")]
    CoverCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Enclosure download failed: {0}")]
    Enclosure(#[source] DownloadError),
}

/// A hard failure of the episode pipeline
#[derive(Error, Debug)]
pub enum EpisodeError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("{step} failed: {source}")]
    Tool {
        step: PipelineStep,
        #[source]
        source: ToolError,
    },

    #[error("{step} produced no output at {path}")]
    MissingOutput { step: PipelineStep, path: PathBuf },

    #[error("Workspace file operation on {path} failed: {source}")]
    WorkspaceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tracklist found for '{query}'")]
    TracklistNotFound { query: String },

    #[error("Tracklist lookup failed: {0}")]
    Tracklist(#[source] ProviderError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Top-level errors for a library run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to create library directory {path}: {source}")]
    CreateLibraryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Episode '{title}' failed: {source}")]
    Episode {
        title: String,
        #[source]
        source: EpisodeError,
    },
}

/// Errors of the iTunes feed URL lookup
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("No podcast id (/id<digits>) found in '{0}'")]
    MissingId(String),

    #[error("iTunes lookup request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),

    #[error("iTunes lookup response is invalid: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Expected exactly one lookup result, got {0}")]
    UnexpectedResultCount(usize),

    #[error("Lookup result has no feed URL")]
    MissingFeedUrl,
}
