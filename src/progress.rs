use std::path::PathBuf;
use std::sync::Arc;

use crate::episode::DownloadKind;
use crate::pipeline::{PipelineStep, SkipReason};
use crate::sync::{RunSummary, SubscriptionSummary};

/// Events emitted during a library run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A run over the configured subscriptions begins
    RunStarted { subscriptions: usize },

    /// A subscription is switched off in the configuration
    SubscriptionDisabled { title: String },

    /// Feed is being fetched from URL or read from a file
    FetchingFeed { subscription: String, source: String },

    /// Feed could not be fetched or decoded; the subscription is skipped
    FeedSkipped { subscription: String, error: String },

    /// Feed has been decoded successfully
    FeedParsed {
        podcast_title: String,
        total_episodes: usize,
        /// The feed declares the Spotify namespace
        spotify: bool,
    },

    /// The publisher announced a new location for the feed
    FeedUrlChanged {
        subscription: String,
        current_url: String,
        new_url: String,
    },

    /// The publisher marked the feed as complete; no new episodes will follow
    FeedCompleted { podcast_title: String },

    /// An episode was not processed
    EpisodeSkipped {
        episode_title: String,
        reason: SkipReason,
    },

    /// Processing of a new episode begins in a fresh workspace
    EpisodeStarting {
        episode_title: String,
        workspace: PathBuf,
    },

    /// A download is starting
    DownloadStarting {
        kind: DownloadKind,
        url: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        kind: DownloadKind,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        kind: DownloadKind,
        bytes_downloaded: u64,
    },

    /// A processing step produced its output
    StepCompleted { step: PipelineStep },

    /// The tracklist provider found a matching tracklist page
    TracklistFound { url: String },

    /// Chapters from an external tracklist will be merged
    TracklistMerged { chapters: usize },

    /// Tracklist lookup failed; processing continues without chapters
    TracklistUnavailable { query: String, error: String },

    /// The finished artifact was moved into the library
    EpisodePlaced { destination: PathBuf },

    /// A playlist was checked for the new artifact
    PlaylistUpdated { playlist: PathBuf, added: bool },

    /// Episode processed and recorded in the ledger
    EpisodeCompleted {
        episode_title: String,
        destination: PathBuf,
    },

    /// Episode processing failed; the run stops
    EpisodeFailed { episode_title: String, error: String },

    /// All items of a subscription's feed have been handled
    SubscriptionCompleted { summary: SubscriptionSummary },

    /// The run finished without a fatal error
    RunCompleted { summary: RunSummary },
}

/// Trait for reporting progress events during a library run.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Reporter that turns every event into a `tracing` event
///
/// Used for non-interactive output, e.g. when running from cron.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl LogReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { subscriptions } => {
                tracing::info!(subscriptions, "Starting library run");
            }
            ProgressEvent::SubscriptionDisabled { title } => {
                tracing::info!(subscription = %title, "Subscription disabled, skipping");
            }
            ProgressEvent::FetchingFeed {
                subscription,
                source,
            } => {
                tracing::info!(%subscription, %source, "Fetching feed");
            }
            ProgressEvent::FeedSkipped {
                subscription,
                error,
            } => {
                tracing::warn!(%subscription, %error, "Skipping feed");
            }
            ProgressEvent::FeedParsed {
                podcast_title,
                total_episodes,
                spotify,
            } => {
                tracing::info!(podcast = %podcast_title, total_episodes, spotify, "Feed parsed");
            }
            ProgressEvent::FeedUrlChanged {
                subscription,
                current_url,
                new_url,
            } => {
                tracing::warn!(
                    %subscription,
                    %current_url,
                    %new_url,
                    "Feed moved, please update the subscription's feed_url"
                );
            }
            ProgressEvent::FeedCompleted { podcast_title } => {
                tracing::warn!(
                    podcast = %podcast_title,
                    "Feed is marked complete, consider disabling the subscription"
                );
            }
            ProgressEvent::EpisodeSkipped {
                episode_title,
                reason,
            } => {
                tracing::info!(episode = %episode_title, %reason, "Episode skipped");
            }
            ProgressEvent::EpisodeStarting {
                episode_title,
                workspace,
            } => {
                tracing::info!(
                    episode = %episode_title,
                    workspace = %workspace.display(),
                    "Starting episode"
                );
            }
            ProgressEvent::DownloadStarting {
                kind,
                url,
                content_length,
            } => {
                tracing::info!(%kind, %url, ?content_length, "Downloading");
            }
            ProgressEvent::DownloadProgress {
                kind,
                bytes_downloaded,
                total_bytes,
            } => {
                tracing::trace!(%kind, bytes_downloaded, ?total_bytes, "Download progress");
            }
            ProgressEvent::DownloadCompleted {
                kind,
                bytes_downloaded,
            } => {
                tracing::info!(%kind, bytes_downloaded, "Download complete");
            }
            ProgressEvent::StepCompleted { step } => {
                tracing::info!(%step, "Step successful");
            }
            ProgressEvent::TracklistFound { url } => {
                tracing::info!(%url, "Found tracklist");
            }
            ProgressEvent::TracklistMerged { chapters } => {
                tracing::info!(chapters, "Merging tracklist chapters");
            }
            ProgressEvent::TracklistUnavailable { query, error } => {
                tracing::warn!(%query, %error, "Tracklist unavailable, continuing without chapters");
            }
            ProgressEvent::EpisodePlaced { destination } => {
                tracing::info!(destination = %destination.display(), "Moved episode into library");
            }
            ProgressEvent::PlaylistUpdated { playlist, added } => {
                tracing::info!(playlist = %playlist.display(), added, "Playlist updated");
            }
            ProgressEvent::EpisodeCompleted {
                episode_title,
                destination,
            } => {
                tracing::info!(
                    episode = %episode_title,
                    destination = %destination.display(),
                    "Episode complete"
                );
            }
            ProgressEvent::EpisodeFailed {
                episode_title,
                error,
            } => {
                tracing::error!(episode = %episode_title, %error, "Episode failed");
            }
            ProgressEvent::SubscriptionCompleted { summary } => {
                tracing::info!(
                    subscription = %summary.title,
                    completed = summary.completed,
                    already_downloaded = summary.already_downloaded,
                    not_recent = summary.not_recent,
                    "Subscription done"
                );
            }
            ProgressEvent::RunCompleted { summary } => {
                tracing::info!(
                    completed = summary.completed(),
                    already_downloaded = summary.already_downloaded(),
                    not_recent = summary.not_recent(),
                    feeds_skipped = summary.feeds_skipped,
                    "Run complete"
                );
            }
        }
    }
}
