pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod ledger;
pub mod lookup;
pub mod metadata;
pub mod pipeline;
pub mod playlist;
pub mod progress;
pub mod sync;
pub mod tools;
pub mod tracklist;

// Re-export main types for convenience
pub use config::{Config, DEFAULT_CONFIG_PATH, Subscription};
pub use error::{
    AcquisitionError, ConfigError, DecodeError, DownloadError, EpisodeError, FeedError,
    LedgerError, LookupError, PlacementError, PlaylistError, ProviderError, SyncError, ToolError,
};
pub use feed::{Channel, Enclosure, Item, is_url, load_feed, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use ledger::DownloadLedger;
pub use lookup::lookup_feed_url;
pub use pipeline::{
    EpisodeOutcome, EpisodePipeline, PipelineSettings, PipelineStep, RecencyGate, SkipReason,
};
pub use progress::{
    LogReporter, NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter,
};
pub use sync::{RunSummary, SubscriptionSummary, sync_library, sync_subscription};
pub use tools::{ExternalTools, MediaTools};
pub use tracklist::{Chapter, ProviderKind, ThousandAndOneTracklists, TracklistProvider};
