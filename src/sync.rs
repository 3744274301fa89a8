// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::Subscription;
use crate::error::SyncError;
use crate::feed::load_feed;
use crate::http::HttpClient;
use crate::ledger::DownloadLedger;
use crate::pipeline::{EpisodeOutcome, EpisodePipeline, RecencyGate, SkipReason};
use crate::progress::ProgressEvent;

/// Outcome counts for one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSummary {
    pub title: String,
    /// Episodes downloaded, converted and placed in this run
    pub completed: usize,
    pub already_downloaded: usize,
    /// Episodes recorded without download because of the `recent` limit
    pub not_recent: usize,
}

/// Result of a library run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub subscriptions: Vec<SubscriptionSummary>,
    /// Subscriptions switched off in the configuration
    pub disabled: usize,
    /// Subscriptions whose feed could not be fetched or decoded
    pub feeds_skipped: usize,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.subscriptions.iter().map(|s| s.completed).sum()
    }

    pub fn already_downloaded(&self) -> usize {
        self.subscriptions.iter().map(|s| s.already_downloaded).sum()
    }

    pub fn not_recent(&self) -> usize {
        self.subscriptions.iter().map(|s| s.not_recent).sum()
    }
}

/// Process every enabled subscription into the library, one after another
///
/// This is the main entry point for the library. It:
/// 1. Creates the library directory and opens its ledger
/// 2. Fetches and decodes each subscription's feed, skipping broken feeds
/// 3. Runs every feed item through the episode pipeline in document order
///
/// The first episode failure ends the run; episodes completed before it stay
/// in the library and the ledger.
pub async fn sync_library<C: HttpClient>(
    pipeline: &EpisodePipeline<C>,
    subscriptions: &[Subscription],
) -> Result<RunSummary, SyncError> {
    let reporter = pipeline.reporter();
    let library_dir = &pipeline.settings().library_dir;

    tokio::fs::create_dir_all(library_dir)
        .await
        .map_err(|e| SyncError::CreateLibraryFailed {
            path: library_dir.clone(),
            source: e,
        })?;

    let mut ledger = DownloadLedger::open(library_dir)?;

    reporter.report(ProgressEvent::RunStarted {
        subscriptions: subscriptions.len(),
    });

    let mut summary = RunSummary::default();

    for subscription in subscriptions {
        if !subscription.enabled {
            reporter.report(ProgressEvent::SubscriptionDisabled {
                title: subscription.title.clone(),
            });
            summary.disabled += 1;
            continue;
        }

        match sync_subscription(pipeline, &mut ledger, subscription).await? {
            Some(subscription_summary) => summary.subscriptions.push(subscription_summary),
            None => summary.feeds_skipped += 1,
        }
    }

    reporter.report(ProgressEvent::RunCompleted {
        summary: summary.clone(),
    });

    Ok(summary)
}

/// Process all items of one subscription's feed
///
/// Returns `Ok(None)` when the feed could not be fetched or decoded.
pub async fn sync_subscription<C: HttpClient>(
    pipeline: &EpisodePipeline<C>,
    ledger: &mut DownloadLedger,
    subscription: &Subscription,
) -> Result<Option<SubscriptionSummary>, SyncError> {
    let reporter = pipeline.reporter();

    reporter.report(ProgressEvent::FetchingFeed {
        subscription: subscription.title.clone(),
        source: subscription.feed_url.clone(),
    });

    let channel = match load_feed(pipeline.client(), &subscription.feed_url).await {
        Ok(channel) => channel,
        Err(e) => {
            reporter.report(ProgressEvent::FeedSkipped {
                subscription: subscription.title.clone(),
                error: e.to_string(),
            });
            return Ok(None);
        }
    };

    reporter.report(ProgressEvent::FeedParsed {
        podcast_title: channel.title.clone(),
        total_episodes: channel.items.len(),
        spotify: channel.spotify,
    });

    if let Some(new_url) = &channel.new_feed_url
        && new_url != &subscription.feed_url
    {
        reporter.report(ProgressEvent::FeedUrlChanged {
            subscription: subscription.title.clone(),
            current_url: subscription.feed_url.clone(),
            new_url: new_url.clone(),
        });
    }

    if channel.completed == Some(true) {
        reporter.report(ProgressEvent::FeedCompleted {
            podcast_title: channel.title.clone(),
        });
    }

    let mut summary = SubscriptionSummary {
        title: subscription.title.clone(),
        ..SubscriptionSummary::default()
    };
    let mut gate = RecencyGate::new(subscription.recent);

    for item in &channel.items {
        let outcome = pipeline
            .process_item(ledger, &mut gate, subscription, &channel, item)
            .await;

        match outcome {
            Ok(EpisodeOutcome::Completed { .. }) => summary.completed += 1,
            Ok(EpisodeOutcome::Skipped(SkipReason::AlreadyDownloaded)) => {
                summary.already_downloaded += 1
            }
            Ok(EpisodeOutcome::Skipped(SkipReason::NotRecent)) => summary.not_recent += 1,
            Err(e) => {
                reporter.report(ProgressEvent::EpisodeFailed {
                    episode_title: item.title.clone(),
                    error: e.to_string(),
                });
                return Err(SyncError::Episode {
                    title: item.title.clone(),
                    source: e,
                });
            }
        }
    }

    reporter.report(ProgressEvent::SubscriptionCompleted {
        summary: summary.clone(),
    });

    Ok(Some(summary))
}
