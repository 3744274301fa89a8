// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, Subscription};
use crate::episode::{
    DownloadKind, Workspace, artifact_filename, destination_dir, download_to_file,
    playlist_filename,
};
use crate::error::{AcquisitionError, EpisodeError, PlacementError};
use crate::feed::{Channel, Item};
use crate::http::HttpClient;
use crate::ledger::DownloadLedger;
use crate::metadata::build_ffmetadata;
use crate::playlist::add_item_if_missing;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::tools::MediaTools;
use crate::tracklist::{Chapter, TracklistProvider};

/// File name of the cover art copied next to each artifact
const COVER_FILENAME: &str = "cover.png";

/// Processing steps that run an external tool on the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    CoverConversion,
    Transcode,
    MetadataMerge,
    CoverAttach,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::CoverConversion => write!(f, "Cover art conversion"),
            PipelineStep::Transcode => write!(f, "Matroska conversion"),
            PipelineStep::MetadataMerge => write!(f, "Metadata merge"),
            PipelineStep::CoverAttach => write!(f, "Cover art attachment"),
        }
    }
}

/// Why an item was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The enclosure URL is already in the ledger
    AlreadyDownloaded,
    /// The item lies beyond the subscription's `recent` limit
    NotRecent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyDownloaded => write!(f, "already downloaded"),
            SkipReason::NotRecent => write!(f, "not recent"),
        }
    }
}

/// Result of running the pipeline on one feed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Completed { destination: PathBuf },
    Skipped(SkipReason),
}

/// Counts feed positions against a subscription's `recent` limit
///
/// Every item advances the position, whether or not it was downloaded
/// before, so the limit applies to the first `recent` items of the feed.
#[derive(Debug, Clone)]
pub struct RecencyGate {
    limit: Option<usize>,
    position: usize,
}

impl RecencyGate {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, position: 0 }
    }

    /// Advance to the next item; returns whether it is within the limit
    pub fn admit(&mut self) -> bool {
        self.position += 1;
        self.limit.is_none_or(|limit| self.position <= limit)
    }
}

/// Library-wide settings the pipeline works with
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub library_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub episode_directories: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            library_dir: config.library_directory.clone(),
            workspace_root: config.workspace_root(),
            episode_directories: config.episode_directories,
        }
    }
}

/// Per-episode state machine: gate, acquire, convert, enrich, place, commit
pub struct EpisodePipeline<C: HttpClient> {
    client: C,
    tools: Box<dyn MediaTools>,
    tracklists: Box<dyn TracklistProvider>,
    settings: PipelineSettings,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient> EpisodePipeline<C> {
    pub fn new(
        client: C,
        tools: Box<dyn MediaTools>,
        tracklists: Box<dyn TracklistProvider>,
        settings: PipelineSettings,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            client,
            tools,
            tracklists,
            settings,
            reporter,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn reporter(&self) -> &SharedProgressReporter {
        &self.reporter
    }

    /// Run one feed item through the pipeline
    ///
    /// The ledger is only written for items skipped as not recent and for
    /// items that were completely placed in the library. On error the
    /// episode's workspace is left on disk.
    pub async fn process_item(
        &self,
        ledger: &mut DownloadLedger,
        gate: &mut RecencyGate,
        subscription: &Subscription,
        channel: &Channel,
        item: &Item,
    ) -> Result<EpisodeOutcome, EpisodeError> {
        let url = item.enclosure.url.as_str();
        let recent = gate.admit();

        if ledger.contains(url) {
            return Ok(self.skip(item, SkipReason::AlreadyDownloaded));
        }

        if !recent {
            ledger.record(url)?;
            return Ok(self.skip(item, SkipReason::NotRecent));
        }

        let workspace = Workspace::create(&self.settings.workspace_root)?;
        self.reporter.report(ProgressEvent::EpisodeStarting {
            episode_title: item.title.clone(),
            workspace: workspace.path().to_path_buf(),
        });

        self.acquire(&workspace, channel, item).await?;
        self.transcode(&workspace).await?;
        let chapters = self.enrich(subscription, channel, item).await?;
        self.merge_metadata(&workspace, channel, item, &chapters)
            .await?;
        if workspace.cover_png().exists() {
            self.attach_cover(&workspace).await?;
        }

        let destination = self.place(&workspace, channel, item).await?;
        self.reporter.report(ProgressEvent::EpisodePlaced {
            destination: destination.clone(),
        });

        if subscription.create_playlist {
            self.update_playlist(channel, &destination)?;
        }

        ledger.record(url)?;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.remove() {
            tracing::warn!(
                workspace = %workspace_path.display(),
                error = %e,
                "Unable to remove workspace"
            );
        }

        self.reporter.report(ProgressEvent::EpisodeCompleted {
            episode_title: item.title.clone(),
            destination: destination.clone(),
        });

        Ok(EpisodeOutcome::Completed { destination })
    }

    fn skip(&self, item: &Item, reason: SkipReason) -> EpisodeOutcome {
        self.reporter.report(ProgressEvent::EpisodeSkipped {
            episode_title: item.title.clone(),
            reason,
        });
        EpisodeOutcome::Skipped(reason)
    }

    /// Download artwork and enclosure into the workspace
    async fn acquire(
        &self,
        workspace: &Workspace,
        channel: &Channel,
        item: &Item,
    ) -> Result<(), EpisodeError> {
        let artwork = item
            .image_url
            .as_deref()
            .or(channel.image_url.as_deref());

        if let Some(artwork_url) = artwork {
            let cover = workspace.cover();
            download_to_file(
                &self.client,
                artwork_url,
                &cover,
                DownloadKind::CoverArt,
                &self.reporter,
            )
            .await
            .map_err(AcquisitionError::CoverArt)?;

            self.tools
                .convert_image(&cover, &workspace.cover_png())
                .await
                .map_err(AcquisitionError::CoverConversion)?;

            if !workspace.cover_png().exists() {
                return Err(AcquisitionError::CoverMissing {
                    path: workspace.cover_png(),
                }
                .into());
            }

            tokio::fs::remove_file(&cover)
                .await
                .map_err(|e| AcquisitionError::CoverCleanup {
                    path: cover.clone(),
                    source: e,
                })?;

            self.reporter.report(ProgressEvent::StepCompleted {
                step: PipelineStep::CoverConversion,
            });
        }

        download_to_file(
            &self.client,
            &item.enclosure.url,
            &workspace.audio(),
            DownloadKind::Enclosure,
            &self.reporter,
        )
        .await
        .map_err(AcquisitionError::Enclosure)?;

        Ok(())
    }

    async fn transcode(&self, workspace: &Workspace) -> Result<(), EpisodeError> {
        let step = PipelineStep::Transcode;
        self.tools
            .remux(&workspace.audio(), &workspace.audio_next())
            .await
            .map_err(|e| EpisodeError::Tool { step, source: e })?;

        self.promote(workspace, step)
    }

    /// Look up chapters for the episode if the subscription asks for them
    ///
    /// A failed lookup only fails the episode when the merge is critical.
    async fn enrich(
        &self,
        subscription: &Subscription,
        channel: &Channel,
        item: &Item,
    ) -> Result<Vec<Chapter>, EpisodeError> {
        if !subscription.external_tracklist_merge_enabled {
            return Ok(Vec::new());
        }

        let query = format!("{} {}", channel.title, item.title);

        match self.lookup_chapters(&query).await {
            Ok(chapters) => {
                self.reporter.report(ProgressEvent::TracklistMerged {
                    chapters: chapters.len(),
                });
                Ok(chapters)
            }
            Err(e) if subscription.external_tracklist_merge_critical => Err(e),
            Err(e) => {
                self.reporter.report(ProgressEvent::TracklistUnavailable {
                    query,
                    error: e.to_string(),
                });
                Ok(Vec::new())
            }
        }
    }

    async fn lookup_chapters(&self, query: &str) -> Result<Vec<Chapter>, EpisodeError> {
        let url = self
            .tracklists
            .search(query)
            .await
            .map_err(EpisodeError::Tracklist)?
            .ok_or_else(|| EpisodeError::TracklistNotFound {
                query: query.to_string(),
            })?;

        self.reporter
            .report(ProgressEvent::TracklistFound { url: url.clone() });

        self.tracklists
            .get(&url)
            .await
            .map_err(EpisodeError::Tracklist)
    }

    async fn merge_metadata(
        &self,
        workspace: &Workspace,
        channel: &Channel,
        item: &Item,
        chapters: &[Chapter],
    ) -> Result<(), EpisodeError> {
        let step = PipelineStep::MetadataMerge;
        let metadata_path = workspace.metadata();

        tokio::fs::write(&metadata_path, build_ffmetadata(item, channel, chapters))
            .await
            .map_err(|e| EpisodeError::WorkspaceIo {
                path: metadata_path.clone(),
                source: e,
            })?;

        self.tools
            .merge_metadata(&workspace.audio(), &metadata_path, &workspace.audio_next())
            .await
            .map_err(|e| EpisodeError::Tool { step, source: e })?;

        self.promote(workspace, step)
    }

    async fn attach_cover(&self, workspace: &Workspace) -> Result<(), EpisodeError> {
        let step = PipelineStep::CoverAttach;
        self.tools
            .attach_cover(
                &workspace.audio(),
                &workspace.cover_png(),
                &workspace.audio_next(),
            )
            .await
            .map_err(|e| EpisodeError::Tool { step, source: e })?;

        self.promote(workspace, step)
    }

    /// Make the output of a step the new `audio`
    fn promote(&self, workspace: &Workspace, step: PipelineStep) -> Result<(), EpisodeError> {
        let output = workspace.audio_next();
        if !output.exists() {
            return Err(EpisodeError::MissingOutput { step, path: output });
        }

        workspace
            .promote_next()
            .map_err(|e| EpisodeError::WorkspaceIo {
                path: output,
                source: e,
            })?;

        self.reporter.report(ProgressEvent::StepCompleted { step });
        Ok(())
    }

    /// Move the artifact (and cover art) to its place in the library
    async fn place(
        &self,
        workspace: &Workspace,
        channel: &Channel,
        item: &Item,
    ) -> Result<PathBuf, PlacementError> {
        let directory = destination_dir(
            &self.settings.library_dir,
            &channel.title,
            &item.title,
            self.settings.episode_directories,
        );

        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| PlacementError::CreateDirectoryFailed {
                path: directory.clone(),
                source: e,
            })?;

        let destination = directory.join(artifact_filename(&channel.title, &item.title));
        move_file(&workspace.audio(), &destination).await?;

        let cover = workspace.cover_png();
        if cover.exists() {
            let cover_destination = directory.join(COVER_FILENAME);
            tokio::fs::copy(&cover, &cover_destination)
                .await
                .map_err(|e| PlacementError::CopyFailed {
                    from: cover.clone(),
                    to: cover_destination.clone(),
                    source: e,
                })?;
        }

        Ok(destination)
    }

    fn update_playlist(&self, channel: &Channel, destination: &Path) -> Result<(), EpisodeError> {
        let library_dir = &self.settings.library_dir;
        let playlist = playlist_filename(&channel.title);
        let relative = destination.strip_prefix(library_dir).unwrap_or(destination);

        let added = add_item_if_missing(library_dir, &playlist, relative)?;

        self.reporter.report(ProgressEvent::PlaylistUpdated {
            playlist: library_dir.join(playlist),
            added,
        });
        Ok(())
    }
}

/// Rename a file, copying it when source and target are on different filesystems
async fn move_file(from: &Path, to: &Path) -> Result<(), PlacementError> {
    if let Err(e) = tokio::fs::rename(from, to).await {
        tracing::debug!(
            from = %from.display(),
            to = %to.display(),
            error = %e,
            "Rename failed, falling back to copy"
        );

        tokio::fs::copy(from, to)
            .await
            .map_err(|e| PlacementError::CopyFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: e,
            })?;

        tokio::fs::remove_file(from)
            .await
            .map_err(|e| PlacementError::MoveFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: e,
            })?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{DownloadError, ProviderError, ToolError};
    use crate::feed::Enclosure;
    use crate::http::{ByteStream, HttpResponse};
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};

    /// Serves fixed bodies by URL and remembers what was requested
    #[derive(Default)]
    pub(crate) struct MockHttpClient {
        pub bodies: HashMap<String, Vec<u8>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(Bytes::from(self.bodies.get(url).cloned().unwrap_or_default()))
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.requested.lock().unwrap().push(url.to_string());
            let (status, data) = match self.bodies.get(url) {
                Some(body) => (200, body.clone()),
                None => (404, Vec::new()),
            };
            let len = data.len() as u64;
            let stream: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

            Ok(HttpResponse {
                status,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    /// What the fake tools were asked to do
    #[derive(Default)]
    pub(crate) struct ToolLog {
        pub metadata: Vec<String>,
        pub covers_attached: usize,
    }

    /// Copies input to output instead of running real tools
    #[derive(Clone, Default)]
    pub(crate) struct FakeTools {
        pub log: Arc<Mutex<ToolLog>>,
        /// Step that exits successfully without writing its output
        pub silent_step: Option<PipelineStep>,
    }

    impl FakeTools {
        fn copy(&self, step: PipelineStep, input: &Path, output: &Path) -> Result<(), ToolError> {
            if self.silent_step == Some(step) {
                return Ok(());
            }
            std::fs::copy(input, output).map_err(|e| ToolError::SpawnFailed {
                program: "fake".to_string(),
                source: e,
            })?;
            Ok(())
        }
    }

    #[async_trait]
    impl MediaTools for FakeTools {
        async fn convert_image(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
            self.copy(PipelineStep::CoverConversion, input, output)
        }

        async fn remux(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
            self.copy(PipelineStep::Transcode, input, output)
        }

        async fn merge_metadata(
            &self,
            input: &Path,
            metadata: &Path,
            output: &Path,
        ) -> Result<(), ToolError> {
            let document = std::fs::read_to_string(metadata).unwrap();
            self.log.lock().unwrap().metadata.push(document);
            self.copy(PipelineStep::MetadataMerge, input, output)
        }

        async fn attach_cover(
            &self,
            input: &Path,
            cover: &Path,
            output: &Path,
        ) -> Result<(), ToolError> {
            assert!(cover.exists());
            self.log.lock().unwrap().covers_attached += 1;
            self.copy(PipelineStep::CoverAttach, input, output)
        }
    }

    /// Tracklist provider with canned answers
    pub(crate) enum StubTracklists {
        Found(Vec<Chapter>),
        NotFound,
        Failing,
    }

    #[async_trait]
    impl TracklistProvider for StubTracklists {
        async fn search(&self, _query: &str) -> Result<Option<String>, ProviderError> {
            match self {
                StubTracklists::Found(_) => Ok(Some("https://tracklists.test/1".to_string())),
                StubTracklists::NotFound => Ok(None),
                StubTracklists::Failing => Err(ProviderError::Blocked {
                    url: "https://tracklists.test/search".to_string(),
                }),
            }
        }

        async fn get(&self, _url: &str) -> Result<Vec<Chapter>, ProviderError> {
            match self {
                StubTracklists::Found(chapters) => Ok(chapters.clone()),
                _ => Err(ProviderError::Structure("no items".to_string())),
            }
        }
    }

    pub(crate) fn channel(items: Vec<Item>) -> Channel {
        Channel {
            title: "Clublife".to_string(),
            subtitle: None,
            description: "Weekly radio show".to_string(),
            image_url: Some("https://example.com/channel.jpg".to_string()),
            language: "en".to_string(),
            author: Some("Tiësto".to_string()),
            link: None,
            copyright: None,
            completed: None,
            new_feed_url: None,
            spotify: false,
            items,
        }
    }

    pub(crate) fn item(title: &str, url: &str) -> Item {
        Item {
            title: title.to_string(),
            enclosure: Enclosure {
                url: url.to_string(),
                length: "5".to_string(),
                mime_type: "audio/mpeg".to_string(),
            },
            pub_date: None,
            description: None,
            link: None,
            image_url: None,
        }
    }

    struct Fixture {
        library: TempDir,
        workspaces: TempDir,
        tools: FakeTools,
        pipeline: EpisodePipeline<MockHttpClient>,
    }

    fn fixture(client: MockHttpClient, tools: FakeTools, tracklists: StubTracklists) -> Fixture {
        fixture_with_layout(client, tools, tracklists, true)
    }

    fn fixture_with_layout(
        client: MockHttpClient,
        tools: FakeTools,
        tracklists: StubTracklists,
        episode_directories: bool,
    ) -> Fixture {
        let library = tempdir().unwrap();
        let workspaces = tempdir().unwrap();
        let settings = PipelineSettings {
            library_dir: library.path().to_path_buf(),
            workspace_root: workspaces.path().to_path_buf(),
            episode_directories,
        };
        let pipeline = EpisodePipeline::new(
            client,
            Box::new(tools.clone()),
            Box::new(tracklists),
            settings,
            NoopReporter::shared(),
        );
        Fixture {
            library,
            workspaces,
            tools,
            pipeline,
        }
    }

    fn default_client() -> MockHttpClient {
        MockHttpClient::default()
            .with("https://example.com/channel.jpg", b"JPEGDATA")
            .with("https://example.com/1.mp3", b"AUDIO1")
            .with("https://example.com/2.mp3", b"AUDIO2")
            .with("https://example.com/3.mp3", b"AUDIO3")
    }

    fn workspace_count(fixture: &Fixture) -> usize {
        std::fs::read_dir(fixture.workspaces.path()).unwrap().count()
    }

    #[tokio::test]
    async fn completes_new_episode() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::NotFound);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();
        let mut gate = RecencyGate::new(None);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);

        let outcome = f
            .pipeline
            .process_item(&mut ledger, &mut gate, &subscription, &channel, &episode)
            .await
            .unwrap();

        let expected = f
            .library
            .path()
            .join("Clublife/Episode 1/Clublife - Episode 1.mka");
        assert_eq!(
            outcome,
            EpisodeOutcome::Completed {
                destination: expected.clone()
            }
        );
        assert_eq!(std::fs::read(&expected).unwrap(), b"AUDIO1");
        assert_eq!(
            std::fs::read(f.library.path().join("Clublife/Episode 1/cover.png")).unwrap(),
            b"JPEGDATA"
        );
        assert!(ledger.contains("https://example.com/1.mp3"));
        assert_eq!(workspace_count(&f), 0);

        let log = f.tools.log.lock().unwrap();
        assert_eq!(log.covers_attached, 1);
        assert!(log.metadata[0].starts_with(";FFMETADATA1\ntitle=Episode 1\n"));
        assert!(!log.metadata[0].contains("[CHAPTER]"));
    }

    #[tokio::test]
    async fn completed_episode_is_skipped_on_rerun() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);

        {
            let mut ledger = DownloadLedger::open(f.library.path()).unwrap();
            f.pipeline
                .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
                .await
                .unwrap();
        }

        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();
        let outcome = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await
            .unwrap();

        assert_eq!(outcome, EpisodeOutcome::Skipped(SkipReason::AlreadyDownloaded));
        assert_eq!(workspace_count(&f), 0);
    }

    #[tokio::test]
    async fn recent_limit_records_older_items() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::NotFound);
        let mut subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        subscription.recent = Some(2);
        let items = vec![
            item("Episode 3", "https://example.com/3.mp3"),
            item("Episode 2", "https://example.com/2.mp3"),
            item("Episode 1", "https://example.com/1.mp3"),
        ];
        let channel = channel(items.clone());

        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();
        let mut gate = RecencyGate::new(subscription.recent);
        let mut outcomes = Vec::new();
        for episode in &items {
            outcomes.push(
                f.pipeline
                    .process_item(&mut ledger, &mut gate, &subscription, &channel, episode)
                    .await
                    .unwrap(),
            );
        }

        assert!(matches!(outcomes[0], EpisodeOutcome::Completed { .. }));
        assert!(matches!(outcomes[1], EpisodeOutcome::Completed { .. }));
        assert_eq!(outcomes[2], EpisodeOutcome::Skipped(SkipReason::NotRecent));
        assert!(ledger.contains("https://example.com/1.mp3"));
        assert!(
            !f.library
                .path()
                .join("Clublife/Episode 1")
                .exists()
        );

        let mut gate = RecencyGate::new(subscription.recent);
        for episode in &items {
            let outcome = f
                .pipeline
                .process_item(&mut ledger, &mut gate, &subscription, &channel, episode)
                .await
                .unwrap();
            assert_eq!(outcome, EpisodeOutcome::Skipped(SkipReason::AlreadyDownloaded));
        }
    }

    #[tokio::test]
    async fn critical_tracklist_failure_fails_episode() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::NotFound);
        let mut subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        subscription.external_tracklist_merge_enabled = true;
        subscription.external_tracklist_merge_critical = true;
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let result = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await;

        match result.unwrap_err() {
            EpisodeError::TracklistNotFound { query } => {
                assert_eq!(query, "Clublife Episode 1")
            }
            other => panic!("Expected TracklistNotFound, got {other:?}"),
        }
        assert!(!ledger.contains("https://example.com/1.mp3"));
        assert_eq!(workspace_count(&f), 1);
        assert!(!f.library.path().join("Clublife").exists());
    }

    #[tokio::test]
    async fn non_critical_tracklist_failure_continues() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::Failing);
        let mut subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        subscription.external_tracklist_merge_enabled = true;
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let outcome = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await
            .unwrap();

        assert!(matches!(outcome, EpisodeOutcome::Completed { .. }));
        assert!(!f.tools.log.lock().unwrap().metadata[0].contains("[CHAPTER]"));
    }

    #[tokio::test]
    async fn tracklist_chapters_are_merged() {
        let chapters = vec![
            Chapter {
                start: 0,
                end: 60,
                title: "Intro".to_string(),
            },
            Chapter {
                start: 60,
                end: 60,
                title: "Track".to_string(),
            },
        ];
        let f = fixture(
            default_client(),
            FakeTools::default(),
            StubTracklists::Found(chapters),
        );
        let mut subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        subscription.external_tracklist_merge_enabled = true;
        subscription.external_tracklist_merge_critical = true;
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        f.pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await
            .unwrap();

        let log = f.tools.log.lock().unwrap();
        assert!(log.metadata[0].contains("[CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=60000\nTITLE=Intro\n"));
        assert!(log.metadata[0].contains("START=60000\nEND=60000\nTITLE=Track\n"));
    }

    #[tokio::test]
    async fn empty_enclosure_fails_acquisition() {
        let client = default_client().with("https://example.com/empty.mp3", b"");
        let f = fixture(client, FakeTools::default(), StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Empty", "https://example.com/empty.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let result = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await;

        assert!(matches!(
            result,
            Err(EpisodeError::Acquisition(AcquisitionError::Enclosure(
                DownloadError::Empty { .. }
            )))
        ));
        assert!(ledger.is_empty());
        assert_eq!(workspace_count(&f), 1);
    }

    #[tokio::test]
    async fn missing_artwork_fails_acquisition() {
        let client = MockHttpClient::default().with("https://example.com/1.mp3", b"AUDIO1");
        let f = fixture(client, FakeTools::default(), StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let result = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await;

        assert!(matches!(
            result,
            Err(EpisodeError::Acquisition(AcquisitionError::CoverArt(
                DownloadError::HttpStatus { status: 404, .. }
            )))
        ));
    }

    #[tokio::test]
    async fn item_artwork_wins_over_channel_artwork() {
        let client = default_client().with("https://example.com/item.png", b"ITEMART");
        let f = fixture(client, FakeTools::default(), StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let mut episode = item("Episode 1", "https://example.com/1.mp3");
        episode.image_url = Some("https://example.com/item.png".to_string());
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        f.pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await
            .unwrap();

        let requested = f.pipeline.client().requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            ["https://example.com/item.png", "https://example.com/1.mp3"]
        );
        assert_eq!(
            std::fs::read(f.library.path().join("Clublife/Episode 1/cover.png")).unwrap(),
            b"ITEMART"
        );
    }

    #[tokio::test]
    async fn no_artwork_skips_cover_steps() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let mut channel = channel(vec![episode.clone()]);
        channel.image_url = None;
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        f.pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await
            .unwrap();

        assert_eq!(f.tools.log.lock().unwrap().covers_attached, 0);
        assert!(!f.library.path().join("Clublife/Episode 1/cover.png").exists());
    }

    #[tokio::test]
    async fn missing_step_output_is_an_error() {
        let tools = FakeTools {
            silent_step: Some(PipelineStep::Transcode),
            ..FakeTools::default()
        };
        let f = fixture(default_client(), tools, StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let result = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await;

        assert!(matches!(
            result,
            Err(EpisodeError::MissingOutput {
                step: PipelineStep::Transcode,
                ..
            })
        ));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn missing_converted_cover_fails_acquisition() {
        let tools = FakeTools {
            silent_step: Some(PipelineStep::CoverConversion),
            ..FakeTools::default()
        };
        let f = fixture(default_client(), tools, StubTracklists::NotFound);
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let result = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await;

        match result.unwrap_err() {
            EpisodeError::Acquisition(AcquisitionError::CoverMissing { path }) => {
                assert!(path.ends_with("cover.png"))
            }
            other => panic!("Expected CoverMissing, got {other:?}"),
        }
        assert!(ledger.is_empty());
        assert_eq!(workspace_count(&f), 1);
    }

    #[tokio::test]
    async fn playlist_lists_new_episodes() {
        let f = fixture(default_client(), FakeTools::default(), StubTracklists::NotFound);
        let mut subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        subscription.create_playlist = true;
        let items = vec![
            item("Episode 2", "https://example.com/2.mp3"),
            item("Episode 1", "https://example.com/1.mp3"),
        ];
        let channel = channel(items.clone());
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();
        let mut gate = RecencyGate::new(None);

        for episode in &items {
            f.pipeline
                .process_item(&mut ledger, &mut gate, &subscription, &channel, episode)
                .await
                .unwrap();
        }

        assert_eq!(
            std::fs::read_to_string(f.library.path().join("Clublife.m3u")).unwrap(),
            "Clublife/Episode 2/Clublife - Episode 2.mka\nClublife/Episode 1/Clublife - Episode 1.mka\n"
        );
    }

    #[tokio::test]
    async fn flat_layout_places_in_channel_directory() {
        let f = fixture_with_layout(
            default_client(),
            FakeTools::default(),
            StubTracklists::NotFound,
            false,
        );
        let subscription = Subscription::new("Clublife", "https://example.com/feed.xml");
        let episode = item("Episode: 1", "https://example.com/1.mp3");
        let channel = channel(vec![episode.clone()]);
        let mut ledger = DownloadLedger::open(f.library.path()).unwrap();

        let outcome = f
            .pipeline
            .process_item(&mut ledger, &mut RecencyGate::new(None), &subscription, &channel, &episode)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EpisodeOutcome::Completed {
                destination: f.library.path().join("Clublife/Clublife - Episode- 1.mka")
            }
        );
    }

    #[tokio::test]
    async fn move_file_relocates_artifact() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("audio");
        std::fs::write(&from, b"data").unwrap();
        let to = dir.path().join("sub/artifact.mka");
        std::fs::create_dir_all(to.parent().unwrap()).unwrap();

        move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"data");
    }

    #[test]
    fn recency_gate_counts_positions() {
        let mut gate = RecencyGate::new(Some(2));
        assert!(gate.admit());
        assert!(gate.admit());
        assert!(!gate.admit());
        assert!(!gate.admit());

        let mut unlimited = RecencyGate::new(None);
        assert!((0..100).all(|_| unlimited.admit()));
    }
}
