use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podstash::episode::DownloadKind;
use podstash::{
    Config, DEFAULT_CONFIG_PATH, EpisodePipeline, ExternalTools, LogReporter, NoopReporter,
    PipelineSettings, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter,
    SkipReason, lookup_feed_url, sync_library,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "[>] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[?] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Fetch podcast episodes into a tagged Matroska library
#[derive(Parser, Debug)]
#[command(name = "podstash")]
#[command(about = "Fetch podcast episodes into a tagged Matroska library")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every enabled subscription of the configuration
    Run {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Quiet mode - suppress progress output
        #[arg(short, long, conflicts_with = "plain")]
        quiet: bool,

        /// Log progress as plain lines instead of progress bars
        #[arg(long)]
        plain: bool,
    },

    /// Print the RSS feed URL behind an Apple Podcasts URL
    Lookup {
        /// Podcast page URL, e.g. https://podcasts.apple.com/us/podcast/name/id123456
        url: String,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            download_bar: Mutex::new(None),
        }
    }

    fn start_download_bar(&self, kind: DownloadKind, content_length: Option<u64>) {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = self.multi.add(ProgressBar::new(content_length.unwrap_or(0)));
        bar.set_style(style);
        bar.set_message(kind.to_string());

        if let Ok(mut slot) = self.download_bar.lock()
            && let Some(previous) = slot.replace(bar)
        {
            previous.finish_and_clear();
        }
    }

    fn with_download_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.download_bar.lock()
            && let Some(bar) = slot.as_ref()
        {
            f(bar);
        }
    }

    fn finish_download_bar(&self) {
        if let Ok(mut slot) = self.download_bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }

    fn line(&self, message: String) {
        let _ = self.multi.println(message);
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { subscriptions } => {
                self.main_bar.set_message(format!(
                    "Processing {} subscriptions",
                    subscriptions.to_string().cyan()
                ));
            }

            ProgressEvent::SubscriptionDisabled { title } => {
                self.line(format!("  {} {}", title.dimmed(), "(disabled)".dimmed()));
            }

            ProgressEvent::FetchingFeed { source, .. } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", source.cyan()));
            }

            ProgressEvent::FeedSkipped {
                subscription,
                error,
            } => {
                self.line(format!(
                    "{FAILURE}{} - {}",
                    subscription.yellow(),
                    error.red()
                ));
            }

            ProgressEvent::FeedParsed {
                podcast_title,
                total_episodes,
                ..
            } => {
                self.line(format!(
                    "{HEADPHONES}{} • {} episodes in feed",
                    podcast_title.bold().green(),
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::FeedUrlChanged {
                current_url,
                new_url,
                ..
            } => {
                self.line(format!(
                    "  {WARNING}Feed moved: {} -> {}",
                    current_url.dimmed(),
                    new_url.yellow()
                ));
            }

            ProgressEvent::FeedCompleted { .. } => {
                self.line(format!(
                    "  {WARNING}{}",
                    "Feed is complete, consider disabling the subscription".yellow()
                ));
            }

            ProgressEvent::EpisodeSkipped {
                episode_title,
                reason,
            } => {
                if reason == SkipReason::NotRecent {
                    self.line(format!(
                        "  {} {}",
                        truncate_title(&episode_title, 50).dimmed(),
                        "(not recent)".dimmed()
                    ));
                }
            }

            ProgressEvent::EpisodeStarting { episode_title, .. } => {
                self.main_bar
                    .set_message(format!("{}", truncate_title(&episode_title, 50).bold()));
            }

            ProgressEvent::DownloadStarting {
                kind,
                content_length,
                ..
            } => {
                self.start_download_bar(kind, content_length);
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                self.with_download_bar(|bar| {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                });
            }

            ProgressEvent::DownloadCompleted { .. } => {
                self.finish_download_bar();
            }

            ProgressEvent::StepCompleted { step } => {
                self.main_bar.set_message(format!("{GEAR}{step} done"));
            }

            ProgressEvent::TracklistFound { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Tracklist: {}", url.cyan()));
            }

            ProgressEvent::TracklistMerged { chapters } => {
                self.main_bar
                    .set_message(format!("{GEAR}Merging {chapters} chapters"));
            }

            ProgressEvent::TracklistUnavailable { error, .. } => {
                self.line(format!("  {WARNING}No tracklist: {}", error.yellow()));
            }

            ProgressEvent::EpisodePlaced { .. } | ProgressEvent::PlaylistUpdated { .. } => {}

            ProgressEvent::EpisodeCompleted { episode_title, .. } => {
                self.line(format!(
                    "  {SUCCESS}{}",
                    truncate_title(&episode_title, 60).green()
                ));
            }

            ProgressEvent::EpisodeFailed {
                episode_title,
                error,
            } => {
                self.finish_download_bar();
                self.line(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&episode_title, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::SubscriptionCompleted { summary } => {
                self.line(format!(
                    "  {} new, {} already downloaded, {} not recent",
                    summary.completed.to_string().green().bold(),
                    summary.already_downloaded.to_string().cyan(),
                    summary.not_recent.to_string().yellow()
                ));
            }

            ProgressEvent::RunCompleted { summary } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} new, {} already downloaded, {} not recent, {} feeds skipped",
                    "Run complete:".bold().green(),
                    summary.completed().to_string().green().bold(),
                    summary.already_downloaded().to_string().cyan(),
                    summary.not_recent().to_string().yellow(),
                    if summary.feeds_skipped > 0 {
                        summary.feeds_skipped.to_string().red().bold()
                    } else {
                        summary.feeds_skipped.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let truncated: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config_path: &Path, quiet: bool, plain: bool) -> Result<()> {
    // Progress bars own the terminal; only warnings go through the log then
    init_tracing(if plain { "podstash=info" } else { "podstash=warn" });

    let config = Config::load(config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config_path.display()
        )
    })?;

    if !quiet && !plain {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podstash".bold().magenta(),
            "- Podcast Library".dimmed()
        );
    }

    let reporter: SharedProgressReporter = if quiet {
        NoopReporter::shared()
    } else if plain {
        LogReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let tracklists = config
        .tracklist
        .provider
        .build()
        .context("Failed to set up tracklist provider")?;

    let pipeline = EpisodePipeline::new(
        ReqwestClient::new(),
        Box::new(ExternalTools::from_config(&config.tools)),
        tracklists,
        PipelineSettings::from_config(&config),
        reporter,
    );

    sync_library(&pipeline, &config.subscriptions)
        .await
        .context("Library run aborted")?;

    if !quiet && !plain {
        println!(
            "\n{FOLDER}Library: {}\n",
            config.library_directory.display().to_string().cyan()
        );
    }

    Ok(())
}

async fn lookup(url: &str) -> Result<()> {
    init_tracing("podstash=warn");

    let feed_url = lookup_feed_url(&ReqwestClient::new(), url)
        .await
        .with_context(|| format!("Failed to look up feed URL for {url}"))?;

    println!("{feed_url}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            quiet,
            plain,
        } => run(&config, quiet, plain).await,
        Command::Lookup { url } => lookup(&url).await,
    }
}
