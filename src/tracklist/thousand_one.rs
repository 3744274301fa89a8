// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Chapter, TracklistProvider, synthesize_chapters};
use crate::error::ProviderError;

const BASE_URL: &str = "https://www.1001tracklists.com";
const SEARCH_PATH: &str = "/search/result.php";

/// `search_selection` value that restricts results to tracklists
const SEARCH_SELECTION_TRACKLISTS: &str = "9";

const BLOCKED_MARKER: &str = "Your IP has been blocked";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3600);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 8.0.0; SM-G960F Build/R16NW) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/62.0.3202.84 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 7.0; SM-G892A Build/NRD90M; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/60.0.3112.107 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone9,3; U; CPU iPhone OS 10_0_1 like Mac OS X) AppleWebKit/602.1.50 (KHTML, like Gecko) Version/10.0 Mobile/14A403 Safari/602.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/42.0.2311.135 Safari/537.36 Edge/12.246",
    "Mozilla/5.0 (X11; CrOS x86_64 8172.45.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/51.0.2704.64 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/47.0.2526.111 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_2) AppleWebKit/601.3.9 (KHTML, like Gecko) Version/9.0.2 Safari/601.3.9",
    "Mozilla/5.0 (Nintendo WiiU) AppleWebKit/536.30 (KHTML, like Gecko) NX/3.0.4.2.12 NintendoBrowser/4.3.1.11264.US",
    "Mozilla/5.0 (Windows Phone 10.0; Android 4.2.1; Xbox; Xbox One) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/46.0.2486.0 Mobile Safari/537.36 Edge/13.10586",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())]
}

/// Scraper for www.1001tracklists.com
///
/// Cookies set by the service are kept for the lifetime of the provider and
/// sent with every later request.
pub struct ThousandAndOneTracklists {
    client: reqwest::Client,
    base_url: String,
}

impl ThousandAndOneTracklists {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ProviderError::ClientSetup)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Send a request and return the page body, rejecting block pages
    async fn fetch_page(
        &self,
        url: &str,
        form: Option<String>,
    ) -> Result<String, ProviderError> {
        let request = match form {
            Some(body) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body),
            None => self.client.get(url),
        };

        let response = request
            .header(USER_AGENT, random_user_agent())
            .header(REFERER, &self.base_url)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ProviderError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        if html.contains(BLOCKED_MARKER) {
            return Err(ProviderError::Blocked {
                url: url.to_string(),
            });
        }

        Ok(html)
    }
}

#[async_trait]
impl TracklistProvider for ThousandAndOneTracklists {
    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        if query.is_empty() {
            return Ok(None);
        }

        tracing::debug!(query, "Searching 1001tracklists");

        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("main_search", query)
            .append_pair("search_selection", SEARCH_SELECTION_TRACKLISTS)
            .finish();

        let search_url = format!("{}{}", self.base_url, SEARCH_PATH);
        let html = self.fetch_page(&search_url, Some(form)).await?;

        let Some(href) = parse_search_results(&html)? else {
            tracing::debug!(query, "No tracklist search results");
            return Ok(None);
        };

        let base = Url::parse(&self.base_url).map_err(|e| ProviderError::InvalidUrl {
            url: self.base_url.clone(),
            source: e,
        })?;
        let absolute = base.join(&href).map_err(|e| ProviderError::InvalidUrl {
            url: href.clone(),
            source: e,
        })?;

        Ok(Some(absolute.to_string()))
    }

    async fn get(&self, url: &str) -> Result<Vec<Chapter>, ProviderError> {
        let html = self.fetch_page(url, None).await?;
        let tracks = parse_tracklist(&html)?;

        tracing::debug!(url, tracks = tracks.len(), "Extracted tracklist");

        Ok(synthesize_chapters(tracks))
    }
}

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|e| ProviderError::Structure(e.to_string()))
}

/// First result link of a search result page, as written in the page
fn parse_search_results(html: &str) -> Result<Option<String>, ProviderError> {
    let document = Html::parse_document(html);
    let link_selector = selector("div#middle > div.oItm > div.bCont > div.bTitle > a")?;

    Ok(document
        .select(&link_selector)
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string))
}

/// `(offset seconds, title)` of every track on a tracklist page, in page order
fn parse_tracklist(html: &str) -> Result<Vec<(u64, String)>, ProviderError> {
    let document = Html::parse_document(html);
    let item_selector = selector("div.tlpTog")?;
    let title_selector = selector("span.trackValue")?;
    let cue_selector = selector("input[id*='_cue_seconds']")?;

    let mut tracks = Vec::new();
    for (index, item) in document.select(&item_selector).enumerate() {
        let title = exactly_one(item, &title_selector, index, "title")?
            .text()
            .collect::<String>();

        let cue = exactly_one(item, &cue_selector, index, "cue offset")?;
        let value = cue.value().attr("value").ok_or_else(|| {
            ProviderError::Structure(format!("tracklist item #{index} has no cue value"))
        })?;

        tracks.push((parse_offset(value)?, ascii_title(&title)));
    }

    if tracks.is_empty() {
        return Err(ProviderError::Structure(
            "no items found in tracklist".to_string(),
        ));
    }

    Ok(tracks)
}

fn exactly_one<'a>(
    item: ElementRef<'a>,
    selector: &Selector,
    index: usize,
    what: &str,
) -> Result<ElementRef<'a>, ProviderError> {
    let mut matches = item.select(selector);
    match (matches.next(), matches.next()) {
        (Some(element), None) => Ok(element),
        _ => Err(ProviderError::Structure(format!(
            "could not extract {what} of tracklist item #{index}"
        ))),
    }
}

/// Largest offset whose millisecond value still fits a `u64`
const MAX_OFFSET_SECONDS: u64 = u64::MAX / 1000;

/// Cue offsets are whole seconds; fractional values are truncated
fn parse_offset(value: &str) -> Result<u64, ProviderError> {
    let trimmed = value.trim();
    let seconds = match trimmed.parse::<u64>() {
        Ok(seconds) => Some(seconds),
        Err(_) => trimmed
            .parse::<f64>()
            .ok()
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .filter(|seconds| *seconds < MAX_OFFSET_SECONDS as f64)
            .map(|seconds| seconds as u64),
    };

    seconds
        .filter(|seconds| *seconds <= MAX_OFFSET_SECONDS)
        .ok_or_else(|| ProviderError::InvalidOffset {
            value: value.to_string(),
        })
}

/// Single-line ASCII title: inner whitespace runs collapse to one space
fn ascii_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}
