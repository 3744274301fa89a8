// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::error::LookupError;
use crate::http::HttpClient;

const ITUNES_LOOKUP_URL: &str = "https://itunes.apple.com/lookup";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    result_count: usize,
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResult {
    feed_url: Option<String>,
}

/// Numeric podcast id from an Apple Podcasts URL (`.../id443158849`)
pub fn extract_podcast_id(url: &str) -> Option<&str> {
    url.match_indices("/id").find_map(|(index, marker)| {
        let rest = &url[index + marker.len()..];
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        (digits > 0).then(|| &rest[..digits])
    })
}

/// Resolve the RSS feed URL behind an Apple Podcasts page URL
pub async fn lookup_feed_url<C: HttpClient>(
    client: &C,
    podcast_url: &str,
) -> Result<String, LookupError> {
    let id = extract_podcast_id(podcast_url)
        .ok_or_else(|| LookupError::MissingId(podcast_url.to_string()))?;

    let query = format!("{ITUNES_LOOKUP_URL}?id={id}");
    tracing::debug!(%query, "Querying iTunes lookup API");

    let body = client
        .get_bytes(&query)
        .await
        .map_err(LookupError::RequestFailed)?;

    feed_url_from_response(&body)
}

fn feed_url_from_response(body: &[u8]) -> Result<String, LookupError> {
    let response: LookupResponse = serde_json::from_slice(body)?;

    if response.result_count != 1 || response.results.len() != 1 {
        return Err(LookupError::UnexpectedResultCount(response.result_count));
    }

    response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.feed_url)
        .ok_or(LookupError::MissingFeedUrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct JsonClient {
        body: &'static str,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for JsonClient {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(Bytes::from_static(self.body.as_bytes()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            unimplemented!("lookup only fetches whole bodies")
        }
    }

    #[test]
    fn extracts_id_from_podcast_url() {
        assert_eq!(
            extract_podcast_id("https://podcasts.apple.com/us/podcast/w-w-rave-culture-radio/id443158849"),
            Some("443158849")
        );
        assert_eq!(
            extract_podcast_id("https://podcasts.apple.com/podcast/id123?i=1000"),
            Some("123")
        );
    }

    #[test]
    fn skips_id_markers_without_digits() {
        assert_eq!(
            extract_podcast_id("https://podcasts.apple.com/identity/show/id42"),
            Some("42")
        );
        assert_eq!(extract_podcast_id("https://example.com/podcast/show"), None);
    }

    #[tokio::test]
    async fn resolves_feed_url() {
        let client = JsonClient {
            body: r#"{"resultCount":1,"results":[{"collectionName":"Rave Culture","feedUrl":"https://feeds.example.com/rave.xml"}]}"#,
            requested: Mutex::new(Vec::new()),
        };

        let feed_url = lookup_feed_url(&client, "https://podcasts.apple.com/us/podcast/x/id443158849")
            .await
            .unwrap();

        assert_eq!(feed_url, "https://feeds.example.com/rave.xml");
        assert_eq!(
            client.requested.lock().unwrap().as_slice(),
            ["https://itunes.apple.com/lookup?id=443158849"]
        );
    }

    #[tokio::test]
    async fn url_without_id_is_rejected() {
        let client = JsonClient {
            body: "{}",
            requested: Mutex::new(Vec::new()),
        };

        let result = lookup_feed_url(&client, "https://example.com/show").await;

        assert!(matches!(result, Err(LookupError::MissingId(_))));
        assert!(client.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn unexpected_result_count() {
        let result = feed_url_from_response(br#"{"resultCount":0,"results":[]}"#);
        assert!(matches!(result, Err(LookupError::UnexpectedResultCount(0))));
    }

    #[test]
    fn missing_feed_url() {
        let result = feed_url_from_response(br#"{"resultCount":1,"results":[{"trackId":1}]}"#);
        assert!(matches!(result, Err(LookupError::MissingFeedUrl)));
    }

    #[test]
    fn invalid_json() {
        let result = feed_url_from_response(b"<html>");
        assert!(matches!(result, Err(LookupError::InvalidResponse(_))));
    }
}
