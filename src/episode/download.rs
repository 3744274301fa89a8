// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// What a download fetches, for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    CoverArt,
    Enclosure,
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadKind::CoverArt => write!(f, "cover art"),
            DownloadKind::Enclosure => write!(f, "enclosure"),
        }
    }
}

/// Stream `url` into `output_path`, returning the number of bytes written
///
/// A download that yields no bytes, or leaves no file behind, is an error.
pub async fn download_to_file<C: HttpClient>(
    client: &C,
    url: &str,
    output_path: &Path,
    kind: DownloadKind,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        kind,
        url: url.to_string(),
        content_length: response.content_length,
    });

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            kind,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    if bytes_downloaded == 0 {
        return Err(DownloadError::Empty {
            url: url.to_string(),
        });
    }

    if !output_path.exists() {
        return Err(DownloadError::Missing {
            path: output_path.to_path_buf(),
        });
    }

    reporter.report(ProgressEvent::DownloadCompleted {
        kind,
        bytes_downloaded,
    });

    Ok(bytes_downloaded)
}
