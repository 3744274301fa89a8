// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::PlaylistError;

/// Append an item to an M3U playlist in the library root unless it is listed
///
/// `item` is a path relative to `library_dir` and must name an existing file.
/// The playlist is created on demand. Returns whether a line was added.
pub fn add_item_if_missing(
    library_dir: &Path,
    playlist_name: &str,
    item: &Path,
) -> Result<bool, PlaylistError> {
    let playlist_path = library_dir.join(playlist_name);

    if !library_dir.join(item).is_file() {
        return Err(PlaylistError::MissingItem(item.to_path_buf()));
    }

    let content = if playlist_path.exists() {
        std::fs::read_to_string(&playlist_path).map_err(|e| PlaylistError::ReadFailed {
            path: playlist_path.clone(),
            source: e,
        })?
    } else {
        String::new()
    };

    let entry = item.to_string_lossy();
    if content
        .lines()
        .any(|line| line.trim_end_matches('\r') == entry)
    {
        return Ok(false);
    }

    let mut line = String::with_capacity(entry.len() + 2);
    if !content.is_empty() && !content.ends_with('\n') {
        line.push('\n');
    }
    line.push_str(&entry);
    line.push('\n');

    let write_failed = |e| PlaylistError::WriteFailed {
        path: playlist_path.clone(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&playlist_path)
        .map_err(write_failed)?;
    file.write_all(line.as_bytes()).map_err(write_failed)?;

    Ok(true)
}
