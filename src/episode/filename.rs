// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

/// Extension of the final Matroska audio artifact
pub const ARTIFACT_EXTENSION: &str = "mka";

/// Separator between channel and episode title in artifact names
pub const TITLE_SEPARATOR: &str = " – ";

/// Check if a character is allowed in filenames (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

/// Escape a user-controlled name for use as a single path component
///
/// Every character outside `[A-Za-z0-9._- ]` becomes `-`, one for one.
/// Names made only of dots would address the current or parent directory,
/// so their dots are replaced as well.
pub fn escape_name(name: &str) -> String {
    let escaped: String = name
        .chars()
        .map(|c| if is_valid_filename_char(c) { c } else { '-' })
        .collect();

    if escaped.chars().all(|c| c == '.') {
        return "-".repeat(escaped.len().max(1));
    }

    escaped
}

/// Directory an episode is filed into
///
/// `<library>/<channel>` or `<library>/<channel>/<episode>` when every
/// episode gets its own directory.
pub fn destination_dir(
    library_dir: &Path,
    channel_title: &str,
    episode_title: &str,
    episode_directories: bool,
) -> PathBuf {
    let channel_dir = library_dir.join(escape_name(channel_title));
    if episode_directories {
        channel_dir.join(escape_name(episode_title))
    } else {
        channel_dir
    }
}

/// File name of the final artifact: `<channel> – <episode>.mka`, escaped
pub fn artifact_filename(channel_title: &str, episode_title: &str) -> String {
    format!(
        "{}.{}",
        escape_name(&format!("{channel_title}{TITLE_SEPARATOR}{episode_title}")),
        ARTIFACT_EXTENSION
    )
}

/// File name of a channel's M3U playlist in the library root
pub fn playlist_filename(channel_title: &str) -> String {
    format!("{}.m3u", escape_name(channel_title))
}
