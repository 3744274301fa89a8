// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::feed::{Channel, Item};
use crate::tracklist::Chapter;

const HEADER: &str = ";FFMETADATA1";

/// Separator used when multi-line text is folded into one line
const LINE_BREAK: &str = "<br />";

/// Chapter timestamps are written in milliseconds
const TIMEBASE: &str = "1/1000";

/// Text reduced to its first line, for fields that are titles or names
fn first_line(text: &str) -> String {
    text.replace('\r', "")
        .split('\n')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Text with its lines joined by `<br />`, for prose fields
fn joined_lines(text: &str) -> String {
    text.replace('\r', "").split('\n').collect::<Vec<_>>().join(LINE_BREAK)
}

/// Backslash-escape the characters FFMETADATA gives a meaning to
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '=' | ';' | '#' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Render the FFMETADATA1 document merged into an episode's container
///
/// Every line is `key=value` with the value escaped; keys whose source value
/// is absent are left out. Chapters follow the global keys in the order given.
pub fn build_ffmetadata(item: &Item, channel: &Channel, chapters: &[Chapter]) -> String {
    let mut lines = vec![HEADER.to_string()];
    let mut push = |key: &str, value: String| lines.push(format!("{key}={}", escape_value(&value)));

    push("title", first_line(&item.title));

    if let Some(subtitle) = &channel.subtitle {
        push("subtitle", first_line(subtitle));
    }

    if let Some(description) = &item.description {
        push("description", joined_lines(description));
        push("comment", joined_lines(description));
    }

    push("album_description", joined_lines(&channel.description));

    if let Some(author) = &channel.author {
        let author = first_line(author);
        push("artist", author.clone());
        push("album_artist", author.clone());
        push("author", author);
    }

    push("album", first_line(&channel.title));

    if let Some(date) = &item.pub_date {
        push("year", date.format("%Y").to_string());
        push("date", date.format("%Y-%m-%d").to_string());
    }

    if let Some(link) = item.link.as_ref().or(channel.link.as_ref()) {
        push("url", first_line(link));
        push("web", first_line(link));
    }

    if let Some(copyright) = &channel.copyright {
        push("copyright", joined_lines(copyright));
    }

    push("language", first_line(&channel.language));

    for chapter in chapters {
        lines.push("[CHAPTER]".to_string());
        lines.push(format!("TIMEBASE={TIMEBASE}"));
        lines.push(format!("START={}", chapter.start.saturating_mul(1000)));
        lines.push(format!("END={}", chapter.end.saturating_mul(1000)));
        lines.push(format!(
            "TITLE={}",
            escape_value(&first_line(&chapter.title))
        ));
        lines.push(String::new());
    }

    lines.join("\n")
}
