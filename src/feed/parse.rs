// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};

use crate::error::DecodeError;

use super::xml::{XmlElement, parse_document};

/// XML namespace of the iTunes podcast extension
pub const ITUNES_NAMESPACE: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";

/// XML namespace of the Spotify podcast extension
pub const SPOTIFY_NAMESPACE: &str = "http://www.spotify.com/ns/rss";

/// Represents a decoded podcast feed
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: String,
    pub image_url: Option<String>,
    pub language: String,
    pub author: Option<String>,
    pub link: Option<String>,
    pub copyright: Option<String>,
    /// `itunes:complete`; `None` when the feed does not say
    pub completed: Option<bool>,
    /// `itunes:new-feed-url`, the location the publisher moved the feed to
    pub new_feed_url: Option<String>,
    /// Whether the feed declares the Spotify namespace
    pub spotify: bool,
    /// Episodes in document order
    pub items: Vec<Item>,
}

/// Represents a single podcast episode
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub title: String,
    pub enclosure: Enclosure,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
}

/// Represents the media file attached to an episode
#[derive(Debug, Clone, PartialEq)]
pub struct Enclosure {
    /// Exact URL string from the feed; also the ledger key
    pub url: String,
    /// Declared byte length, as written in the feed
    pub length: String,
    pub mime_type: String,
}

/// Decode RSS feed XML bytes into a [`Channel`]
///
/// Generic RSS elements are read first; iTunes elements are only consulted
/// when the document declares the iTunes namespace, and then only fill fields
/// that are still unset. The channel image is the exception: a present
/// `itunes:image` always replaces the generic one.
pub fn parse_feed(xml_bytes: &[u8]) -> Result<Channel, DecodeError> {
    let document = parse_document(xml_bytes)?;
    let has_itunes = document.declares(ITUNES_NAMESPACE);

    let channel = document
        .root
        .child("channel")
        .ok_or(DecodeError::MissingChannelField("channel"))?;

    let mut title = text_of(channel, "title");
    let description = text_of(channel, "description")
        .ok_or(DecodeError::MissingChannelField("description"))?;
    let language =
        text_of(channel, "language").ok_or(DecodeError::MissingChannelField("language"))?;

    let mut subtitle = text_of(channel, "subtitle");
    let mut author = text_of(channel, "author");
    let mut image_url = channel
        .child("image")
        .and_then(|image| image.child("url"))
        .map(|url| url.text.clone());
    let mut completed = None;
    let mut new_feed_url = None;

    if has_itunes {
        if let Some(href) = itunes_image(channel) {
            image_url = Some(href);
        }

        fill(&mut author, itunes_text(channel, "author"));
        fill(&mut title, itunes_text(channel, "title"));
        fill(&mut subtitle, itunes_text(channel, "subtitle"));

        completed = itunes_text(channel, "complete").map(|value| value == "Yes");
        new_feed_url = itunes_text(channel, "new-feed-url");
    }

    let title = title.ok_or(DecodeError::MissingChannelField("title"))?;

    let items = channel
        .children_named("item")
        .enumerate()
        .map(|(index, item)| parse_item(item, index, has_itunes))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Channel {
        title,
        subtitle: subtitle.map(|s| s.trim().to_string()),
        description: description.trim().to_string(),
        image_url,
        language,
        author,
        link: text_of(channel, "link"),
        copyright: text_of(channel, "copyright"),
        completed,
        new_feed_url,
        spotify: document.declares(SPOTIFY_NAMESPACE),
        items,
    })
}

fn parse_item(item: &XmlElement, index: usize, has_itunes: bool) -> Result<Item, DecodeError> {
    let missing = |field| DecodeError::MissingItemField { index, field };

    let mut title = text_of(item, "title");
    let mut image_url = item
        .child("image")
        .and_then(|image| image.attribute("href"))
        .map(String::from);

    if has_itunes {
        fill(&mut title, itunes_text(item, "title"));
        fill(&mut image_url, itunes_image(item));
    }

    let title = title.ok_or_else(|| missing("title"))?;

    let enclosure = item.child("enclosure").ok_or_else(|| missing("enclosure"))?;
    let enclosure = Enclosure {
        url: enclosure
            .attribute("url")
            .ok_or_else(|| missing("enclosure/@url"))?
            .to_string(),
        length: enclosure
            .attribute("length")
            .ok_or_else(|| missing("enclosure/@length"))?
            .to_string(),
        mime_type: enclosure
            .attribute("type")
            .ok_or_else(|| missing("enclosure/@type"))?
            .to_string(),
    };

    let pub_date = text_of(item, "pubDate")
        .map(|date_str| parse_pub_date(&date_str))
        .transpose()?;

    Ok(Item {
        title,
        enclosure,
        pub_date,
        description: text_of(item, "description").map(|d| d.trim().to_string()),
        link: text_of(item, "link"),
        image_url,
    })
}

/// Parse a publication date strictly as RFC 2822, tolerating surrounding whitespace
fn parse_pub_date(date_str: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    let trimmed = date_str.trim();
    DateTime::parse_from_rfc2822(trimmed).map_err(|e| DecodeError::InvalidDate {
        date_str: trimmed.to_string(),
        reason: e.to_string(),
    })
}

fn text_of(element: &XmlElement, name: &str) -> Option<String> {
    element.child(name).map(|child| child.text.clone())
}

fn itunes_text(element: &XmlElement, name: &str) -> Option<String> {
    element
        .ns_child(ITUNES_NAMESPACE, name)
        .map(|child| child.text.clone())
}

fn itunes_image(element: &XmlElement) -> Option<String> {
    element
        .ns_child(ITUNES_NAMESPACE, "image")
        .and_then(|image| image.attribute("href"))
        .map(String::from)
}

fn fill(slot: &mut Option<String>, fallback: Option<String>) {
    if slot.is_none() {
        *slot = fallback;
    }
}
