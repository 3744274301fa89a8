mod fetch;
mod parse;
mod xml;

pub use fetch::{fetch_feed_bytes, is_url, load_feed, read_feed_file};
pub use parse::{Channel, Enclosure, ITUNES_NAMESPACE, Item, SPOTIFY_NAMESPACE, parse_feed};
