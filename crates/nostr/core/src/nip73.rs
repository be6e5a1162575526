//! NIP-73: External content ids.
//!
//! Events about off-protocol content carry `["i", <reference>]` tags. For
//! Podcasting 2.0 content the references are
//!
//! - `podcast:item:guid:<item guid>`
//! - `podcast:guid:<feed guid>`
//! - `podcast:publisher:guid:<publisher feed guid>`
//!
//! where feed guids are UUIDv5 values derived from the feed URL.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Tag name for external content references.
pub const EXTERNAL_CONTENT_TAG: &str = "i";

/// The Podcasting 2.0 `podcast:guid` namespace.
pub const PODCAST_GUID_NAMESPACE: Uuid = Uuid::from_u128(0xead4c236_bf58_58c6_a2c6_a6b28d128cb6);

const ITEM_PREFIX: &str = "podcast:item:guid:";
const FEED_PREFIX: &str = "podcast:guid:";
const PUBLISHER_PREFIX: &str = "podcast:publisher:guid:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip73Error {
    #[error("unrecognized content reference: {0}")]
    Unrecognized(String),

    #[error("empty id in content reference: {0}")]
    EmptyId(String),
}

/// A typed `i`-tag value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentReference {
    Item(String),
    Feed(String),
    Publisher(String),
}

impl ContentReference {
    pub fn id(&self) -> &str {
        match self {
            ContentReference::Item(id)
            | ContentReference::Feed(id)
            | ContentReference::Publisher(id) => id,
        }
    }

    /// `["i", <reference>]`
    pub fn to_tag(&self) -> Vec<String> {
        vec![EXTERNAL_CONTENT_TAG.to_string(), self.to_string()]
    }
}

impl fmt::Display for ContentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentReference::Item(id) => write!(f, "{}{}", ITEM_PREFIX, id),
            ContentReference::Feed(id) => write!(f, "{}{}", FEED_PREFIX, id),
            ContentReference::Publisher(id) => write!(f, "{}{}", PUBLISHER_PREFIX, id),
        }
    }
}

impl FromStr for ContentReference {
    type Err = Nip73Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Item and publisher prefixes must be tried before the shorter feed prefix
        let (id, reference): (&str, fn(String) -> ContentReference) =
            if let Some(id) = s.strip_prefix(ITEM_PREFIX) {
                (id, ContentReference::Item)
            } else if let Some(id) = s.strip_prefix(PUBLISHER_PREFIX) {
                (id, ContentReference::Publisher)
            } else if let Some(id) = s.strip_prefix(FEED_PREFIX) {
                (id, ContentReference::Feed)
            } else {
                return Err(Nip73Error::Unrecognized(s.to_string()));
            };

        if id.is_empty() {
            return Err(Nip73Error::EmptyId(s.to_string()));
        }
        Ok(reference(id.to_string()))
    }
}

/// Strip the scheme and trailing slashes from a feed URL.
pub fn normalize_feed_url(url: &str) -> String {
    let url = url.trim();
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    without_scheme.trim_end_matches('/').to_string()
}

/// Podcasting 2.0 feed guid for a feed URL.
pub fn feed_guid(feed_url: &str) -> Uuid {
    Uuid::new_v5(&PODCAST_GUID_NAMESPACE, normalize_feed_url(feed_url).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_guid_reference_vector() {
        // Published example from the podcast namespace documentation
        assert_eq!(
            feed_guid("https://mp3s.nashownotes.com/pc20rss.xml").to_string(),
            "917393e3-1b1e-5cef-ace4-edaa54e1f810"
        );
    }

    #[test]
    fn test_normalize_feed_url() {
        assert_eq!(normalize_feed_url("https://example.com/feed/"), "example.com/feed");
        assert_eq!(normalize_feed_url("http://example.com/feed//"), "example.com/feed");
        assert_eq!(normalize_feed_url("example.com/feed"), "example.com/feed");
        assert_eq!(
            feed_guid("https://example.com/feed/"),
            feed_guid("http://example.com/feed")
        );
    }

    #[test]
    fn test_parse_references() {
        assert_eq!(
            "podcast:item:guid:abc-123".parse(),
            Ok(ContentReference::Item("abc-123".to_string()))
        );
        assert_eq!(
            "podcast:guid:917393e3-1b1e-5cef-ace4-edaa54e1f810".parse(),
            Ok(ContentReference::Feed(
                "917393e3-1b1e-5cef-ace4-edaa54e1f810".to_string()
            ))
        );
        assert_eq!(
            "podcast:publisher:guid:xyz".parse(),
            Ok(ContentReference::Publisher("xyz".to_string()))
        );
        assert!("isbn:9780765382030".parse::<ContentReference>().is_err());
        assert_eq!(
            "podcast:item:guid:".parse::<ContentReference>(),
            Err(Nip73Error::EmptyId("podcast:item:guid:".to_string()))
        );
    }

    #[test]
    fn test_display_roundtrip_and_tag() {
        let reference = ContentReference::Item("abc-123".to_string());
        assert_eq!(reference.to_string(), "podcast:item:guid:abc-123");
        assert_eq!(reference.to_tag(), vec!["i", "podcast:item:guid:abc-123"]);
        assert_eq!(reference.id(), "abc-123");
    }
}
