//! Zap request construction.
//!
//! A zap request is a kind 9734 event addressed to the configured recipient
//! and tagged with the content it pays for. Three `i` tags are always
//! attached: the item guid, plus a feed guid and a publisher guid derived
//! from the parent content through the Podcasting 2.0 UUIDv5 scheme.
//! Building is pure apart from signing.

use crate::config::ZapsConfig;
use crate::error::{Result, ZapError};
use crate::signer::Signer;
use nostr::{ContentReference, Event, EventTemplate, ZAP_REQUEST_KIND, feed_guid};
use std::fmt;
use std::str::FromStr;

/// The closed set of containers a zapped item can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKind {
    Album,
    Podcast,
}

impl ParentKind {
    /// Path segment of the feed this parent is published as.
    fn feed_segment(self) -> &'static str {
        match self {
            ParentKind::Album => "music",
            ParentKind::Podcast => "show",
        }
    }

    /// Path segment of the publisher owning the feed.
    fn publisher_segment(self) -> &'static str {
        match self {
            ParentKind::Album => "artist",
            ParentKind::Podcast => "podcast",
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentKind::Album => f.write_str("album"),
            ParentKind::Podcast => f.write_str("podcast"),
        }
    }
}

impl FromStr for ParentKind {
    type Err = ZapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "album" => Ok(ParentKind::Album),
            "podcast" => Ok(ParentKind::Podcast),
            other => Err(ZapError::Encoding(format!("unknown parent kind {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentContent {
    pub id: String,
    pub kind: ParentKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapRequestParams {
    pub content_id: String,
    pub parent: ParentContent,
    pub amount_sats: u64,
    pub comment: Option<String>,
    /// Appended after the default receipt relay
    pub extra_relays: Vec<String>,
    /// Appended after the generated tags
    pub extra_tags: Vec<Vec<String>>,
}

impl ZapRequestParams {
    pub fn new(content_id: impl Into<String>, parent: ParentContent, amount_sats: u64) -> Self {
        Self {
            content_id: content_id.into(),
            parent,
            amount_sats,
            comment: None,
            extra_relays: Vec::new(),
            extra_tags: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_relay(mut self, relay: impl Into<String>) -> Self {
        self.extra_relays.push(relay.into());
        self
    }

    pub fn with_tag(mut self, tag: Vec<String>) -> Self {
        self.extra_tags.push(tag);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ZapRequestBuilder {
    recipient_pubkey: String,
    receipt_relay: String,
    feed_base_url: String,
}

impl ZapRequestBuilder {
    pub fn new(
        recipient_pubkey: impl Into<String>,
        receipt_relay: impl Into<String>,
        feed_base_url: impl Into<String>,
    ) -> Self {
        Self {
            recipient_pubkey: recipient_pubkey.into(),
            receipt_relay: receipt_relay.into(),
            feed_base_url: feed_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ZapsConfig) -> Result<Self> {
        let recipient = config
            .recipient_pubkey
            .as_deref()
            .ok_or_else(|| ZapError::Config("recipientPubkey is not set".to_string()))?;
        let feed_base = config
            .feed_base_url
            .as_deref()
            .ok_or_else(|| ZapError::Config("feedBaseUrl is not set".to_string()))?;
        Ok(Self::new(recipient, config.receipt_relay.clone(), feed_base))
    }

    /// Item, feed and publisher references for the zapped content.
    pub fn content_references(
        &self,
        content_id: &str,
        parent: &ParentContent,
    ) -> [ContentReference; 3] {
        let feed_url = format!(
            "{}/{}/{}",
            self.feed_base_url,
            parent.kind.feed_segment(),
            parent.id
        );
        let publisher_url = format!(
            "{}/{}/{}",
            self.feed_base_url,
            parent.kind.publisher_segment(),
            parent.id
        );

        [
            ContentReference::Item(content_id.to_string()),
            ContentReference::Feed(feed_guid(&feed_url).to_string()),
            ContentReference::Publisher(feed_guid(&publisher_url).to_string()),
        ]
    }

    /// The unsigned zap request.
    pub fn template(&self, params: &ZapRequestParams) -> Result<EventTemplate> {
        if params.content_id.is_empty() {
            return Err(ZapError::Encoding("content id is empty".to_string()));
        }
        if params.parent.id.is_empty() {
            return Err(ZapError::Encoding("parent content id is empty".to_string()));
        }
        if params.amount_sats == 0 {
            return Err(ZapError::Encoding("amount must be positive".to_string()));
        }
        let amount_msats = params.amount_sats.checked_mul(1000).ok_or_else(|| {
            ZapError::Encoding(format!("amount {} sats overflows millisats", params.amount_sats))
        })?;

        let mut relays = vec!["relays".to_string(), self.receipt_relay.clone()];
        for relay in &params.extra_relays {
            if !relays[1..].contains(relay) {
                relays.push(relay.clone());
            }
        }

        let mut template =
            EventTemplate::new(ZAP_REQUEST_KIND, params.comment.clone().unwrap_or_default())
                .with_tag(vec!["p".to_string(), self.recipient_pubkey.clone()])
                .with_tag(vec!["amount".to_string(), amount_msats.to_string()])
                .with_tag(relays);

        for reference in self.content_references(&params.content_id, &params.parent) {
            template = template.with_tag(reference.to_tag());
        }
        template.tags.extend(params.extra_tags.iter().cloned());

        Ok(template)
    }

    pub fn build(&self, params: &ZapRequestParams, signer: &Signer) -> Result<Event> {
        signer.sign(&self.template(params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{ZapRequest, generate_secret_key, get_public_key_hex, verify_event};
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://feeds.example.fm";

    fn builder() -> ZapRequestBuilder {
        let recipient = get_public_key_hex(&generate_secret_key()).unwrap();
        ZapRequestBuilder::new(recipient, "wss://relay.example.com", BASE)
    }

    fn album(id: &str) -> ParentContent {
        ParentContent {
            id: id.to_string(),
            kind: ParentKind::Album,
        }
    }

    #[test]
    fn test_item_tag_and_millisat_amount() {
        let event = builder()
            .build(&ZapRequestParams::new("abc-123", album("def-456"), 1000), &Signer::Anonymous)
            .unwrap();

        assert_eq!(event.kind, ZAP_REQUEST_KIND);
        assert!(event.tags.contains(&vec![
            "i".to_string(),
            "podcast:item:guid:abc-123".to_string()
        ]));
        assert_eq!(event.tag_value("amount"), Some("1000000"));
        assert!(verify_event(&event).unwrap());
    }

    #[test]
    fn test_i_tags_decode_to_supplied_ids() {
        let builder = builder();
        let parent = album("def-456");
        let event = builder
            .build(&ZapRequestParams::new("abc-123", parent.clone(), 21), &Signer::Anonymous)
            .unwrap();

        let decoded: Vec<ContentReference> = event
            .tag_values("i")
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(decoded, builder.content_references("abc-123", &parent).to_vec());

        let feed = feed_guid(&format!("{}/music/def-456", BASE)).to_string();
        let publisher = feed_guid(&format!("{}/artist/def-456", BASE)).to_string();
        assert_eq!(decoded[1], ContentReference::Feed(feed));
        assert_eq!(decoded[2], ContentReference::Publisher(publisher));
    }

    #[test]
    fn test_parent_kind_changes_feed_guid() {
        let builder = builder();
        let as_album = builder.content_references("x", &album("p1"));
        let as_show = builder.content_references(
            "x",
            &ParentContent {
                id: "p1".to_string(),
                kind: ParentKind::Podcast,
            },
        );
        assert_eq!(as_album[0], as_show[0]);
        assert_ne!(as_album[1], as_show[1]);
        assert_ne!(as_album[2], as_show[2]);
    }

    #[test]
    fn test_tag_order_and_relays() {
        let params = ZapRequestParams::new("abc-123", album("def-456"), 5)
            .with_comment("great track")
            .with_relay("wss://extra.example.com")
            .with_relay("wss://relay.example.com")
            .with_tag(vec!["client".to_string(), "zapctl".to_string()]);
        let template = builder().template(&params).unwrap();

        let names: Vec<&str> = template.tags.iter().map(|t| t[0].as_str()).collect();
        assert_eq!(names, vec!["p", "amount", "relays", "i", "i", "i", "client"]);
        assert_eq!(
            template.tags[2],
            vec!["relays", "wss://relay.example.com", "wss://extra.example.com"]
        );
        assert_eq!(template.content, "great track");
    }

    #[test]
    fn test_parses_as_valid_zap_request() {
        let builder = builder();
        let event = builder
            .build(&ZapRequestParams::new("abc-123", album("def-456"), 1), &Signer::Anonymous)
            .unwrap();
        let parsed = ZapRequest::from_event(event).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.amount_msats, Some(1000));
        assert_eq!(parsed.content_refs.len(), 3);
        assert_eq!(parsed.content, "");
    }

    #[test]
    fn test_invalid_amounts() {
        let builder = builder();
        assert!(matches!(
            builder.template(&ZapRequestParams::new("a", album("b"), 0)),
            Err(ZapError::Encoding(_))
        ));
        assert!(matches!(
            builder.template(&ZapRequestParams::new("a", album("b"), u64::MAX)),
            Err(ZapError::Encoding(_))
        ));
        assert!(matches!(
            builder.template(&ZapRequestParams::new("", album("b"), 1)),
            Err(ZapError::Encoding(_))
        ));
    }

    #[test]
    fn test_parent_kind_parse() {
        assert_eq!("Album".parse::<ParentKind>().unwrap(), ParentKind::Album);
        assert_eq!("podcast".parse::<ParentKind>().unwrap(), ParentKind::Podcast);
        assert!("playlist".parse::<ParentKind>().is_err());
    }

    #[test]
    fn test_from_config_requires_recipient() {
        let config = ZapsConfig {
            feed_base_url: Some(BASE.to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ZapRequestBuilder::from_config(&config),
            Err(ZapError::Config(_))
        ));
    }
}
