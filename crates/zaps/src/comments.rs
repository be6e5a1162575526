//! Comment feed aggregation.
//!
//! Three independently published streams (notes, zap receipts and curator
//! labels) all `i`-tag the content they talk about. A feed merges them into
//! one list keyed by display id, with later streams taking priority:
//!
//! 1. events pointed at by curator labels
//! 2. notes, filed under the event they quote when they embed a `nostr:`
//!    pointer, otherwise under their own id
//! 3. zap receipts, replaced by the zap request in their `description`
//!
//! The clients that publish a note quoting their own zap receipt therefore
//! collapse into a single zap comment.

use crate::config::ZapsConfig;
use crate::error::{Result, ZapError};
use nostr::{
    ContentReference, Event, KIND_SHORT_TEXT_NOTE, LABEL_KIND, ZAP_RECEIPT_KIND,
    ZAP_REQUEST_KIND, ZapReceipt, extract_event_pointer, labeled_event_ids,
};
use nostr_client::{ClientError, Filter, RelayTransport};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A display-ready feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    /// Display key; the receipt id for zaps
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    /// Cleaned text
    pub content: String,
    pub amount_msats: Option<u64>,
    pub is_zap: bool,
    /// Event the comment was built from
    pub event: Event,
}

impl Comment {
    fn from_event(id: String, event: Event, content: String) -> Self {
        let is_zap = event.kind == ZAP_REQUEST_KIND;
        let amount_msats = if is_zap {
            event.tag_value("amount").and_then(|a| a.parse().ok())
        } else {
            None
        };

        Self {
            id,
            pubkey: event.pubkey.clone(),
            created_at: event.created_at,
            kind: event.kind,
            content,
            amount_msats,
            is_zap,
            event,
        }
    }
}

/// Strips platform self-promotion and bare `nostr:` quote links.
#[derive(Debug, Clone)]
pub struct ContentCleaner {
    platform_links: Option<Regex>,
    nostr_links: Regex,
    fallback: String,
}

impl ContentCleaner {
    pub fn new(platform_hosts: &[String], fallback: impl Into<String>) -> Result<Self> {
        let hosts: Vec<String> = platform_hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(regex::escape)
            .collect();

        let platform_links = if hosts.is_empty() {
            None
        } else {
            let pattern = format!(
                r"(?i)(?:https?://)?(?:www\.)?(?:{})(?:/\S*)?",
                hosts.join("|")
            );
            Some(Regex::new(&pattern).map_err(|e| ZapError::Config(e.to_string()))?)
        };
        // Quotes only; profile mentions are part of what the commenter wrote
        let nostr_links = Regex::new(r"nostr:(?:note|nevent)1[a-z0-9]+")
            .map_err(|e| ZapError::Config(e.to_string()))?;

        Ok(Self {
            platform_links,
            nostr_links,
            fallback: fallback.into(),
        })
    }

    /// Clean `content` of an event of `kind`.
    ///
    /// Non-zap events that clean down to nothing get the fallback text.
    pub fn clean(&self, content: &str, kind: u16) -> String {
        let mut text = self.nostr_links.replace_all(content, "").into_owned();
        if let Some(platform) = &self.platform_links {
            text = strip_standalone(platform, &text);
        }
        let text = text.trim().to_string();

        if text.is_empty() && kind != ZAP_REQUEST_KIND {
            self.fallback.clone()
        } else {
            text
        }
    }
}

/// Remove matches of `links` that aren't part of a longer hostname, path or address.
fn strip_standalone(links: &Regex, text: &str) -> String {
    links
        .replace_all(text, |caps: &Captures| {
            let Some(found) = caps.get(0) else {
                return String::new();
            };
            let before = text[..found.start()].chars().next_back();
            let mut after = text[found.end()..].chars();
            let embedded = before.is_some_and(|c| is_host_char(c) || c == '@' || c == '/')
                || match after.next() {
                    Some('.') => after.next().is_some_and(|c| c.is_alphanumeric()),
                    Some(c) => is_host_char(c),
                    None => false,
                };
            if embedded {
                found.as_str().to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

fn is_host_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '.'
}

#[derive(Debug, Clone)]
pub struct CommentFeedConfig {
    pub relays: Vec<String>,
    /// Labels from any other author are ignored; no curator means no label stream
    pub label_curator: Option<String>,
    pub blocked_pubkeys: HashSet<String>,
}

impl From<&ZapsConfig> for CommentFeedConfig {
    fn from(config: &ZapsConfig) -> Self {
        Self {
            relays: config.relays.clone(),
            label_curator: config.label_curator.clone(),
            blocked_pubkeys: config.blocked_pubkeys.iter().cloned().collect(),
        }
    }
}

pub struct CommentFeed<T: RelayTransport> {
    transport: Arc<T>,
    config: CommentFeedConfig,
    cleaner: ContentCleaner,
}

impl<T: RelayTransport> CommentFeed<T> {
    pub fn new(transport: Arc<T>, config: CommentFeedConfig, cleaner: ContentCleaner) -> Self {
        Self {
            transport,
            config,
            cleaner,
        }
    }

    pub fn from_config(transport: Arc<T>, config: &ZapsConfig) -> Result<Self> {
        let cleaner = ContentCleaner::new(&config.platform_hosts, config.fallback_comment.clone())?;
        Ok(Self::new(transport, CommentFeedConfig::from(config), cleaner))
    }

    /// Comments for podcast items, newest first.
    pub async fn fetch(&self, content_ids: &[String], limit: usize) -> Result<Vec<Comment>> {
        let references: Vec<String> = content_ids
            .iter()
            .map(|id| ContentReference::Item(id.clone()).to_string())
            .collect();
        self.fetch_references(references, limit).await
    }

    /// Comments for arbitrary `i`-tag references, newest first.
    pub async fn fetch_references(
        &self,
        references: Vec<String>,
        limit: usize,
    ) -> Result<Vec<Comment>> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        let streams = self.fetch_streams(references, limit).await?;
        let labeled = self.fetch_labeled(&streams.labels).await;
        debug!(
            "Fetched {} notes, {} receipts, {} labels ({} labeled events)",
            streams.notes.len(),
            streams.receipts.len(),
            streams.labels.len(),
            labeled.len()
        );

        let merged = merge_streams(labeled, streams.notes, streams.receipts);

        let mut comments: Vec<Comment> = merged
            .into_iter()
            .filter(|(_, event)| !self.config.blocked_pubkeys.contains(&event.pubkey))
            .map(|(id, event)| {
                let content = self.cleaner.clean(&event.content, event.kind);
                Comment::from_event(id, event, content)
            })
            .collect();

        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        comments.truncate(limit);
        Ok(comments)
    }

    async fn fetch_streams(&self, references: Vec<String>, limit: usize) -> Result<Streams> {
        let relays = &self.config.relays;
        let notes_filter = Filter::new()
            .kinds(vec![KIND_SHORT_TEXT_NOTE])
            .content_refs(references.clone())
            .limit(limit as u64);
        let receipts_filter = Filter::new()
            .kinds(vec![ZAP_RECEIPT_KIND])
            .content_refs(references.clone());
        let labels_filter = self.config.label_curator.as_ref().map(|curator| {
            Filter::new()
                .kinds(vec![LABEL_KIND])
                .authors(vec![curator.clone()])
                .content_refs(references)
        });

        let labels = async {
            match labels_filter {
                Some(filter) => Some(self.transport.query_sync(relays, filter).await),
                None => None,
            }
        };
        let (notes, receipts, labels) = tokio::join!(
            self.transport.query_sync(relays, notes_filter),
            self.transport.query_sync(relays, receipts_filter),
            labels,
        );

        let mut failures: Vec<ClientError> = Vec::new();
        let mut attempted = 2;
        let mut take = |stream: &str, result: nostr_client::Result<Vec<Event>>| match result {
            Ok(events) => events,
            Err(e) => {
                warn!("Comment {} query failed: {}", stream, e);
                failures.push(e);
                Vec::new()
            }
        };

        let notes = take("note", notes);
        let receipts = take("receipt", receipts);
        let labels = match labels {
            Some(result) => {
                attempted += 1;
                take("label", result)
            }
            None => Vec::new(),
        };

        if failures.len() == attempted
            && let Some(first) = failures.into_iter().next()
        {
            return Err(first.into());
        }

        Ok(Streams {
            notes,
            receipts,
            labels,
        })
    }

    async fn fetch_labeled(&self, labels: &[Event]) -> Vec<Event> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = labels
            .iter()
            .flat_map(labeled_event_ids)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        match self
            .transport
            .query_sync(&self.config.relays, Filter::new().ids(ids))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!("Labeled event query failed: {}", e);
                Vec::new()
            }
        }
    }
}

struct Streams {
    notes: Vec<Event>,
    receipts: Vec<Event>,
    labels: Vec<Event>,
}

/// Id a note or labeled event is displayed under.
fn display_key(event: &Event) -> String {
    extract_event_pointer(&event.content)
        .map(|pointer| pointer.id_hex())
        .unwrap_or_else(|| event.id.clone())
}

/// Merge the three streams, later streams overwriting earlier ones.
fn merge_streams(
    labeled: Vec<Event>,
    notes: Vec<Event>,
    receipts: Vec<Event>,
) -> HashMap<String, Event> {
    let mut merged = HashMap::new();

    for event in labeled.into_iter().chain(notes) {
        merged.insert(display_key(&event), event);
    }

    for receipt in receipts {
        let id = receipt.id.clone();
        match ZapReceipt::from_event(receipt).and_then(|r| r.get_zap_request()) {
            Ok(request) => {
                merged.insert(id, request.event);
            }
            Err(e) => {
                let err = ZapError::MalformedReceipt {
                    id,
                    reason: e.to_string(),
                };
                warn!("Skipping receipt: {}", err);
            }
        }
    }

    merged
}
