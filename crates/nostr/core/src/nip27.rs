//! NIP-27: Text Note References
//!
//! Clients embed NIP-21 `nostr:` URIs directly in `.content` to mention other
//! profiles and events:
//!
//! ```text
//! Great show! nostr:nevent1...
//! ```
//!
//! Some zap clients publish a kind-1 note quoting the zap receipt this way, so
//! reader code uses [`extract_event_pointer`] to find the event a note echoes.
//!
//! ## Example
//!
//! ```
//! use nostr::{encode_note, extract_references};
//!
//! let note = encode_note(&[1u8; 32]).unwrap();
//! let content = format!("zapped! nostr:{}", note);
//! let refs = extract_references(&content);
//! assert_eq!(refs.len(), 1);
//! assert_eq!(refs[0].start, 8);
//! ```

use crate::nip19::{EventPointer, Nip19Entity};
use crate::nip21::{NOSTR_URI_SCHEME, from_nostr_uri};

/// A reference to another entity (profile or event) found in text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionReference {
    /// The decoded NIP-19 entity
    pub entity: Nip19Entity,
    /// The original `nostr:` URI string found in the content
    pub uri: String,
    /// The byte position where this reference starts in the content
    pub start: usize,
    /// The byte position where this reference ends in the content
    pub end: usize,
}

/// Extract all `nostr:` URI references from text content.
///
/// A URI runs until the first character outside the bech32 alphabet, so
/// trailing punctuation is not swallowed. Invalid URIs are silently skipped.
pub fn extract_references(content: &str) -> Vec<MentionReference> {
    let mut references = Vec::new();
    let mut search_from = 0;

    while let Some(start) = content[search_from..].find(NOSTR_URI_SCHEME) {
        let abs_start = search_from + start;
        let body_start = abs_start + NOSTR_URI_SCHEME.len();

        let remaining = &content[body_start..];
        let end_offset = remaining
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(remaining.len());

        let abs_end = body_start + end_offset;
        let uri = &content[abs_start..abs_end];

        if let Ok(entity) = from_nostr_uri(uri) {
            references.push(MentionReference {
                entity,
                uri: uri.to_string(),
                start: abs_start,
                end: abs_end,
            });
        }

        search_from = abs_end;
    }

    references
}

/// Check if the content contains any `nostr:` URI references.
///
/// This is a quick check that doesn't validate the URIs.
pub fn has_references(content: &str) -> bool {
    content.contains(NOSTR_URI_SCHEME)
}

/// The first reference that structurally decodes to an event (`note` or `nevent`).
///
/// Malformed pointers are skipped rather than matched by prefix.
pub fn extract_event_pointer(content: &str) -> Option<EventPointer> {
    extract_references(content)
        .into_iter()
        .find_map(|r| match r.entity {
            Nip19Entity::Note(id) => Some(EventPointer {
                id,
                relays: Vec::new(),
                author: None,
                kind: None,
            }),
            Nip19Entity::Event(pointer) => Some(pointer),
            Nip19Entity::Pubkey(_) => None,
        })
}
