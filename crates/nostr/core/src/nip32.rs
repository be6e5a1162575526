//! NIP-32: Labeling.
//!
//! Label events (kind 1985) attach a namespaced label to other events via
//! `e` tags. Curators use them to surface notes about a piece of content; the
//! label itself carries no comment text.

use crate::nip01::Event;

/// Kind for label events.
pub const LABEL_KIND: u16 = 1985;
/// `["L", <namespace>]`
pub const LABEL_NAMESPACE_TAG: &str = "L";
/// `["l", <label>, <namespace>]`
pub const LABEL_TAG: &str = "l";

/// Event ids a label event points at, in tag order with duplicates removed.
///
/// Returns nothing for events of any other kind.
pub fn labeled_event_ids(event: &Event) -> Vec<String> {
    if event.kind != LABEL_KIND {
        return Vec::new();
    }

    let mut ids: Vec<String> = Vec::new();
    for id in event.tag_values("e") {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}
