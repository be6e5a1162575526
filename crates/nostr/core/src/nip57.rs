//! NIP-57: Lightning Zaps
//!
//! - Zap Request (kind 9734): signed payment intent handed to the recipient's
//!   LNURL callback, never published to relays by the sender
//! - Zap Receipt (kind 9735): published by the recipient's payment processor
//!   once the invoice is paid; its `description` tag is the zap request JSON
//!
//! Zaps addressed to off-protocol content carry `i` tags (NIP-73) instead of,
//! or alongside, `e`/`a` tags.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/57.md>

use crate::nip01::{Event, Nip01Error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for zap requests
pub const ZAP_REQUEST_KIND: u16 = 9734;

/// Event kind for zap receipts
pub const ZAP_RECEIPT_KIND: u16 = 9735;

/// Errors that can occur during NIP-57 operations
#[derive(Debug, Error)]
pub enum Nip57Error {
    #[error("invalid zap request: {0}")]
    InvalidZapRequest(String),

    #[error("invalid zap receipt: {0}")]
    InvalidZapReceipt(String),

    #[error("missing required tag: {0}")]
    MissingTag(String),

    #[error("invalid tag value: {0}")]
    InvalidTagValue(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("nip01 error: {0}")]
    Nip01(#[from] Nip01Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A parsed zap request (kind 9734)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZapRequest {
    /// The underlying event
    pub event: Event,
    /// Recipient's public key (hex)
    pub recipient_pubkey: String,
    /// Optional event being zapped (hex id)
    pub zapped_event: Option<String>,
    /// Relays the receipt should be published to
    pub relays: Vec<String>,
    /// Amount in millisats
    pub amount_msats: Option<u64>,
    /// Recipient's LNURL (bech32)
    pub lnurl: Option<String>,
    /// External content references (`i` tags)
    pub content_refs: Vec<String>,
    /// Sender comment
    pub content: String,
}

impl ZapRequest {
    pub fn from_event(event: Event) -> Result<Self, Nip57Error> {
        if event.kind != ZAP_REQUEST_KIND {
            return Err(Nip57Error::InvalidZapRequest(format!(
                "expected kind {}, got {}",
                ZAP_REQUEST_KIND, event.kind
            )));
        }

        let mut recipient_pubkey = None;
        let mut zapped_event = None;
        let mut relays = Vec::new();
        let mut amount_msats = None;
        let mut lnurl = None;
        let mut content_refs = Vec::new();

        for tag in &event.tags {
            let (Some(name), Some(value)) = (tag.first(), tag.get(1)) else {
                continue;
            };

            match name.as_str() {
                "p" => {
                    if recipient_pubkey.replace(value.clone()).is_some() {
                        return Err(Nip57Error::InvalidZapRequest(
                            "multiple p tags found".to_string(),
                        ));
                    }
                }
                "e" => {
                    if zapped_event.replace(value.clone()).is_some() {
                        return Err(Nip57Error::InvalidZapRequest(
                            "multiple e tags found".to_string(),
                        ));
                    }
                }
                "relays" => relays.extend(tag.iter().skip(1).cloned()),
                "amount" => {
                    amount_msats = Some(value.parse().map_err(|_| {
                        Nip57Error::InvalidTagValue(format!("invalid amount: {}", value))
                    })?);
                }
                "lnurl" => lnurl = Some(value.clone()),
                "i" => content_refs.push(value.clone()),
                _ => {}
            }
        }

        let recipient_pubkey = recipient_pubkey
            .ok_or_else(|| Nip57Error::MissingTag("p tag (recipient pubkey)".to_string()))?;

        Ok(Self {
            content: event.content.clone(),
            event,
            recipient_pubkey,
            zapped_event,
            relays,
            amount_msats,
            lnurl,
            content_refs,
        })
    }

    /// Validate the zap request according to NIP-57 Appendix D
    pub fn validate(&self) -> Result<(), Nip57Error> {
        if self.relays.is_empty() {
            return Err(Nip57Error::Validation(
                "relays tag should be present".to_string(),
            ));
        }
        if self.amount_msats == Some(0) {
            return Err(Nip57Error::Validation("amount must be positive".to_string()));
        }
        Ok(())
    }
}

/// A parsed zap receipt (kind 9735)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZapReceipt {
    /// The underlying event
    pub event: Event,
    /// Recipient's public key (from original zap request)
    pub recipient_pubkey: String,
    /// Sender's public key (from original zap request)
    pub sender_pubkey: Option<String>,
    /// Optional event that was zapped
    pub zapped_event: Option<String>,
    /// BOLT-11 invoice that was paid
    pub bolt11: String,
    /// JSON-encoded zap request
    pub description: String,
    /// Optional payment preimage
    pub preimage: Option<String>,
}

impl ZapReceipt {
    pub fn from_event(event: Event) -> Result<Self, Nip57Error> {
        if event.kind != ZAP_RECEIPT_KIND {
            return Err(Nip57Error::InvalidZapReceipt(format!(
                "expected kind {}, got {}",
                ZAP_RECEIPT_KIND, event.kind
            )));
        }

        let required = |name: &str| {
            event
                .tag_value(name)
                .map(str::to_string)
                .ok_or_else(|| Nip57Error::MissingTag(format!("{} tag", name)))
        };

        let recipient_pubkey = required("p")?;
        let bolt11 = required("bolt11")?;
        let description = required("description")?;
        let sender_pubkey = event.tag_value("P").map(str::to_string);
        let zapped_event = event.tag_value("e").map(str::to_string);
        let preimage = event.tag_value("preimage").map(str::to_string);

        Ok(Self {
            event,
            recipient_pubkey,
            sender_pubkey,
            zapped_event,
            bolt11,
            description,
            preimage,
        })
    }

    /// Get the zap request from the description field
    pub fn get_zap_request(&self) -> Result<ZapRequest, Nip57Error> {
        let event: Event = serde_json::from_str(&self.description)?;
        ZapRequest::from_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Example zap request from NIP-57, plus an external content reference
    fn example_zap_request() -> Event {
        Event {
            kind: 9734,
            content: "Zap!".to_string(),
            tags: vec![
                vec![
                    "relays".to_string(),
                    "wss://nostr-pub.wellorder.com".to_string(),
                    "wss://anotherrelay.example.com".to_string(),
                ],
                vec!["amount".to_string(), "21000".to_string()],
                vec![
                    "lnurl".to_string(),
                    "lnurl1dp68gurn8ghj7um5v93kketj9ehx2amn9uh8wetvdskkkmn0wahz7mrww4excup0dajx2mrv92x9xp".to_string(),
                ],
                vec![
                    "p".to_string(),
                    "04c915daefee38317fa734444acee390a8269fe5810b2241e5e6dd343dfbecc9".to_string(),
                ],
                vec![
                    "e".to_string(),
                    "9ae37aa68f48645127299e9453eb5d908a0cbb6058ff340d528ed4d37c8994fb".to_string(),
                ],
                vec!["i".to_string(), "podcast:item:guid:abc-123".to_string()],
            ],
            pubkey: "97c70a44366a6535c145b333f973ea86dfdc2d7a99da618c40c64705ad98e322".to_string(),
            created_at: 1679673265,
            id: "30efed56a035b2549fcaeec0bf2c1595f9a9b3bb4b1a38abaf8ee9041c4b7d93".to_string(),
            sig: "f2cb581a84ed10e4dc84937bd98e27acac71ab057255f6aa8dfa561808c981fe8870f4a03c1e3666784d82a9c802d3704e174371aa13d63e2aeaf24ff5374d9d".to_string(),
        }
    }

    fn receipt_with_tags(tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "67b48a14fb66c60c8f9070bdeb37afdfcc3d08ad01989460448e4081eddda446".to_string(),
            pubkey: "9630f464cca6a5147aa8a35f0bcdd3ce485324e732fd39e09233b1d848238f31".to_string(),
            created_at: 1674164545,
            kind: 9735,
            tags,
            content: "".to_string(),
            sig: "...".to_string(),
        }
    }

    fn full_receipt() -> Event {
        let description = serde_json::to_string(&example_zap_request()).unwrap();
        receipt_with_tags(vec![
            vec![
                "p".to_string(),
                "32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245".to_string(),
            ],
            vec![
                "P".to_string(),
                "97c70a44366a6535c145b333f973ea86dfdc2d7a99da618c40c64705ad98e322".to_string(),
            ],
            vec!["bolt11".to_string(), "lnbc10u1p3unwfusp5t9r3yymhpfq".to_string()],
            vec!["description".to_string(), description],
            vec![
                "preimage".to_string(),
                "5d006d2cf1e73c7148e7519a4c68adc81642ce0e25a432b2434c99f97344c15f".to_string(),
            ],
        ])
    }

    #[test]
    fn test_zap_request_from_event() {
        let zap_req = ZapRequest::from_event(example_zap_request()).expect("should parse");

        assert_eq!(
            zap_req.recipient_pubkey,
            "04c915daefee38317fa734444acee390a8269fe5810b2241e5e6dd343dfbecc9"
        );
        assert_eq!(zap_req.amount_msats, Some(21000));
        assert_eq!(zap_req.content, "Zap!");
        assert_eq!(zap_req.relays.len(), 2);
        assert_eq!(zap_req.content_refs, vec!["podcast:item:guid:abc-123"]);
        zap_req.validate().expect("should validate");
    }

    #[test]
    fn test_zap_request_missing_p_tag() {
        let mut event = example_zap_request();
        event.tags.retain(|tag| tag[0] != "p");
        assert!(matches!(
            ZapRequest::from_event(event),
            Err(Nip57Error::MissingTag(_))
        ));
    }

    #[test]
    fn test_zap_request_multiple_p_tags() {
        let mut event = example_zap_request();
        event.tags.push(vec!["p".to_string(), "ff".repeat(32)]);
        assert!(ZapRequest::from_event(event).is_err());
    }

    #[test]
    fn test_zap_request_bad_amount() {
        let mut event = example_zap_request();
        event.tags[1] = vec!["amount".to_string(), "lots".to_string()];
        assert!(matches!(
            ZapRequest::from_event(event),
            Err(Nip57Error::InvalidTagValue(_))
        ));
    }

    #[test]
    fn test_zap_request_wrong_kind() {
        let mut event = example_zap_request();
        event.kind = 1;
        assert!(ZapRequest::from_event(event).is_err());
    }

    #[test]
    fn test_zap_receipt_from_event() {
        let receipt = ZapReceipt::from_event(full_receipt()).expect("should parse");

        assert_eq!(
            receipt.recipient_pubkey,
            "32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245"
        );
        assert_eq!(
            receipt.sender_pubkey.as_deref(),
            Some("97c70a44366a6535c145b333f973ea86dfdc2d7a99da618c40c64705ad98e322")
        );
        assert!(receipt.bolt11.starts_with("lnbc"));
        assert!(receipt.preimage.is_some());

        let request = receipt.get_zap_request().expect("should get zap request");
        assert_eq!(request.amount_msats, Some(21000));
        assert_eq!(request.content, "Zap!");
    }

    #[test]
    fn test_zap_receipt_missing_bolt11() {
        let mut event = full_receipt();
        event.tags.retain(|tag| tag[0] != "bolt11");
        assert!(ZapReceipt::from_event(event).is_err());
    }

    #[test]
    fn test_zap_receipt_rejects_bad_description() {
        let with_description = |description: String| {
            let mut event = full_receipt();
            for tag in event.tags.iter_mut().filter(|tag| tag[0] == "description") {
                tag[1] = description.clone();
            }
            ZapReceipt::from_event(event).expect("receipt tags are intact")
        };

        assert!(matches!(
            with_description("{not json".to_string()).get_zap_request(),
            Err(Nip57Error::Json(_))
        ));

        let note = Event {
            kind: 1,
            ..example_zap_request()
        };
        assert!(matches!(
            with_description(serde_json::to_string(&note).unwrap()).get_zap_request(),
            Err(Nip57Error::InvalidZapRequest(_))
        ));
    }
}
