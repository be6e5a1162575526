//! NIP-19: bech32-encoded entities.
//!
//! Only the entities this crate consumes are supported: `npub`, `note` and
//! the TLV-encoded `nevent`. Unknown TLV entries are skipped as the NIP requires.

use bech32::{Bech32, Hrp};
use thiserror::Error;

const NPUB_HRP: &str = "npub";
const NOTE_HRP: &str = "note";
const NEVENT_HRP: &str = "nevent";

const TLV_SPECIAL: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

/// Errors that can occur during NIP-19 encoding or decoding.
#[derive(Debug, Error)]
pub enum Nip19Error {
    #[error("bech32 encode error: {0}")]
    Bech32Encode(String),

    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    #[error("unsupported prefix: {0}")]
    UnsupportedPrefix(String),

    #[error("invalid length for {field}: expected {expected}, got {got}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("truncated TLV entry")]
    TruncatedTlv,

    #[error("missing TLV entry: {0}")]
    MissingTlv(&'static str),

    #[error("relay url is not valid utf-8")]
    InvalidRelay,
}

/// Pointer to an event with optional hints (`nevent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPointer {
    pub id: [u8; 32],
    pub relays: Vec<String>,
    pub author: Option<[u8; 32]>,
    pub kind: Option<u32>,
}

impl EventPointer {
    /// Event id as lowercase hex.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

/// A decoded NIP-19 entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nip19Entity {
    Pubkey([u8; 32]),
    Note([u8; 32]),
    Event(EventPointer),
}

impl Nip19Entity {
    /// The referenced event id, for `note` and `nevent` entities.
    pub fn event_id(&self) -> Option<[u8; 32]> {
        match self {
            Nip19Entity::Note(id) => Some(*id),
            Nip19Entity::Event(pointer) => Some(pointer.id),
            Nip19Entity::Pubkey(_) => None,
        }
    }
}

fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String, Nip19Error> {
    let hrp = Hrp::parse(hrp).map_err(|e| Nip19Error::Bech32Encode(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Nip19Error::Bech32Encode(e.to_string()))
}

fn to_array(field: &'static str, bytes: &[u8]) -> Result<[u8; 32], Nip19Error> {
    bytes.try_into().map_err(|_| Nip19Error::InvalidLength {
        field,
        expected: 32,
        got: bytes.len(),
    })
}

/// Encode a 32-byte public key as `npub`.
pub fn encode_npub(pubkey: &[u8; 32]) -> Result<String, Nip19Error> {
    encode_bech32(NPUB_HRP, pubkey)
}

/// Encode a 32-byte event id as `note`.
pub fn encode_note(event_id: &[u8; 32]) -> Result<String, Nip19Error> {
    encode_bech32(NOTE_HRP, event_id)
}

/// Encode an event pointer as `nevent`.
pub fn encode_nevent(pointer: &EventPointer) -> Result<String, Nip19Error> {
    let mut tlv = Vec::with_capacity(34 + pointer.relays.len() * 32);

    tlv.push(TLV_SPECIAL);
    tlv.push(32);
    tlv.extend_from_slice(&pointer.id);

    for relay in &pointer.relays {
        let bytes = relay.as_bytes();
        let len = u8::try_from(bytes.len()).map_err(|_| Nip19Error::InvalidLength {
            field: "relay",
            expected: u8::MAX as usize,
            got: bytes.len(),
        })?;
        tlv.push(TLV_RELAY);
        tlv.push(len);
        tlv.extend_from_slice(bytes);
    }

    if let Some(author) = pointer.author {
        tlv.push(TLV_AUTHOR);
        tlv.push(32);
        tlv.extend_from_slice(&author);
    }

    if let Some(kind) = pointer.kind {
        tlv.push(TLV_KIND);
        tlv.push(4);
        tlv.extend_from_slice(&kind.to_be_bytes());
    }

    encode_bech32(NEVENT_HRP, &tlv)
}

/// Decode any supported NIP-19 string.
pub fn decode(encoded: &str) -> Result<Nip19Entity, Nip19Error> {
    let (hrp, data) =
        bech32::decode(encoded).map_err(|e| Nip19Error::Bech32Decode(e.to_string()))?;

    match hrp.to_lowercase().as_str() {
        NPUB_HRP => Ok(Nip19Entity::Pubkey(to_array("pubkey", &data)?)),
        NOTE_HRP => Ok(Nip19Entity::Note(to_array("event id", &data)?)),
        NEVENT_HRP => decode_nevent_tlv(&data).map(Nip19Entity::Event),
        other => Err(Nip19Error::UnsupportedPrefix(other.to_string())),
    }
}

fn decode_nevent_tlv(data: &[u8]) -> Result<EventPointer, Nip19Error> {
    let mut id = None;
    let mut relays = Vec::new();
    let mut author = None;
    let mut kind = None;

    let mut rest = data;
    while !rest.is_empty() {
        let [t, len, tail @ ..] = rest else {
            return Err(Nip19Error::TruncatedTlv);
        };
        let len = *len as usize;
        if tail.len() < len {
            return Err(Nip19Error::TruncatedTlv);
        }
        let (value, next) = tail.split_at(len);

        match *t {
            TLV_SPECIAL => id = Some(to_array("event id", value)?),
            TLV_RELAY => relays.push(
                String::from_utf8(value.to_vec()).map_err(|_| Nip19Error::InvalidRelay)?,
            ),
            TLV_AUTHOR => author = Some(to_array("author", value)?),
            TLV_KIND => {
                let bytes: [u8; 4] = value.try_into().map_err(|_| Nip19Error::InvalidLength {
                    field: "kind",
                    expected: 4,
                    got: value.len(),
                })?;
                kind = Some(u32::from_be_bytes(bytes));
            }
            _ => {}
        }
        rest = next;
    }

    Ok(EventPointer {
        id: id.ok_or(Nip19Error::MissingTlv("special"))?,
        relays,
        author,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_npub_known_vector() {
        let pubkey: [u8; 32] =
            hex::decode("3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d")
                .unwrap()
                .try_into()
                .unwrap();
        let npub = encode_npub(&pubkey).unwrap();
        assert_eq!(
            npub,
            "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6"
        );
        assert_eq!(decode(&npub).unwrap(), Nip19Entity::Pubkey(pubkey));
    }

    #[test]
    fn test_note_decode() {
        let id = [7u8; 32];
        let note = encode_note(&id).unwrap();
        assert!(note.starts_with("note1"));

        let entity = decode(&note).unwrap();
        assert_eq!(entity.event_id(), Some(id));
    }

    #[test]
    fn test_nevent_with_all_fields() {
        let pointer = EventPointer {
            id: [1u8; 32],
            relays: vec![
                "wss://relay.example.com".to_string(),
                "wss://nos.lol".to_string(),
            ],
            author: Some([2u8; 32]),
            kind: Some(9735),
        };

        let nevent = encode_nevent(&pointer).unwrap();
        assert!(nevent.starts_with("nevent1"));
        assert_eq!(decode(&nevent).unwrap(), Nip19Entity::Event(pointer));
    }

    #[test]
    fn test_nevent_skips_unknown_tlv() {
        let mut tlv = vec![TLV_SPECIAL, 32];
        tlv.extend_from_slice(&[9u8; 32]);
        tlv.extend_from_slice(&[42, 3, b'a', b'b', b'c']);
        let nevent = encode_bech32(NEVENT_HRP, &tlv).unwrap();

        let Nip19Entity::Event(pointer) = decode(&nevent).unwrap() else {
            panic!("expected event pointer");
        };
        assert_eq!(pointer.id, [9u8; 32]);
        assert!(pointer.relays.is_empty());
    }

    #[test]
    fn test_nevent_without_id_rejected() {
        let tlv = vec![TLV_RELAY, 3, b'w', b's', b's'];
        let nevent = encode_bech32(NEVENT_HRP, &tlv).unwrap();
        assert!(matches!(decode(&nevent), Err(Nip19Error::MissingTlv(_))));
    }

    #[test]
    fn test_nevent_truncated_rejected() {
        let tlv = vec![TLV_SPECIAL, 32, 1, 2, 3];
        let nevent = encode_bech32(NEVENT_HRP, &tlv).unwrap();
        assert!(matches!(decode(&nevent), Err(Nip19Error::TruncatedTlv)));
    }

    #[test]
    fn test_rejects_unknown_prefix_and_garbage() {
        let nsec = encode_bech32("nsec", &[3u8; 32]).unwrap();
        assert!(matches!(decode(&nsec), Err(Nip19Error::UnsupportedPrefix(_))));
        assert!(decode("nevent1notbech32").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_wrong_payload_length() {
        let short = encode_bech32(NOTE_HRP, &[1u8; 16]).unwrap();
        assert!(matches!(
            decode(&short),
            Err(Nip19Error::InvalidLength { expected: 32, got: 16, .. })
        ));
    }
}
