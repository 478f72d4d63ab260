//! Tagged binary wire messages exchanged over `/bb/broadcast`, `/ph/*` and
//! `/notifications` (spec §6). The first byte of every frame is a tag;
//! everything after it is message-specific, manually framed rather than
//! using a self-describing format, so the server never has to parse more
//! than a tag byte to route a frame.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTag {
    Query,
    PigeonholeMessage,
    Notification,
    Publication,
}

impl WireTag {
    fn byte(self) -> u8 {
        match self {
            WireTag::Query => 0,
            WireTag::PigeonholeMessage => 1,
            WireTag::Notification => 2,
            WireTag::Publication => 3,
        }
    }

    fn from_byte(b: u8) -> Result<Self, ProtoError> {
        match b {
            0 => Ok(WireTag::Query),
            1 => Ok(WireTag::PigeonholeMessage),
            2 => Ok(WireTag::Notification),
            3 => Ok(WireTag::Publication),
            other => Err(ProtoError::UnknownTag(other)),
        }
    }
}

/// `tag‖publicKey(32)‖tokenPublicKey(32)‖blindSignature(64)‖ed25519Signature(64)‖payload`
#[derive(Debug, Clone)]
pub struct Query {
    pub public_key: [u8; 32],
    pub token_public_key: [u8; 32],
    pub blind_signature: [u8; 64],
    pub ed25519_signature: [u8; 64],
    pub payload: Vec<u8>,
}

impl Query {
    pub const FIXED_LEN: usize = 1 + 32 + 32 + 64 + 64;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::FIXED_LEN + self.payload.len());
        out.push(WireTag::Query.byte());
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.token_public_key);
        out.extend_from_slice(&self.blind_signature);
        out.extend_from_slice(&self.ed25519_signature);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < Self::FIXED_LEN {
            return Err(ProtoError::Truncated("query frame"));
        }
        expect_tag(bytes[0], WireTag::Query)?;
        let mut off = 1;
        let public_key = take32(bytes, &mut off);
        let token_public_key = take32(bytes, &mut off);
        let blind_signature = take64(bytes, &mut off);
        let ed25519_signature = take64(bytes, &mut off);
        let payload = bytes[off..].to_vec();
        Ok(Self {
            public_key,
            token_public_key,
            blind_signature,
            ed25519_signature,
            payload,
        })
    }
}

/// `tag‖address(32)‖fromKey(32)‖payload` — shared shape for RESPONSE,
/// MESSAGE and PIGEONHOLE_MESSAGE frames.
#[derive(Debug, Clone)]
pub struct PigeonholeMessage {
    pub address: [u8; 32],
    pub from_key: [u8; 32],
    pub payload: Vec<u8>,
}

impl PigeonholeMessage {
    pub const FIXED_LEN: usize = 1 + 32 + 32;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::FIXED_LEN + self.payload.len());
        out.push(WireTag::PigeonholeMessage.byte());
        out.extend_from_slice(&self.address);
        out.extend_from_slice(&self.from_key);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < Self::FIXED_LEN {
            return Err(ProtoError::Truncated("pigeonhole message frame"));
        }
        expect_tag(bytes[0], WireTag::PigeonholeMessage)?;
        let mut off = 1;
        let address = take32(bytes, &mut off);
        let from_key = take32(bytes, &mut off);
        let payload = bytes[off..].to_vec();
        Ok(Self {
            address,
            from_key,
            payload,
        })
    }
}

/// `tag‖adrShortHex(6 ascii)` — the 3-byte address prefix, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub adr_short_hex: String,
}

impl Notification {
    pub const LEN: usize = 1 + 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(WireTag::Notification.byte());
        out.extend_from_slice(self.adr_short_hex.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() != Self::LEN {
            return Err(ProtoError::Truncated("notification frame"));
        }
        expect_tag(bytes[0], WireTag::Notification)?;
        let adr_short_hex = std::str::from_utf8(&bytes[1..])
            .map_err(|_| ProtoError::Malformed("adrShortHex is not ASCII"))?
            .to_owned();
        Ok(Self { adr_short_hex })
    }
}

/// `tag‖nym‖publisherPublicKey(32)‖serialized(cuckooFilter)‖nbDocs(u32)`.
/// `nym` and the filter are variable-length so each carries a u16/u32
/// length prefix.
#[derive(Debug, Clone)]
pub struct Publication {
    pub nym: String,
    pub publisher_public_key: [u8; 32],
    pub cuckoo_filter: Vec<u8>,
    pub nb_docs: u32,
}

impl Publication {
    pub fn encode(&self) -> Vec<u8> {
        let nym_bytes = self.nym.as_bytes();
        let mut out = Vec::with_capacity(1 + 2 + nym_bytes.len() + 32 + 4 + self.cuckoo_filter.len() + 4);
        out.push(WireTag::Publication.byte());
        out.extend_from_slice(&(nym_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(nym_bytes);
        out.extend_from_slice(&self.publisher_public_key);
        out.extend_from_slice(&(self.cuckoo_filter.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.cuckoo_filter);
        out.extend_from_slice(&self.nb_docs.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.is_empty() {
            return Err(ProtoError::Truncated("publication frame"));
        }
        expect_tag(bytes[0], WireTag::Publication)?;
        let mut off = 1;

        let nym_len = take_u16(bytes, &mut off)? as usize;
        let nym = take_slice(bytes, &mut off, nym_len)?;
        let nym = std::str::from_utf8(nym)
            .map_err(|_| ProtoError::Malformed("nym is not valid UTF-8"))?
            .to_owned();

        let publisher_public_key_slice = take_slice(bytes, &mut off, 32)?;
        let mut publisher_public_key = [0u8; 32];
        publisher_public_key.copy_from_slice(publisher_public_key_slice);

        let filter_len = take_u32(bytes, &mut off)? as usize;
        let cuckoo_filter = take_slice(bytes, &mut off, filter_len)?.to_vec();

        let nb_docs = take_u32(bytes, &mut off)?;

        Ok(Self {
            nym,
            publisher_public_key,
            cuckoo_filter,
            nb_docs,
        })
    }
}

/// Decoded frame, for dispatch by the coordinator (spec §4.9).
#[derive(Debug, Clone)]
pub enum WireMessage {
    Query(Query),
    PigeonholeMessage(PigeonholeMessage),
    Notification(Notification),
    Publication(Publication),
}

impl WireMessage {
    pub fn into_query(self) -> Option<Query> {
        match self {
            WireMessage::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn into_pigeonhole_message(self) -> Option<PigeonholeMessage> {
        match self {
            WireMessage::PigeonholeMessage(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_notification(self) -> Option<Notification> {
        match self {
            WireMessage::Notification(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_publication(self) -> Option<Publication> {
        match self {
            WireMessage::Publication(p) => Some(p),
            _ => None,
        }
    }
}

pub fn decode_any(bytes: &[u8]) -> Result<WireMessage, ProtoError> {
    if bytes.is_empty() {
        return Err(ProtoError::Truncated("empty frame"));
    }
    match WireTag::from_byte(bytes[0])? {
        WireTag::Query => Ok(WireMessage::Query(Query::decode(bytes)?)),
        WireTag::PigeonholeMessage => Ok(WireMessage::PigeonholeMessage(PigeonholeMessage::decode(bytes)?)),
        WireTag::Notification => Ok(WireMessage::Notification(Notification::decode(bytes)?)),
        WireTag::Publication => Ok(WireMessage::Publication(Publication::decode(bytes)?)),
    }
}

/// MessagePack-encoded query payload for the CLEARTEXT query type
/// (spec §4.3 step 3). DPSI payloads are MessagePack of raw blinded OPRF
/// points and are encoded by the caller directly (see `dsnet_client::mspsi`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleartextQueryPayload {
    pub keywords: Vec<String>,
}

fn expect_tag(byte: u8, expected: WireTag) -> Result<(), ProtoError> {
    let got = WireTag::from_byte(byte)?;
    if got == expected {
        Ok(())
    } else {
        Err(ProtoError::UnexpectedTag)
    }
}

fn take32(bytes: &[u8], off: &mut usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[*off..*off + 32]);
    *off += 32;
    out
}

fn take64(bytes: &[u8], off: &mut usize) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&bytes[*off..*off + 64]);
    *off += 64;
    out
}

fn take_slice<'a>(bytes: &'a [u8], off: &mut usize, len: usize) -> Result<&'a [u8], ProtoError> {
    if *off + len > bytes.len() {
        return Err(ProtoError::Truncated("variable-length field"));
    }
    let slice = &bytes[*off..*off + len];
    *off += len;
    Ok(slice)
}

fn take_u16(bytes: &[u8], off: &mut usize) -> Result<u16, ProtoError> {
    let slice = take_slice(bytes, off, 2)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn take_u32(bytes: &[u8], off: &mut usize) -> Result<u32, ProtoError> {
    let slice = take_slice(bytes, off, 4)?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_round_trips() {
        let q = Query {
            public_key: [1u8; 32],
            token_public_key: [2u8; 32],
            blind_signature: [3u8; 64],
            ed25519_signature: [4u8; 64],
            payload: b"hello".to_vec(),
        };
        let decoded = Query::decode(&q.encode()).unwrap();
        assert_eq!(decoded.public_key, q.public_key);
        assert_eq!(decoded.payload, q.payload);
    }

    #[test]
    fn pigeonhole_message_round_trips() {
        let m = PigeonholeMessage {
            address: [7u8; 32],
            from_key: [8u8; 32],
            payload: vec![0xAB; 512],
        };
        let decoded = PigeonholeMessage::decode(&m.encode()).unwrap();
        assert_eq!(decoded.address, m.address);
        assert_eq!(decoded.payload, m.payload);
    }

    #[test]
    fn notification_round_trips() {
        let n = Notification {
            adr_short_hex: "a1b2c3".into(),
        };
        let decoded = Notification::decode(&n.encode()).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn publication_round_trips() {
        let p = Publication {
            nym: "node-nym".into(),
            publisher_public_key: [5u8; 32],
            cuckoo_filter: vec![1, 2, 3, 4, 5],
            nb_docs: 42,
        };
        let decoded = Publication::decode(&p.encode()).unwrap();
        assert_eq!(decoded.nym, p.nym);
        assert_eq!(decoded.cuckoo_filter, p.cuckoo_filter);
        assert_eq!(decoded.nb_docs, 42);
    }

    #[test]
    fn decode_any_dispatches_on_tag() {
        let n = Notification {
            adr_short_hex: "ffffff".into(),
        };
        match decode_any(&n.encode()).unwrap() {
            WireMessage::Notification(got) => assert_eq!(got, n),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(decode_any(&[99]).is_err());
    }
}
