//! BLAKE3-based hashing: pigeonhole addresses and their short prefixes.

/// `H(data)` as used throughout spec.md (`address_n = H(slotKey_n ‖ "addr")`).
pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// `adrShort`: the first 3 bytes of an address, hex-encoded (6 ascii chars) —
/// used by notifications and prefix lookups (§3, §4.6).
pub fn adr_short(address: &[u8; 32]) -> String {
    hex::encode(&address[0..3])
}
