//! Cuckoo-filter-backed MSPSI publication set (supplemented feature #3:
//! the server-side publication is a probabilistic set, not a plaintext
//! list, so it leaks no more than the filter's false-positive rate).
//!
//! A publication holds one OPRF point per mention in the source document,
//! bucketed into a `CuckooFilter` sized with headroom so insertion does not
//! fail under normal load.

use cuckoofilter::CuckooFilter;
use std::collections::hash_map::DefaultHasher;

use crate::error::CryptoError;

/// Capacity headroom over the raw mention count. Cuckoo filters reject
/// insertions once load factor gets too high; 4x keeps failures rare for
/// the mention counts real documents produce.
pub const OVERSIZE_FACTOR: usize = 4;

pub struct PublicationFilter {
    inner: CuckooFilter<DefaultHasher>,
}

impl PublicationFilter {
    /// Build an empty filter sized for `nb_items` insertions.
    pub fn with_capacity(nb_items: usize) -> Self {
        let capacity = nb_items.max(1) * OVERSIZE_FACTOR;
        Self {
            inner: CuckooFilter::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, point_bytes: &[u8; 32]) -> Result<(), CryptoError> {
        self.inner
            .add(point_bytes)
            .map_err(|e| CryptoError::CuckooFilter(format!("{:?}", e)))
    }

    pub fn contains(&self, point_bytes: &[u8; 32]) -> bool {
        self.inner.contains(point_bytes)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        bincode::serialize(&self.inner).map_err(|e| CryptoError::CuckooFilter(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner: CuckooFilter<DefaultHasher> =
            bincode::deserialize(bytes).map_err(|e| CryptoError::CuckooFilter(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let mut filter = PublicationFilter::with_capacity(10);
        let point = [42u8; 32];
        filter.insert(&point).unwrap();
        assert!(filter.contains(&point));
        assert!(!filter.contains(&[1u8; 32]));
    }

    #[test]
    fn serialises_round_trip() {
        let mut filter = PublicationFilter::with_capacity(10);
        filter.insert(&[9u8; 32]).unwrap();
        let bytes = filter.to_bytes().unwrap();
        let restored = PublicationFilter::from_bytes(&bytes).unwrap();
        assert!(restored.contains(&[9u8; 32]));
    }
}
