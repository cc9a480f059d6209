//! The raw-data cache: an LRU map from tile id to fetched bytes, stamped
//! with the source generation it was fetched under so a stale hit never
//! short-circuits the network after a `clear()`.

use bytes::Bytes;
use moka::sync::Cache;

use crate::id::TileId;

#[derive(Debug, Clone)]
pub struct CachedRawData {
    pub bytes: Bytes,
    pub generation: i64,
}

pub struct RawDataCache {
    inner: Cache<TileId, CachedRawData>,
}

impl RawDataCache {
    pub fn new(capacity_bytes: u64) -> Self {
        let inner = Cache::builder()
            .weigher(|_key, value: &CachedRawData| value.bytes.len() as u32)
            .max_capacity(capacity_bytes)
            .build();
        RawDataCache { inner }
    }

    /// Returns the cached bytes only if they were stamped with
    /// `current_generation`; a hit from a prior generation is treated as a
    /// miss so the caller falls through to the network.
    pub fn get_fresh(&self, tile_id: TileId, current_generation: i64) -> Option<Bytes> {
        self.inner.get(&tile_id).and_then(|entry| {
            if entry.generation == current_generation {
                Some(entry.bytes)
            } else {
                None
            }
        })
    }

    pub fn insert(&self, tile_id: TileId, bytes: Bytes, generation: i64) {
        self.inner.insert(tile_id, CachedRawData { bytes, generation });
    }

    pub fn invalidate(&self, tile_id: TileId) {
        self.inner.invalidate(&tile_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_generation_is_treated_as_a_miss() {
        let cache = RawDataCache::new(1024);
        let tile = TileId::new(0, 0, 0);
        cache.insert(tile, Bytes::from_static(b"data"), 1);
        assert!(cache.get_fresh(tile, 1).is_some());
        assert!(cache.get_fresh(tile, 2).is_none());
    }
}
