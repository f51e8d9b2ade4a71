//! Watermark asset cache.
//!
//! Every batch run and every preview recompute needs the decoded watermark.
//! Decoding is cheap next to compositing, but a preview slider fires dozens
//! of recomputes a second with the same watermark file, so the last decoded
//! asset is kept and handed out as a shared [`Arc`].
//!
//! ## Cache key
//!
//! The key is the watermark **path** plus the SHA-256 of its **contents**.
//! Hashing the contents (rather than trusting mtime) means replacing the
//! file in place with a new logo is picked up on the next lookup, while an
//! untouched file is never decoded twice.
//!
//! Only the most recent asset is kept. Switching to another watermark and
//! back costs one decode each way.
//!
//! A path whose contents can't be read for hashing is decoded without being
//! cached; the backend reports the real error if there is one.

use crate::imaging::{BackendError, ImageBackend, WatermarkAsset};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

struct CachedAsset {
    path: PathBuf,
    content_hash: String,
    asset: Arc<WatermarkAsset>,
}

/// Last-decoded watermark, shared between batch runs and previews.
#[derive(Default)]
pub struct AssetCache {
    slot: Mutex<Option<CachedAsset>>,
    stats: Mutex<CacheStats>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the decoded watermark at `path`, decoding through `backend`
    /// only when the path or its contents changed since the last call.
    pub fn watermark<B: ImageBackend + ?Sized>(
        &self,
        backend: &B,
        path: &Path,
    ) -> Result<Arc<WatermarkAsset>, BackendError> {
        let content_hash = match hash_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "watermark not hashable, decoding uncached");
                self.record(CacheStats::miss);
                let raster = backend.decode(path)?;
                return Ok(Arc::new(WatermarkAsset::from_raster(raster)));
            }
        };

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = slot.as_ref()
            && cached.path == path
            && cached.content_hash == content_hash
        {
            self.record(CacheStats::hit);
            tracing::debug!(path = %path.display(), "watermark cache hit");
            return Ok(Arc::clone(&cached.asset));
        }

        self.record(CacheStats::miss);
        tracing::debug!(path = %path.display(), "watermark cache miss");
        let asset = Arc::new(WatermarkAsset::from_raster(backend.decode(path)?));
        *slot = Some(CachedAsset {
            path: path.to_path_buf(),
            content_hash,
            asset: Arc::clone(&asset),
        });
        Ok(asset)
    }

    /// Drop the cached asset. Counters are kept.
    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: fn(&mut CacheStats)) {
        event(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// SHA-256 of a file's contents, as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Summary of cache performance for a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hits, {} misses", self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use tempfile::TempDir;

    /// A real file on disk (for hashing) that the mock backend also serves.
    fn setup(name: &str, contents: &[u8]) -> (TempDir, PathBuf, MockBackend) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let backend = MockBackend::new().with_image(path.to_str().unwrap(), 40, 20, [0, 0, 0, 255]);
        (tmp, path, backend)
    }

    fn decode_count(backend: &MockBackend) -> usize {
        backend
            .get_operations()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Decode(_)))
            .count()
    }

    #[test]
    fn second_lookup_is_a_hit_sharing_the_asset() {
        let (_tmp, path, backend) = setup("logo.png", b"logo v1");
        let cache = AssetCache::new();

        let first = cache.watermark(&backend, &path).unwrap();
        let second = cache.watermark(&backend, &path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(decode_count(&backend), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn changed_contents_are_decoded_again() {
        let (_tmp, path, backend) = setup("logo.png", b"logo v1");
        let cache = AssetCache::new();

        cache.watermark(&backend, &path).unwrap();
        std::fs::write(&path, b"logo v2").unwrap();
        cache.watermark(&backend, &path).unwrap();

        assert_eq!(decode_count(&backend), 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn switching_paths_replaces_the_entry() {
        let (tmp, a, backend) = setup("a.png", b"same bytes");
        let b = tmp.path().join("b.png");
        std::fs::write(&b, b"same bytes").unwrap();
        let backend = backend.with_image(b.to_str().unwrap(), 10, 10, [1, 1, 1, 255]);
        let cache = AssetCache::new();

        cache.watermark(&backend, &a).unwrap();
        let from_b = cache.watermark(&backend, &b).unwrap();
        assert_eq!(from_b.width(), 10);
        cache.watermark(&backend, &a).unwrap();

        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 3 });
    }

    #[test]
    fn unreadable_path_decodes_without_caching() {
        let backend = MockBackend::new().with_image("/virtual/wm.png", 8, 8, [0, 0, 0, 255]);
        let cache = AssetCache::new();

        cache.watermark(&backend, Path::new("/virtual/wm.png")).unwrap();
        cache.watermark(&backend, Path::new("/virtual/wm.png")).unwrap();

        assert_eq!(decode_count(&backend), 2);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn decode_errors_are_not_cached() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"junk").unwrap();
        // Not registered with the mock: decode fails.
        let backend = MockBackend::new();
        let cache = AssetCache::new();

        assert!(cache.watermark(&backend, &path).is_err());
        assert!(cache.watermark(&backend, &path).is_err());
        assert_eq!(decode_count(&backend), 2);
    }

    #[test]
    fn clear_forces_a_decode() {
        let (_tmp, path, backend) = setup("logo.png", b"logo");
        let cache = AssetCache::new();

        cache.watermark(&backend, &path).unwrap();
        cache.clear();
        cache.watermark(&backend, &path).unwrap();
        assert_eq!(decode_count(&backend), 2);
    }

    #[test]
    fn hash_file_changes_with_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, b"one").unwrap();
        let h1 = hash_file(&path).unwrap();
        assert_eq!(h1, hash_file(&path).unwrap());
        assert_eq!(h1.len(), 64);
        std::fs::write(&path, b"two").unwrap();
        assert_ne!(h1, hash_file(&path).unwrap());
    }

    #[test]
    fn cache_stats_display() {
        let stats = CacheStats { hits: 5, misses: 2 };
        assert_eq!(stats.to_string(), "5 hits, 2 misses");
        assert_eq!(stats.total(), 7);
    }
}
