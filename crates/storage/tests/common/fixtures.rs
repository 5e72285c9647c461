use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use vitrine_storage::{Limits, Manifest, ManifestFile, PreviewStore};

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

pub fn limits(max_items: usize, max_bytes: u64) -> Limits {
    Limits {
        max_items,
        max_bytes,
        ttl: Duration::from_secs(3600),
    }
}

/// A store in a fresh temporary directory. Keep the `TempDir` alive.
pub async fn temp_store(limits: Limits) -> (TempDir, PreviewStore) {
    let dir = TempDir::new().unwrap();
    let store = PreviewStore::with_limits(dir.path(), limits).await.unwrap();
    (dir, store)
}

pub async fn read_manifest(dir: &Path) -> Manifest {
    ManifestFile::in_dir(dir).read().await.unwrap()
}

/// File names in `dir`, sorted.
pub async fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
