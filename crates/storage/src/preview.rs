//! The preview artifact store.
//!
//! Artifacts live as `<id>.img` files in one directory next to the
//! manifest. Every mutation (admission, eviction, expiry, sweeping) runs as
//! a manifest job, so budgets are enforced against a consistent view even
//! under concurrent writers.

use crate::atomic;
use crate::error::{StorageError, StorageResult};
use crate::eviction::{EvictionPolicy, Limits, Plan, Verdict};
use crate::manifest::{MANIFEST_FILENAME, Manifest, ManifestEntry, ManifestFile, ManifestStore};
use crate::metrics;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use vitrine_core::ArtifactId;
use vitrine_core::clock::now_ms;
use vitrine_core::config::PreviewConfig;

/// Result of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries dropped because their retention period elapsed.
    pub expired: usize,
    /// Entries dropped because their file was gone.
    pub missing: usize,
    /// Unindexed files removed from the directory.
    pub orphans: usize,
    /// Entries whose recorded size was corrected from the file on disk.
    pub resized: usize,
    /// Bytes freed on disk.
    pub bytes_reclaimed: u64,
}

impl SweepStats {
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.missing == 0 && self.orphans == 0 && self.resized == 0
    }
}

/// Current occupancy according to the manifest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PreviewStats {
    pub items: usize,
    pub bytes: u64,
}

/// Disk-backed store for rendered previews.
#[derive(Clone)]
pub struct PreviewStore {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    manifest: ManifestStore,
    policy: EvictionPolicy,
}

struct DiskFile {
    name: String,
    len: u64,
    modified: Option<SystemTime>,
}

impl PreviewStore {
    /// Open (creating if needed) the store described by `config`.
    pub async fn open(config: &PreviewConfig) -> StorageResult<Self> {
        Self::with_limits(&config.path, Limits::from(config)).await
    }

    /// Open the store at `root` with explicit budgets.
    pub async fn with_limits(root: impl AsRef<Path>, limits: Limits) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let manifest = ManifestStore::spawn(ManifestFile::in_dir(&root));

        debug!(
            root = %root.display(),
            max_items = limits.max_items,
            max_bytes = limits.max_bytes,
            ttl_secs = limits.ttl.as_secs(),
            "Opened preview store"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                root,
                manifest,
                policy: EvictionPolicy::new(limits),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn limits(&self) -> &Limits {
        self.inner.policy.limits()
    }

    /// Store `data` as a new artifact, evicting older ones as needed.
    ///
    /// Fails with `CapacityExceeded` when `data` alone is larger than the
    /// byte budget, `TemporarilyFull` when eviction cannot make room, and
    /// `Aborted` when `cancel` fires before the artifact is written.
    #[instrument(skip(self, data, cancel), fields(size = data.len()))]
    pub async fn put(&self, data: Bytes, cancel: &CancellationToken) -> StorageResult<ArtifactId> {
        if cancel.is_cancelled() {
            metrics::record_rejection("aborted");
            return Err(StorageError::Aborted);
        }

        let inner = self.inner.clone();
        let cancel = cancel.clone();
        self.inner
            .manifest
            .run(move |file| async move { inner.admit(&file, data, &cancel).await })
            .await?
    }

    /// Read the artifact `id`.
    #[instrument(skip(self, cancel), fields(artifact = %id))]
    pub async fn get(&self, id: &ArtifactId, cancel: &CancellationToken) -> StorageResult<Bytes> {
        if cancel.is_cancelled() {
            return Err(StorageError::Aborted);
        }

        let path = self.inner.root.join(id.filename());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Aborted),
            read = fs::read(&path) => match read {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(id.to_string()))
                }
                Err(e) => Err(StorageError::Io(e)),
            },
        }
    }

    /// Drop expired and missing entries and remove orphaned files.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> StorageResult<SweepStats> {
        let inner = self.inner.clone();
        self.inner
            .manifest
            .run(move |file| async move { inner.sweep(&file).await })
            .await?
    }

    /// Item count and total bytes according to the manifest.
    pub async fn stats(&self) -> StorageResult<PreviewStats> {
        let manifest = self
            .inner
            .manifest
            .run(|file| async move { file.read().await })
            .await??;
        Ok(PreviewStats {
            items: manifest.len(),
            bytes: manifest.total_bytes(),
        })
    }
}

impl std::fmt::Debug for PreviewStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewStore")
            .field("root", &self.inner.root)
            .field("limits", self.inner.policy.limits())
            .finish()
    }
}

impl Inner {
    async fn admit(
        &self,
        file: &ManifestFile,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> StorageResult<ArtifactId> {
        let size = data.len() as u64;
        let manifest = file.read().await?;
        let present = self.artifact_names().await?;
        let (plan, verdict) = self.policy.plan(manifest.items, size, now_ms(), &present);

        if verdict == Verdict::CapacityExceeded {
            metrics::record_rejection("capacity_exceeded");
            return Err(StorageError::CapacityExceeded {
                size,
                max_bytes: self.policy.limits().max_bytes,
            });
        }

        self.apply_removals(&plan).await;
        let changed = plan.changed();
        let mut manifest = Manifest { items: plan.keep };

        if verdict == Verdict::TemporarilyFull {
            metrics::record_rejection("temporarily_full");
            self.persist_reconciled(file, &manifest, changed).await;
            return Err(StorageError::TemporarilyFull);
        }

        if cancel.is_cancelled() {
            metrics::record_rejection("aborted");
            self.persist_reconciled(file, &manifest, changed).await;
            return Err(StorageError::Aborted);
        }

        let id = ArtifactId::new();
        let filename = id.filename();
        let path = self.root.join(&filename);
        if let Err(e) = atomic::write(&path, &data).await {
            warn!(path = %path.display(), error = %e, "Failed to write preview artifact");
            self.persist_reconciled(file, &manifest, changed).await;
            return Err(e);
        }

        manifest.items.push(ManifestEntry {
            filename,
            created_at: now_ms(),
            size_bytes: size,
        });
        if let Err(e) = file.write(&manifest).await {
            warn!(
                path = %file.path().display(),
                error = %e,
                "Failed to persist preview manifest, discarding new artifact"
            );
            self.remove_artifact(&id.filename()).await;
            return Err(e);
        }

        metrics::PREVIEWS_STORED.inc();
        metrics::PREVIEW_BYTES_STORED.inc_by(size);
        debug!(
            artifact = %id,
            items = manifest.len(),
            bytes = manifest.total_bytes(),
            "Stored preview artifact"
        );
        Ok(id)
    }

    async fn sweep(&self, file: &ManifestFile) -> StorageResult<SweepStats> {
        let manifest = file.read().await?;
        let files = self.scan().await?;
        let present: HashMap<String, u64> = files
            .iter()
            .filter(|f| ArtifactId::from_filename(&f.name).is_some())
            .map(|f| (f.name.clone(), f.len))
            .collect();

        let plan = self.policy.reconcile(manifest.items, now_ms(), &present);
        let mut stats = SweepStats {
            expired: plan.expired.len(),
            missing: plan.missing.len(),
            orphans: 0,
            resized: plan.resized,
            bytes_reclaimed: self.apply_removals(&plan).await,
        };
        if plan.changed() {
            file.write(&Manifest {
                items: plan.keep.clone(),
            })
            .await?;
        }

        let settled: HashSet<&str> = plan
            .keep
            .iter()
            .chain(plan.doomed())
            .map(|e| e.filename.as_str())
            .collect();
        let ttl = self.policy.limits().ttl;
        let mut orphan_bytes = 0;

        for disk in &files {
            if disk.name == MANIFEST_FILENAME || settled.contains(disk.name.as_str()) {
                continue;
            }
            // Writes only happen inside manifest jobs, so no temp file is live here
            let stale = if is_owned_temp(&disk.name) {
                true
            } else if ArtifactId::from_filename(&disk.name).is_some() {
                older_than(disk.modified, ttl)
            } else {
                false
            };
            if stale && self.remove_file(&disk.name).await {
                stats.orphans += 1;
                orphan_bytes += disk.len;
            }
        }

        stats.bytes_reclaimed += orphan_bytes;
        metrics::record_removed("orphan", stats.orphans, orphan_bytes);
        Ok(stats)
    }

    /// Delete the files of expired and evicted entries. Returns bytes freed.
    async fn apply_removals(&self, plan: &Plan) -> u64 {
        let mut expired_bytes = 0;
        for entry in &plan.expired {
            if self.remove_artifact(&entry.filename).await {
                expired_bytes += entry.size_bytes;
            }
        }

        let mut evicted_bytes = 0;
        for entry in &plan.evicted {
            if self.remove_artifact(&entry.filename).await {
                evicted_bytes += entry.size_bytes;
            }
        }

        metrics::record_removed("expired", plan.expired.len(), expired_bytes);
        metrics::record_removed("evicted", plan.evicted.len(), evicted_bytes);
        metrics::record_removed("missing", plan.missing.len(), 0);

        if plan.changed() {
            info!(
                expired = plan.expired.len(),
                evicted = plan.evicted.len(),
                missing = plan.missing.len(),
                resized = plan.resized,
                bytes_reclaimed = expired_bytes + evicted_bytes,
                "Removed preview artifacts"
            );
        }
        expired_bytes + evicted_bytes
    }

    /// Remove an artifact file named by a manifest entry.
    ///
    /// Names that are not artifact file names are never touched: the
    /// manifest is read from disk and cannot be trusted to stay inside the
    /// preview directory.
    async fn remove_artifact(&self, name: &str) -> bool {
        if ArtifactId::from_filename(name).is_none() {
            warn!(name, "Refusing to delete manifest entry with a foreign file name");
            return false;
        }
        self.remove_file(name).await
    }

    async fn remove_file(&self, name: &str) -> bool {
        let path = self.root.join(name);
        match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove preview file");
                false
            }
        }
    }

    /// Artifact files currently in the directory, with their lengths.
    async fn artifact_names(&self) -> StorageResult<HashMap<String, u64>> {
        let mut names = HashMap::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if ArtifactId::from_filename(&name).is_none() {
                continue;
            }
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                names.insert(name, metadata.len());
            }
        }
        Ok(names)
    }

    async fn scan(&self) -> StorageResult<Vec<DiskFile>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            files.push(DiskFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                len: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
        Ok(files)
    }

    async fn persist_reconciled(&self, file: &ManifestFile, manifest: &Manifest, changed: bool) {
        if !changed {
            return;
        }
        if let Err(e) = file.write(manifest).await {
            // Next admission reconciles against the disk again
            warn!(
                path = %file.path().display(),
                error = %e,
                "Failed to persist reconciled preview manifest"
            );
        }
    }
}

/// Temp sibling of a file this store owns.
fn is_owned_temp(name: &str) -> bool {
    name.split_once(atomic::TEMP_MARKER).is_some_and(|(target, _)| {
        target == MANIFEST_FILENAME || ArtifactId::from_filename(target).is_some()
    })
}

fn older_than(modified: Option<SystemTime>, age: Duration) -> bool {
    modified
        .and_then(|m| m.elapsed().ok())
        .is_some_and(|elapsed| elapsed >= age)
}

/// Spawn the periodic sweep. Runs once immediately, then every `interval`,
/// until `shutdown` is cancelled.
pub fn spawn_sweep_task(
    store: PreviewStore,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Preview sweep task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match store.sweep().await {
                        Ok(stats) if stats.is_empty() => {}
                        Ok(stats) => info!(
                            expired = stats.expired,
                            missing = stats.missing,
                            orphans = stats.orphans,
                            resized = stats.resized,
                            bytes_reclaimed = stats.bytes_reclaimed,
                            "Preview sweep reclaimed space"
                        ),
                        Err(e) => warn!(error = %e, "Preview sweep failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_items: usize, max_bytes: u64) -> Limits {
        Limits {
            max_items,
            max_bytes,
            ttl: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_owned_temp_names() {
        let id = ArtifactId::new();
        assert!(is_owned_temp(&format!("{}.tmp.abc", id.filename())));
        assert!(is_owned_temp("manifest.json.tmp.abc"));
        assert!(!is_owned_temp("notes.txt.tmp.abc"));
        assert!(!is_owned_temp(&id.filename()));
    }

    #[test]
    fn test_older_than() {
        let past = SystemTime::now() - Duration::from_secs(120);
        assert!(older_than(Some(past), Duration::from_secs(60)));
        assert!(!older_than(Some(past), Duration::from_secs(600)));
        assert!(!older_than(None, Duration::ZERO));
    }

    #[tokio::test]
    async fn test_stats_track_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreviewStore::with_limits(dir.path(), limits(10, 1000))
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        store.put(Bytes::from_static(b"abc"), &cancel).await.unwrap();
        store.put(Bytes::from_static(b"defg"), &cancel).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats, PreviewStats { items: 2, bytes: 7 });
    }

    #[tokio::test]
    async fn test_foreign_manifest_names_are_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("keep.txt");
        fs::write(&outside, b"precious").await.unwrap();

        let previews = dir.path().join("previews");
        fs::create_dir_all(&previews).await.unwrap();
        let manifest = Manifest {
            items: vec![ManifestEntry {
                filename: "../keep.txt".to_string(),
                created_at: 0,
                size_bytes: 8,
            }],
        };
        ManifestFile::in_dir(&previews).write(&manifest).await.unwrap();

        let store = PreviewStore::with_limits(&previews, limits(10, 1000))
            .await
            .unwrap();
        let stats = store.sweep().await.unwrap();

        assert_eq!(stats.expired, 1);
        assert!(fs::try_exists(&outside).await.unwrap());
        assert_eq!(store.stats().await.unwrap().items, 0);
    }
}
