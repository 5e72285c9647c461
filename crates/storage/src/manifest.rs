//! Preview manifest document and its single-flight executor.
//!
//! The manifest is one JSON document listing every stored artifact:
//!
//! ```json
//! { "items": [ { "filename": "<id>.img", "createdAt": 1700000000000, "size": 1024 } ] }
//! ```
//!
//! Every read-decide-write cycle against it runs as a job on a single
//! executor task, in submission order. A job keeps running after the caller
//! that submitted it goes away, so a cycle is never torn in half.

use crate::atomic;
use crate::error::{StorageError, StorageResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// File name of the manifest inside the preview directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// One stored artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// File name relative to the preview directory. Unique within a manifest.
    pub filename: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Size on disk in bytes as of the last reconciliation.
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Ordered list of stored artifacts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub items: Vec<ManifestEntry>,
}

impl Manifest {
    /// Sum of `size_bytes` over all entries.
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|e| e.size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.items.iter().any(|e| e.filename == filename)
    }
}

/// The manifest document on disk.
#[derive(Debug)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    /// Manifest stored as [`MANIFEST_FILENAME`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(MANIFEST_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest. A missing or unparsable document reads as empty.
    pub async fn read(&self) -> StorageResult<Manifest> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Manifest::default()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        match serde_json::from_slice(&raw) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Preview manifest is malformed, starting from an empty manifest"
                );
                Ok(Manifest::default())
            }
        }
    }

    /// Persist the manifest atomically.
    pub async fn write(&self, manifest: &Manifest) -> StorageResult<()> {
        let encoded = serde_json::to_vec_pretty(manifest)?;
        atomic::write(&self.path, &encoded).await
    }
}

type Job = Box<dyn FnOnce(Arc<ManifestFile>) -> BoxFuture<'static, ()> + Send>;

/// Handle to the manifest executor.
///
/// Cloning is cheap. The executor task stops once every handle is dropped
/// and the queued jobs have drained.
#[derive(Clone)]
pub struct ManifestStore {
    jobs: mpsc::UnboundedSender<Job>,
}

impl ManifestStore {
    /// Start the executor for `file`. Must be called inside a Tokio runtime.
    pub fn spawn(file: ManifestFile) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let file = Arc::new(file);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let run = AssertUnwindSafe(async { job(file.clone()).await }).catch_unwind();
                if run.await.is_err() {
                    error!(
                        path = %file.path().display(),
                        "Manifest job panicked; continuing with the next job"
                    );
                }
            }
            debug!(path = %file.path().display(), "Manifest executor stopped");
        });

        Self { jobs }
    }

    /// Run `f` with exclusive access to the manifest and return its output.
    ///
    /// Jobs execute one at a time in submission order. If the caller stops
    /// waiting, the job still runs to completion.
    pub async fn run<F, Fut, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(Arc<ManifestFile>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |file| {
            async move {
                let out = f(file).await;
                // Caller may have gone away; the work is done either way
                let _ = reply_tx.send(out);
            }
            .boxed()
        });

        self.jobs.send(job).map_err(|_| StorageError::Closed)?;
        reply_rx.await.map_err(|_| StorageError::JobFailed)
    }
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("closed", &self.jobs.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn entry(name: &str, created_at: i64, size: u64) -> ManifestEntry {
        ManifestEntry {
            filename: name.to_string(),
            created_at,
            size_bytes: size,
        }
    }

    #[tokio::test]
    async fn test_read_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ManifestFile::in_dir(dir.path());
        assert!(file.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_malformed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ManifestFile::in_dir(dir.path());
        fs::write(file.path(), b"{ not json").await.unwrap();
        assert!(file.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_uses_wire_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let file = ManifestFile::in_dir(dir.path());
        let manifest = Manifest {
            items: vec![entry("a.img", 1_700_000_000_000, 42)],
        };
        file.write(&manifest).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(file.path()).await.unwrap()).unwrap();
        assert_eq!(raw["items"][0]["filename"], "a.img");
        assert_eq!(raw["items"][0]["createdAt"], 1_700_000_000_000i64);
        assert_eq!(raw["items"][0]["size"], 42);
        assert_eq!(file.read().await.unwrap(), manifest);
    }

    #[tokio::test]
    async fn test_document_without_items_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ManifestFile::in_dir(dir.path());
        fs::write(file.path(), b"{}").await.unwrap();
        assert!(file.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::spawn(ManifestFile::in_dir(dir.path()));

        let mut handles = Vec::new();
        for i in 0..20i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .run(move |file| async move {
                        let mut manifest = file.read().await.unwrap();
                        manifest.items.push(entry(&format!("{i}.img"), i, 1));
                        file.write(&manifest).await.unwrap();
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let manifest = store
            .run(|file| async move { file.read().await.unwrap() })
            .await
            .unwrap();
        assert_eq!(manifest.len(), 20);
    }

    #[tokio::test]
    async fn test_jobs_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::spawn(ManifestFile::in_dir(dir.path()));
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let running = running.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                store
                    .run(move |_file| async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::spawn(ManifestFile::in_dir(dir.path()));
        let done = Arc::new(AtomicUsize::new(0));

        let flag = done.clone();
        let fut = store.run(move |_file| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });
        // Poll once so the job is submitted, then drop the caller
        let _ = tokio::time::timeout(Duration::from_millis(1), fut).await;

        // A later job only runs after the abandoned one finished
        store.run(|_file| async {}).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_executor() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::spawn(ManifestFile::in_dir(dir.path()));

        let result = store
            .run(|_file| async {
                let fail = true;
                if fail {
                    panic!("boom");
                }
            })
            .await;
        assert!(matches!(result, Err(StorageError::JobFailed)));

        let value = store.run(|_file| async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
