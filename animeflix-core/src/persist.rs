use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::Result;

/// Snapshot writer for one index file.
///
/// Writes run on the blocking pool and keep going when the caller is
/// dropped. They are serialized per file and numbered when issued, so a
/// snapshot that lands late never replaces a newer one.
#[derive(Debug)]
pub(crate) struct SnapshotFile {
    path: PathBuf,
    issued: AtomicU64,
    landed: Arc<Mutex<u64>>,
}

impl SnapshotFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            issued: AtomicU64::new(0),
            landed: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` and wait for it to land.
    ///
    /// Callers take the snapshot and call this under the index lock, so
    /// issue order matches index order.
    pub(crate) async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.spawn_write(bytes).await?
    }

    /// Queue a write without waiting for it.
    pub(crate) fn spawn_write(&self, bytes: Vec<u8>) -> JoinHandle<Result<()>> {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.path.clone();
        let landed = Arc::clone(&self.landed);
        tokio::task::spawn_blocking(move || {
            let mut landed = landed.lock();
            if *landed > generation {
                return Ok(());
            }
            write_snapshot_sync(&path, &bytes)?;
            *landed = generation;
            Ok(())
        })
    }
}

/// Replace `path` with `bytes` via a sibling temp file and a rename, so a
/// crash never leaves a truncated index behind.
pub(crate) fn write_snapshot_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = snapshot_tmp_path(path);
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    if let Err(err) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

/// `{name}.{uuid}.tmp` next to `path`, unique per write.
fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Whether `file_name` is a leftover snapshot temp for the index at `path`.
pub(crate) fn is_snapshot_tmp(path: &Path, file_name: &str) -> bool {
    let Some(index_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    file_name
        .strip_prefix(index_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|rest| rest.ends_with(".tmp"))
}

pub(crate) fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
        .min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn snapshot_replaces_existing_file_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"old").unwrap();

        write_snapshot_sync(&path, b"{\"new\":true}").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{\"new\":true}");
        assert!(tmp_files(dir.path()).is_empty());
    }

    #[test]
    fn temp_names_differ_per_write() {
        let path = Path::new("/data/videos-index.json");
        let a = snapshot_tmp_path(path);
        let b = snapshot_tmp_path(path);

        assert_ne!(a, b);
        for tmp in [&a, &b] {
            let name = tmp.file_name().unwrap().to_str().unwrap();
            assert!(is_snapshot_tmp(path, name));
        }
        assert!(!is_snapshot_tmp(path, "videos-index.json"));
        assert!(!is_snapshot_tmp(path, "videos-index.jsonx.tmp"));
        assert!(!is_snapshot_tmp(path, "other.json.abc.tmp"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_snapshot_never_replaces_a_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("index.json"));

        // Dropped handles stand in for callers that went away mid-write.
        for i in 0..50u32 {
            let body = serde_json::to_vec(&vec![i; i as usize]).unwrap();
            drop(file.spawn_write(body));
        }
        let last = serde_json::to_vec(&vec![99u32; 3]).unwrap();
        file.write(last.clone()).await.unwrap();

        let on_disk = std::fs::read(file.path()).unwrap();
        assert_eq!(on_disk, last);
        let parsed: Vec<u32> = serde_json::from_slice(&on_disk).unwrap();
        assert_eq!(parsed, vec![99, 99, 99]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_always_leave_a_whole_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let a = Arc::new(SnapshotFile::new(path.clone()));
        let b = Arc::new(SnapshotFile::new(path.clone()));

        let mut handles = Vec::new();
        for i in 0..40u32 {
            let writer = if i % 2 == 0 { &a } else { &b };
            let body = serde_json::to_vec(&vec![i; 200 + i as usize]).unwrap();
            handles.push(writer.spawn_write(body));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let parsed: Vec<u32> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(parsed.iter().all(|v| *v == parsed[0]));
        assert_eq!(parsed.len(), 200 + parsed[0] as usize);
        assert!(tmp_files(dir.path()).is_empty());
    }
}
