//! File coordinator - exclusive write leases over workspace paths
//!
//! Prevents concurrent agents from corrupting shared artifacts. Lease state
//! lives in JSON sidecar files under `<workspace>/.file_coordination`; the
//! sidecars and waiter queues are the source of truth, in-process state is
//! advisory only. Holders that crash leave a sidecar behind which the stale
//! reclaim path cleans up on the next acquire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{FleetError, FleetResult};

const DEFAULT_MAX_LEASE: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Kind of file operation a waiter intends to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Read,
    Write,
    Create,
    Delete,
}

/// On-disk lease record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseSidecar {
    agent_id: String,
    acquired_at: DateTime<Utc>,
    file_path: String,
}

/// On-disk waiter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Waiter {
    agent_id: String,
    op: FileOp,
    priority: i32,
    enqueued_at: DateTime<Utc>,
}

/// A granted exclusive lease. Release it explicitly; `safe_write` does so on
/// every exit path.
#[derive(Debug, Clone)]
pub struct Lease {
    pub path: PathBuf,
    pub agent_id: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinationStats {
    pub active_leases: usize,
    pub queued_operations: usize,
    pub tracked_files: usize,
}

/// Contention report for a single path.
#[derive(Debug, Clone, Serialize)]
pub struct FileConflicts {
    pub is_locked: bool,
    pub holder: Option<String>,
    pub queue_length: usize,
    pub version: u64,
}

pub struct FileCoordinator {
    workspace_root: PathBuf,
    coordination_dir: PathBuf,
    max_lease: Duration,
    poll_interval: Duration,
    versions: RwLock<HashMap<PathBuf, u64>>,
}

impl FileCoordinator {
    pub fn new(workspace_root: impl Into<PathBuf>) -> FleetResult<Self> {
        let workspace_root = workspace_root.into();
        let coordination_dir = workspace_root.join(".file_coordination");
        std::fs::create_dir_all(&coordination_dir).map_err(|e| {
            FleetError::Fatal(format!(
                "cannot create coordination dir {}: {e}",
                coordination_dir.display()
            ))
        })?;
        Ok(Self {
            workspace_root,
            coordination_dir,
            max_lease: DEFAULT_MAX_LEASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            versions: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_max_lease(mut self, max_lease: Duration) -> Self {
        self.max_lease = max_lease;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn max_lease(&self) -> Duration {
        self.max_lease
    }

    /// A sidecar older than twice the maximum lease time is considered
    /// abandoned and may be reclaimed.
    fn stale_threshold(&self) -> Duration {
        self.max_lease * 2
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn normalized_name(path: &Path) -> String {
        path.to_string_lossy()
            .replace(['/', '\\'], "_")
            .replace(':', "")
    }

    fn sidecar_path(&self, path: &Path) -> PathBuf {
        self.coordination_dir
            .join(format!("{}.lock", Self::normalized_name(path)))
    }

    fn queue_path(&self, path: &Path) -> PathBuf {
        self.coordination_dir
            .join(format!("{}.queue", Self::normalized_name(path)))
    }

    async fn read_sidecar(&self, path: &Path) -> Option<LeaseSidecar> {
        let raw = tokio::fs::read_to_string(self.sidecar_path(path)).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn is_stale(&self, sidecar: &LeaseSidecar) -> bool {
        let age = Utc::now() - sidecar.acquired_at;
        age.to_std()
            .map(|age| age > self.stale_threshold())
            .unwrap_or(false)
    }

    /// Whether an unexpired lease currently covers `path`. Stale sidecars are
    /// reclaimed (and logged) as a side effect.
    async fn lease_active(&self, path: &Path) -> bool {
        match self.read_sidecar(path).await {
            Some(sidecar) if self.is_stale(&sidecar) => {
                warn!(
                    path = %path.display(),
                    holder = %sidecar.agent_id,
                    "reclaimed stale lease"
                );
                let _ = tokio::fs::remove_file(self.sidecar_path(path)).await;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Atomically create the sidecar. Fails when another claimant won.
    async fn try_claim(&self, path: &Path, agent_id: &str) -> FleetResult<Option<Lease>> {
        let sidecar = LeaseSidecar {
            agent_id: agent_id.to_string(),
            acquired_at: Utc::now(),
            file_path: path.to_string_lossy().to_string(),
        };
        let body = serde_json::to_vec(&sidecar)
            .map_err(|e| FleetError::Fatal(format!("cannot encode lease sidecar: {e}")))?;

        let result = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.sidecar_path(path))
            .await;
        match result {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                file.write_all(&body).await.map_err(|e| {
                    FleetError::Fatal(format!("cannot write lease sidecar: {e}"))
                })?;
                Ok(Some(Lease {
                    path: path.to_path_buf(),
                    agent_id: agent_id.to_string(),
                    acquired_at: sidecar.acquired_at,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(FleetError::Fatal(format!(
                "cannot create lease sidecar: {e}"
            ))),
        }
    }

    async fn load_queue(&self, path: &Path) -> Vec<Waiter> {
        match tokio::fs::read_to_string(self.queue_path(path)).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn store_queue(&self, path: &Path, queue: &[Waiter]) -> FleetResult<()> {
        let queue_path = self.queue_path(path);
        if queue.is_empty() {
            let _ = tokio::fs::remove_file(&queue_path).await;
            return Ok(());
        }
        let body = serde_json::to_vec_pretty(queue)
            .map_err(|e| FleetError::Fatal(format!("cannot encode waiter queue: {e}")))?;
        tokio::fs::write(&queue_path, body)
            .await
            .map_err(|e| FleetError::Fatal(format!("cannot write waiter queue: {e}")))
    }

    async fn enqueue_waiter(
        &self,
        path: &Path,
        agent_id: &str,
        op: FileOp,
        priority: i32,
    ) -> FleetResult<()> {
        let mut queue = self.load_queue(path).await;
        queue.push(Waiter {
            agent_id: agent_id.to_string(),
            op,
            priority,
            enqueued_at: Utc::now(),
        });
        queue.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        });
        self.store_queue(path, &queue).await
    }

    async fn remove_waiter(&self, path: &Path, agent_id: &str) -> FleetResult<()> {
        let mut queue = self.load_queue(path).await;
        if let Some(pos) = queue.iter().position(|w| w.agent_id == agent_id) {
            queue.remove(pos);
        }
        self.store_queue(path, &queue).await
    }

    async fn head_waiter(&self, path: &Path) -> Option<String> {
        self.load_queue(path).await.first().map(|w| w.agent_id.clone())
    }

    /// Acquire an exclusive lease on `path`, waiting up to `timeout`.
    /// Timing out leaves no side effects behind.
    pub async fn acquire(
        &self,
        path: impl AsRef<Path>,
        agent_id: &str,
        op: FileOp,
        priority: i32,
        timeout: Duration,
    ) -> FleetResult<Lease> {
        let path = self.resolve(path.as_ref());
        let started = Instant::now();

        // Fast path: free and nobody queued.
        if !self.lease_active(&path).await && self.load_queue(&path).await.is_empty() {
            if let Some(lease) = self.try_claim(&path, agent_id).await? {
                debug!(path = %path.display(), agent = agent_id, "lease acquired");
                return Ok(lease);
            }
        }

        self.enqueue_waiter(&path, agent_id, op, priority).await?;
        info!(
            path = %path.display(),
            agent = agent_id,
            priority,
            "queued for lease"
        );

        loop {
            if started.elapsed() >= timeout {
                self.remove_waiter(&path, agent_id).await?;
                return Err(FleetError::locked(
                    path.to_string_lossy(),
                    format!("acquire timed out after {} ms", timeout.as_millis()),
                ));
            }

            if !self.lease_active(&path).await {
                let head = self.head_waiter(&path).await;
                if head.as_deref() == Some(agent_id) || head.is_none() {
                    if let Some(lease) = self.try_claim(&path, agent_id).await? {
                        self.remove_waiter(&path, agent_id).await?;
                        debug!(
                            path = %path.display(),
                            agent = agent_id,
                            "queued lease acquired"
                        );
                        return Ok(lease);
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Release a lease. Idempotent: releasing an already-released lease is
    /// fine; releasing a lease now held by someone else fails with `Locked`.
    pub async fn release(&self, lease: &Lease) -> FleetResult<()> {
        match self.read_sidecar(&lease.path).await {
            None => Ok(()),
            Some(sidecar) if sidecar.agent_id == lease.agent_id => {
                tokio::fs::remove_file(self.sidecar_path(&lease.path))
                    .await
                    .map_err(|e| {
                        FleetError::Fatal(format!("cannot remove lease sidecar: {e}"))
                    })?;
                debug!(path = %lease.path.display(), agent = %lease.agent_id, "lease released");
                Ok(())
            }
            Some(sidecar) => Err(FleetError::locked(
                lease.path.to_string_lossy(),
                format!("lease is now held by '{}'", sidecar.agent_id),
            )),
        }
    }

    /// Write `bytes` to `path` under a lease, bumping the version counter.
    /// The write is staged to a temp file so a failure leaves the original
    /// content untouched, and the lease is released on every exit path.
    pub async fn safe_write(
        &self,
        path: impl AsRef<Path>,
        bytes: &[u8],
        agent_id: &str,
        priority: i32,
    ) -> FleetResult<u64> {
        let path = self.resolve(path.as_ref());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FleetError::Fatal(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let lease = self
            .acquire(&path, agent_id, FileOp::Write, priority, self.max_lease)
            .await?;

        let result = self.write_atomic(&path, bytes).await;
        let release_result = self.release(&lease).await;

        match result {
            Ok(()) => {
                release_result?;
                let mut versions = self.versions.write().await;
                let version = versions.entry(path.clone()).or_insert(0);
                *version += 1;
                info!(
                    path = %path.display(),
                    agent = agent_id,
                    version = *version,
                    "file written"
                );
                Ok(*version)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> FleetResult<()> {
        let staged = path.with_extension("fleet_tmp");
        tokio::fs::write(&staged, bytes)
            .await
            .map_err(|e| FleetError::Fatal(format!("cannot stage write: {e}")))?;
        tokio::fs::rename(&staged, path)
            .await
            .map_err(|e| FleetError::Fatal(format!("cannot commit write: {e}")))
    }

    /// Read without an exclusive lock; if a write lease is active, wait one
    /// poll interval for it to finish before reading.
    pub async fn safe_read(&self, path: impl AsRef<Path>, agent_id: &str) -> Option<Vec<u8>> {
        let path = self.resolve(path.as_ref());
        if !path.exists() {
            return None;
        }
        if self.lease_active(&path).await {
            tokio::time::sleep(self.poll_interval).await;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), agent = agent_id, "file read");
                Some(bytes)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "read failed");
                None
            }
        }
    }

    /// Operator escape hatch: drop a lease regardless of holder.
    pub async fn force_unlock(&self, path: impl AsRef<Path>, admin_id: &str) -> FleetResult<()> {
        let path = self.resolve(path.as_ref());
        let sidecar_path = self.sidecar_path(&path);
        if sidecar_path.exists() {
            tokio::fs::remove_file(&sidecar_path).await.map_err(|e| {
                FleetError::Fatal(format!("cannot remove lease sidecar: {e}"))
            })?;
        }
        warn!(path = %path.display(), admin = admin_id, "lease force-unlocked");
        Ok(())
    }

    /// Current version of a path (0 when never written through here).
    pub async fn version(&self, path: impl AsRef<Path>) -> u64 {
        let path = self.resolve(path.as_ref());
        self.versions.read().await.get(&path).copied().unwrap_or(0)
    }

    /// Inspect contention on one path: current holder, queue depth, version.
    pub async fn check_conflicts(&self, path: impl AsRef<Path>) -> FileConflicts {
        let path = self.resolve(path.as_ref());
        let sidecar = self.read_sidecar(&path).await;
        FileConflicts {
            is_locked: sidecar.as_ref().map(|s| !self.is_stale(s)).unwrap_or(false),
            holder: sidecar.map(|s| s.agent_id),
            queue_length: self.load_queue(&path).await.len(),
            version: self.versions.read().await.get(&path).copied().unwrap_or(0),
        }
    }

    pub async fn stats(&self) -> CoordinationStats {
        let mut active_leases = 0;
        let mut queued_operations = 0;

        if let Ok(mut entries) = tokio::fs::read_dir(&self.coordination_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".lock") {
                    active_leases += 1;
                } else if name.ends_with(".queue") {
                    if let Ok(raw) = tokio::fs::read_to_string(entry.path()).await {
                        queued_operations += serde_json::from_str::<Vec<Waiter>>(&raw)
                            .map(|q| q.len())
                            .unwrap_or(0);
                    }
                }
            }
        }

        CoordinationStats {
            active_leases,
            queued_operations,
            tracked_files: self.versions.read().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn coordinator(dir: &Path) -> FileCoordinator {
        FileCoordinator::new(dir)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());

        let lease = coord
            .acquire("a.txt", "agent-1", FileOp::Write, 1, Duration::from_secs(1))
            .await
            .unwrap();

        let second = coord
            .acquire("a.txt", "agent-2", FileOp::Write, 1, Duration::from_millis(100))
            .await;
        assert!(matches!(second, Err(FleetError::Locked { .. })));

        coord.release(&lease).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());

        let lease = coord
            .acquire("b.txt", "agent-1", FileOp::Write, 1, Duration::from_secs(1))
            .await
            .unwrap();
        coord.release(&lease).await.unwrap();
        coord.release(&lease).await.unwrap();
    }

    #[tokio::test]
    async fn test_safe_write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());

        let v1 = coord
            .safe_write("notes/x.md", b"first", "agent-1", 1)
            .await
            .unwrap();
        assert_eq!(v1, 1);
        assert_eq!(
            coord.safe_read("notes/x.md", "agent-2").await.unwrap(),
            b"first"
        );

        let v2 = coord
            .safe_write("notes/x.md", b"second", "agent-1", 1)
            .await
            .unwrap();
        assert_eq!(v2, 2);
        assert_eq!(
            coord.safe_read("notes/x.md", "agent-2").await.unwrap(),
            b"second"
        );
        assert_eq!(coord.version("notes/x.md").await, 2);
    }

    #[tokio::test]
    async fn test_safe_read_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        assert!(coord.safe_read("nope.txt", "agent-1").await.is_none());
    }

    #[tokio::test]
    async fn test_force_unlock_clears_holder() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());

        let _lease = coord
            .acquire("c.txt", "agent-1", FileOp::Write, 1, Duration::from_secs(1))
            .await
            .unwrap();
        coord.force_unlock("c.txt", "admin").await.unwrap();

        let lease = coord
            .acquire("c.txt", "agent-2", FileOp::Write, 1, Duration::from_secs(1))
            .await
            .unwrap();
        coord.release(&lease).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_counts_leases_and_waiters() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());

        let _lease = coord
            .acquire("d.txt", "agent-1", FileOp::Write, 1, Duration::from_secs(1))
            .await
            .unwrap();
        coord
            .enqueue_waiter(&coord.resolve(Path::new("d.txt")), "agent-2", FileOp::Write, 2)
            .await
            .unwrap();

        let stats = coord.stats().await;
        assert_eq!(stats.active_leases, 1);
        assert_eq!(stats.queued_operations, 1);
    }

    #[tokio::test]
    async fn test_check_conflicts_reports_holder_and_queue() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());

        let clean = coord.check_conflicts("e.txt").await;
        assert!(!clean.is_locked);
        assert_eq!(clean.queue_length, 0);
        assert_eq!(clean.version, 0);

        let lease = coord
            .acquire("e.txt", "agent-1", FileOp::Write, 1, Duration::from_secs(1))
            .await
            .unwrap();
        coord
            .enqueue_waiter(&coord.resolve(Path::new("e.txt")), "agent-2", FileOp::Write, 2)
            .await
            .unwrap();

        let busy = coord.check_conflicts("e.txt").await;
        assert!(busy.is_locked);
        assert_eq!(busy.holder.as_deref(), Some("agent-1"));
        assert_eq!(busy.queue_length, 1);

        coord.release(&lease).await.unwrap();
    }

    #[test]
    fn test_normalized_name_strips_separators() {
        let name = FileCoordinator::normalized_name(Path::new("/tmp/ws/core/x.py"));
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert!(name.ends_with("core_x.py"));
    }
}
