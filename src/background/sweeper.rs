//! Periodic reclamation of artifacts at rest.
//!
//! Two timers run independently and are never reconciled: an age sweep that
//! removes files older than a threshold, and a full sweep that removes
//! everything on a shorter interval. The age threshold is therefore only
//! observable inside race windows shorter than the full-sweep interval; the
//! operative retention policy is that no artifact survives longer than the
//! full-sweep interval. Each timer also fires once immediately at start.

use std::time::Duration;

use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time;

use crate::common::SWEEP_STABILITY_SECS;
use crate::config::ServiceConfig;
use crate::storage::ArtifactStore;

#[derive(Debug, Clone)]
pub struct Sweeper {
    store: ArtifactStore,
    age_interval: Duration,
    age_threshold: Duration,
    full_interval: Duration,
}

/// Handle to the two running timer loops. Dropping it leaves them running;
/// `stop` aborts both.
pub struct SweeperHandle {
    age_task: JoinHandle<()>,
    full_task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        self.age_task.abort();
        self.full_task.abort();
    }
}

impl Sweeper {
    pub fn new(store: ArtifactStore, config: &ServiceConfig) -> Self {
        // tokio panics on a zero-period interval.
        Self {
            store,
            age_interval: Duration::from_secs(config.age_sweep_interval_secs.max(1)),
            age_threshold: Duration::from_secs(config.age_threshold_secs),
            full_interval: Duration::from_secs(config.full_sweep_interval_secs.max(1)),
        }
    }

    /// One age-sweep pass: removes files at rest longer than the threshold.
    pub fn sweep_aged(&self) -> usize {
        self.store.remove_older_than(self.age_threshold)
    }

    /// One full-sweep pass. Files inside the stability window are left for
    /// the next tick so an output being written this instant is never reaped.
    pub fn sweep_all(&self) -> usize {
        self.store
            .remove_all(Duration::from_secs(SWEEP_STABILITY_SECS))
    }

    /// Spawns both timer loops on the current runtime; each fires once
    /// immediately and then on its own interval.
    pub fn start(self) -> SweeperHandle {
        let age_sweeper = self.clone();
        let age_task = tokio::spawn(async move {
            let mut ticker = time::interval(age_sweeper.age_interval);
            loop {
                ticker.tick().await;
                run_pass("Age sweep", age_sweeper.clone(), Sweeper::sweep_aged).await;
            }
        });

        let full_sweeper = self;
        let full_task = tokio::spawn(async move {
            let mut ticker = time::interval(full_sweeper.full_interval);
            loop {
                ticker.tick().await;
                run_pass("Full sweep", full_sweeper.clone(), Sweeper::sweep_all).await;
            }
        });

        SweeperHandle { age_task, full_task }
    }
}

async fn run_pass(name: &str, sweeper: Sweeper, pass: fn(&Sweeper) -> usize) {
    match tokio::task::spawn_blocking(move || pass(&sweeper)).await {
        Ok(removed) if removed > 0 => info!("{} removed {} file(s)", name, removed),
        Ok(_) => {}
        Err(err) => error!("{} task failed: {}", name, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ArtifactKind;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;

    fn test_config(age_threshold_secs: u64) -> ServiceConfig {
        let vars = vec![
            ("AGE_THRESHOLD_SECS".to_string(), age_threshold_secs.to_string()),
            ("AGE_SWEEP_INTERVAL_SECS".to_string(), "3600".to_string()),
            ("FULL_SWEEP_INTERVAL_SECS".to_string(), "600".to_string()),
        ];
        envy::from_iter(vars).unwrap()
    }

    fn test_store() -> (TempDir, ArtifactStore) {
        let root = TempDir::new().unwrap();
        let store = ArtifactStore::new(root.path().join("uploads"), root.path().join("reversed"));
        store.ensure_dirs().unwrap();
        (root, store)
    }

    fn seed(store: &ArtifactStore, kind: ArtifactKind, name: &str, age_secs: u64) -> PathBuf {
        let path = store.dir(kind).join(name);
        fs::write(&path, b"data").unwrap();
        if age_secs > 0 {
            let then = SystemTime::now() - Duration::from_secs(age_secs);
            let mtime = filetime::FileTime::from_unix_time(
                then.duration_since(UNIX_EPOCH).unwrap().as_secs() as i64,
                0,
            );
            filetime::set_file_mtime(&path, mtime).unwrap();
        }
        path
    }

    fn count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn age_sweep_removes_only_over_threshold_files() {
        let (_root, store) = test_store();
        seed(&store, ArtifactKind::Incoming, "old.mp4", 2 * 60 * 60);
        seed(&store, ArtifactKind::Incoming, "fresh.mp4", 0);
        seed(&store, ArtifactKind::Derived, "old.mp4", 2 * 60 * 60);

        let sweeper = Sweeper::new(store.clone(), &test_config(60 * 60));
        assert_eq!(sweeper.sweep_aged(), 2);
        assert_eq!(count(store.dir(ArtifactKind::Incoming)), 1);
        assert_eq!(count(store.dir(ArtifactKind::Derived)), 0);
    }

    // The age policy must hold on its own even though the default
    // configuration lets the full sweep dominate it.
    #[test]
    fn age_sweep_is_correct_independently_of_the_full_sweep() {
        let (_root, store) = test_store();
        seed(&store, ArtifactKind::Incoming, "stale.mp4", 10);

        let sweeper = Sweeper::new(store.clone(), &test_config(5));
        assert_eq!(sweeper.sweep_aged(), 1);
        assert_eq!(count(store.dir(ArtifactKind::Incoming)), 0);
    }

    #[test]
    fn full_sweep_empties_both_directories_of_settled_files() {
        let (_root, store) = test_store();
        seed(&store, ArtifactKind::Incoming, "a.mp4", 120);
        seed(&store, ArtifactKind::Derived, "b.mp4", 120);

        let sweeper = Sweeper::new(store.clone(), &test_config(60 * 60));
        assert_eq!(sweeper.sweep_all(), 2);
        assert_eq!(count(store.dir(ArtifactKind::Incoming)), 0);
        assert_eq!(count(store.dir(ArtifactKind::Derived)), 0);
    }

    #[test]
    fn full_sweep_leaves_files_inside_the_stability_window() {
        let (_root, store) = test_store();
        seed(&store, ArtifactKind::Derived, "mid-write.mp4", 0);
        seed(&store, ArtifactKind::Derived, "settled.mp4", 120);

        let sweeper = Sweeper::new(store.clone(), &test_config(60 * 60));
        assert_eq!(sweeper.sweep_all(), 1);
        assert!(store.dir(ArtifactKind::Derived).join("mid-write.mp4").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_runs_both_passes_immediately() {
        let (_root, store) = test_store();
        seed(&store, ArtifactKind::Incoming, "settled.mp4", 120);

        let handle = Sweeper::new(store.clone(), &test_config(60 * 60)).start();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while count(store.dir(ArtifactKind::Incoming)) > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "startup sweep never removed the settled file"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle.stop();
    }
}
