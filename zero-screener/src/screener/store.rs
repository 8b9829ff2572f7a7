//! Latest completed scan, readable while the next one runs.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::info;

use super::engine::ScanRun;

/// Holds the most recent published [`ScanRun`].
///
/// Readers always see either the previous run or the new one in full.
#[derive(Default)]
pub struct ScanStore {
    latest: ArcSwapOption<ScanRun>,
}

impl ScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published run.
    pub fn publish(&self, run: ScanRun) -> Arc<ScanRun> {
        let run = Arc::new(run);
        info!(
            scan_id = %run.id,
            results = run.results.len(),
            "Publishing scan results"
        );
        self.latest.store(Some(Arc::clone(&run)));
        run
    }

    pub fn latest(&self) -> Option<Arc<ScanRun>> {
        self.latest.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn run(id: &str) -> ScanRun {
        let now = Utc::now();
        ScanRun {
            id: id.to_string(),
            started_at: now,
            completed_at: now,
            duration_secs: 0.0,
            total_symbols: 0,
            results: Vec::new(),
            symbols: Vec::new(),
        }
    }

    #[test]
    fn test_empty_store() {
        assert!(ScanStore::new().latest().is_none());
    }

    #[test]
    fn test_publish_replaces() {
        let store = ScanStore::new();
        store.publish(run("first"));
        let held = store.latest().unwrap();
        store.publish(run("second"));

        assert_eq!(store.latest().unwrap().id, "second");
        // earlier readers keep their snapshot
        assert_eq!(held.id, "first");
    }
}
