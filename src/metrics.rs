use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and search activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_ingested: AtomicU64,
    documents_failed: AtomicU64,
    searches_run: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one document that completed the full pipeline.
    pub fn record_ingested(&self) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one document that was marked failed by the pipeline.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed search request.
    pub fn record_search(&self) {
        self.searches_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            searches_run: self.searches_run.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Number of documents fully ingested since startup.
    pub documents_ingested: u64,
    /// Number of documents whose pipeline ended in a failed state.
    pub documents_failed: u64,
    /// Number of search requests served since startup.
    pub searches_run: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ingestions_and_failures() {
        let metrics = ServiceMetrics::new();
        metrics.record_ingested();
        metrics.record_ingested();
        metrics.record_failed();
        metrics.record_search();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.searches_run, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = ServiceMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 0);
        assert_eq!(snapshot.documents_failed, 0);
        assert_eq!(snapshot.searches_run, 0);
    }
}
