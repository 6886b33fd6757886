//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as a batch of papers is analysed. The trait is `Send + Sync`
//! because documents are analysed concurrently.
//!
//! # Example
//!
//! ```rust
//! use papercheck::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, _index: usize, total: usize, warnings: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{}/{} papers checked ({} warnings)", n, total, warnings);
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch entry points as each document is processed.
///
/// All methods have default no-op implementations. `on_document_*` may be
/// called concurrently from different tasks.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before any document is read.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on a document begins.
    ///
    /// # Arguments
    /// * `index`: 0-based position of the document in the input list
    /// * `total`: number of documents in the batch
    /// * `source`: display name of the input
    fn on_document_start(&self, index: usize, total: usize, source: &str) {
        let _ = (index, total, source);
    }

    /// Called when a document produced a full report.
    ///
    /// `warnings` counts every warning in the report.
    fn on_document_complete(&self, index: usize, total: usize, warnings: usize) {
        let _ = (index, total, warnings);
    }

    /// Called when a document was aborted by a hard failure.
    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every document has been attempted.
    ///
    /// `completed` counts documents that were not aborted.
    fn on_batch_complete(&self, total: usize, completed: usize) {
        let _ = (total, completed);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        batch_total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_document_start(&self, _index: usize, _total: usize, _source: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _index: usize, _total: usize, _warnings: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, completed: usize) {
            self.completed_total.store(completed, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(0, 2, "a.docx");
        cb.on_document_complete(0, 2, 7);
        cb.on_document_error(1, 2, "timeout");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn test_tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(3);
        for i in 0..3 {
            tracker.on_document_start(i, 3, "paper.tex");
        }
        tracker.on_document_complete(0, 3, 4);
        tracker.on_document_complete(1, 3, 0);
        tracker.on_document_error(2, 3, "empty document");
        tracker.on_batch_complete(3, 2);

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_document_complete(0, 1, 3);
    }
}
