//! Progress-callback trait for workflow events.
//!
//! Inject an [`Arc<dyn StudioProgressCallback>`] via
//! [`crate::config::StudioConfigBuilder::progress_callback`] to observe the
//! two-phase workflow: analysis, each card render, and every rate-limit
//! backoff in between.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: callers can forward
//! events to a spinner, a channel or a log without the library knowing how
//! the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_cards::{StudioConfig, StudioProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     cards: AtomicUsize,
//! }
//!
//! impl StudioProgressCallback for CountingCallback {
//!     fn on_card_complete(&self, index: usize, total: usize, html_len: usize) {
//!         self.cards.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Card {}/{} done ({} bytes)", index + 1, total, html_len);
//!     }
//! }
//!
//! let config = StudioConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { cards: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Observer of workflow events.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait StudioProgressCallback: Send + Sync {
    /// Analysis request is about to be sent.
    fn on_analysis_start(&self, text_len: usize) {
        let _ = text_len;
    }

    /// A blueprint was committed.
    fn on_blueprint_ready(&self, card_count: usize) {
        let _ = card_count;
    }

    /// A render request for card `index` (0-based) is about to be sent.
    fn on_card_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Card `index` was rendered and committed.
    fn on_card_complete(&self, index: usize, total: usize, html_len: usize) {
        let _ = (index, total, html_len);
    }

    /// A rate-limited call will be retried after `delay`.
    ///
    /// `attempt` is the 1-based number of the retry about to happen.
    fn on_retry(&self, operation: &str, attempt: u32, delay: Duration) {
        let _ = (operation, attempt, delay);
    }

    /// A request failed; `message` is the user-facing text.
    fn on_error(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StudioProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StudioConfig`].
pub type ProgressCallback = Arc<dyn StudioProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        cards: AtomicUsize,
        retries: Mutex<Vec<(String, u32, Duration)>>,
        errors: AtomicUsize,
    }

    impl StudioProgressCallback for TrackingCallback {
        fn on_card_complete(&self, _index: usize, _total: usize, _html_len: usize) {
            self.cards.fetch_add(1, Ordering::SeqCst);
        }

        fn on_retry(&self, operation: &str, attempt: u32, delay: Duration) {
            self.retries
                .lock()
                .unwrap()
                .push((operation.to_string(), attempt, delay));
        }

        fn on_error(&self, _message: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_analysis_start(42);
        cb.on_blueprint_ready(5);
        cb.on_card_start(0, 5);
        cb.on_card_complete(0, 5, 1024);
        cb.on_retry("analysis", 1, Duration::from_secs(3));
        cb.on_error("boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_card_complete(0, 2, 10);
        tracker.on_card_complete(1, 2, 10);
        tracker.on_retry("card 1", 1, Duration::from_millis(3000));
        tracker.on_error("rate limited");

        assert_eq!(tracker.cards.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        let retries = tracker.retries.lock().unwrap();
        assert_eq!(retries[0], ("card 1".to_string(), 1, Duration::from_millis(3000)));
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_blueprint_ready(3);
    }
}
