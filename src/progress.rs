//! Progress-callback trait for per-asset localization events.
//!
//! Inject an [`Arc<dyn LocalizeProgressCallback>`] via
//! [`crate::config::LocalizeConfigBuilder::progress_callback`] to receive
//! events as the pipeline fetches and transcodes each image.
//!
//! # Example
//!
//! ```rust
//! use mdimg_localize::{LocalizeConfig, LocalizeProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl LocalizeProgressCallback for CountingCallback {
//!     fn on_asset_complete(&self, url: &str, local_link: &str) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{url} -> {local_link}");
//!     }
//! }
//!
//! let config = LocalizeConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each reference.
///
/// Within a batch fetches run concurrently, so `on_asset_start`,
/// `on_asset_complete` and `on_asset_error` may be called from several
/// tasks at once. All methods default to no-ops.
pub trait LocalizeProgressCallback: Send + Sync {
    /// Called once after extraction, before any download starts.
    fn on_run_start(&self, total_assets: usize) {
        let _ = total_assets;
    }

    /// Called before the first attempt for a reference.
    fn on_asset_start(&self, url: &str) {
        let _ = url;
    }

    /// Called when a reference is on disk and will be rewritten.
    fn on_asset_complete(&self, url: &str, local_link: &str) {
        let _ = (url, local_link);
    }

    /// Called when a reference is given up on.
    fn on_asset_error(&self, url: &str, error: &str) {
        let _ = (url, error);
    }

    /// Called once after the document has been rewritten.
    fn on_run_complete(&self, total_assets: usize, localized: usize) {
        let _ = (total_assets, localized);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl LocalizeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::LocalizeConfig`].
pub type ProgressCallback = Arc<dyn LocalizeProgressCallback>;
