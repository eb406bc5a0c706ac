//! Error types for the mdimg-localize library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LocalizeError`]: **Fatal**: the run cannot proceed at all (invalid
//!   configuration, HTTP client could not be built, input file unreadable).
//!   Returned as `Err(LocalizeError)` from the top-level `localize*` functions.
//!
//! * [`AssetError`]: **Non-fatal**: a single image reference could not be
//!   localized (HTTP 500, timeout, disguised error page, directory not
//!   writable) but every other reference is unaffected. Stored inside
//!   [`crate::output::AssetReport`]; the reference keeps pointing at its
//!   remote URL in the rewritten document.
//!
//! Transcoding never produces an error value at all: a codec or resize
//! failure falls back to the untouched download and is recorded as
//! [`crate::pipeline::transcode::TranscodeAction::Fallback`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mdimg-localize library.
///
/// Per-reference failures use [`AssetError`] and are stored in
/// [`crate::output::AssetReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum LocalizeError {
    // ── Input / output ────────────────────────────────────────────────────
    /// The input document could not be read.
    #[error("Failed to read document '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the rewritten document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON configuration file could not be read or parsed.
    #[error("Failed to load config file '{path}': {detail}")]
    ConfigFile { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── HTTP ──────────────────────────────────────────────────────────────
    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image reference.
///
/// Network variants are retried up to the configured budget before they are
/// recorded; `Filesystem` and `DeadlineExceeded` are recorded immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AssetError {
    /// The server answered with a non-2xx, non-redirect status.
    #[error("HTTP {status} from '{url}'")]
    Http { url: String, status: u16 },

    /// The transport timeout expired before the body finished.
    #[error("Timed out after {timeout_ms}ms fetching '{url}'")]
    Timeout { url: String, timeout_ms: u64 },

    /// Connection-level failure (DNS, TLS, reset, body read).
    #[error("Transport error fetching '{url}': {detail}")]
    Transport { url: String, detail: String },

    /// Redirect hops used up the whole attempt budget.
    #[error("Redirect loop for '{url}' after {hops} hops")]
    RedirectLoop { url: String, hops: u32 },

    /// A 3xx response without a usable `Location` header.
    #[error("Redirect from '{url}' has no usable Location header")]
    MissingRedirectTarget { url: String },

    /// Body was smaller than the minimum payload size; most likely an error
    /// page served with a 200 status.
    #[error("Payload from '{url}' too small ({bytes} bytes < {min}), probably an error page")]
    UndersizedPayload { url: String, bytes: u64, min: u64 },

    /// A directory or file could not be created or written.
    #[error("Filesystem error at '{path}': {detail}")]
    Filesystem { path: PathBuf, detail: String },

    /// The whole-run deadline passed before this reference was attempted.
    #[error("Run deadline of {deadline_ms}ms exceeded before '{url}' was fetched")]
    DeadlineExceeded { url: String, deadline_ms: u64 },
}

impl AssetError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Filesystem failures and deadline expiry are final for the reference;
    /// everything on the network side is worth retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AssetError::Filesystem { .. } | AssetError::DeadlineExceeded { .. }
        )
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        AssetError::Filesystem {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_display() {
        let e = AssetError::Http {
            url: "https://cdn.test/a.png".into(),
            status: 500,
        };
        let msg = e.to_string();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("cdn.test"));
    }

    #[test]
    fn undersized_display() {
        let e = AssetError::UndersizedPayload {
            url: "https://cdn.test/a.png".into(),
            bytes: 42,
            min: 100,
        };
        assert!(e.to_string().contains("42 bytes < 100"));
    }

    #[test]
    fn filesystem_is_not_retryable() {
        let e = AssetError::filesystem("/nope", "permission denied");
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("permission denied"));
    }

    #[test]
    fn network_errors_are_retryable() {
        assert!(AssetError::Timeout {
            url: "u".into(),
            timeout_ms: 10
        }
        .is_retryable());
        assert!(AssetError::MissingRedirectTarget { url: "u".into() }.is_retryable());
    }

    #[test]
    fn config_error_display() {
        let e = LocalizeError::InvalidConfig("Concurrency must be ≥ 1".into());
        assert!(e.to_string().contains("Concurrency"));
    }
}
