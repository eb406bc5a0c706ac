//! Result types returned by a localization run.

use crate::error::AssetError;
use crate::pipeline::extract::ReferenceCategory;
use crate::pipeline::transcode::TranscodeAction;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizeOutput {
    /// The rewritten document. Always present, even if every asset failed.
    pub document: String,
    /// One entry per unique remote URL, in extraction order.
    pub assets: Vec<AssetReport>,
    pub stats: LocalizeStats,
}

impl LocalizeOutput {
    /// Reports for references that kept their remote URL.
    pub fn failures(&self) -> impl Iterator<Item = &AssetReport> {
        self.assets.iter().filter(|a| !a.succeeded)
    }
}

/// Per-reference outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReport {
    pub original_url: String,
    pub category: ReferenceCategory,
    pub alt_text: String,
    /// File in effect on disk. `None` when the reference failed.
    pub final_local_path: Option<PathBuf>,
    /// Link written into the document. `None` when the reference failed.
    pub local_link: Option<String>,
    pub succeeded: bool,
    /// The file was already on disk and no request was made.
    pub skipped_download: bool,
    pub attempts: u32,
    /// Size of the file in effect after transcoding.
    pub bytes: u64,
    /// `None` when transcoding is disabled or the fetch failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode: Option<TranscodeAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AssetError>,
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizeStats {
    /// Unique remote URLs found.
    pub total_references: usize,
    pub localized: usize,
    pub failed: usize,
    pub skipped_downloads: usize,
    pub bytes_downloaded: u64,
    /// Bytes removed by accepted transcodes.
    pub bytes_saved: u64,
    pub duration_ms: u64,
}

impl LocalizeStats {
    pub(crate) fn from_reports(assets: &[AssetReport], downloaded: u64, saved: u64) -> Self {
        let localized = assets.iter().filter(|a| a.succeeded).count();
        Self {
            total_references: assets.len(),
            localized,
            failed: assets.len() - localized,
            skipped_downloads: assets.iter().filter(|a| a.skipped_download).count(),
            bytes_downloaded: downloaded,
            bytes_saved: saved,
            duration_ms: 0,
        }
    }
}
