//! Pipeline stages for image localization.
//!
//! Each submodule implements exactly one step and can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ paths ──▶ fetch ──▶ transcode ──▶ rewrite
//! (scan doc)  (targets)  (HTTP)    (image)       (edit doc)
//! ```
//!
//! 1. [`extract`]: find remote images in front matter, Markdown and HTML;
//!    dedupe by URL
//! 2. [`paths`]: assign each reference a `YYYY/MM/DD/<name>.<ext>` target
//! 3. [`fetch`]: batched downloads with retry; the only stage with
//!    network I/O
//! 4. [`transcode`]: resize / convert per policy; runs in `spawn_blocking`
//!    because decoding is CPU-bound
//! 5. [`rewrite`]: splice local links back into the original text

pub mod extract;
pub mod fetch;
pub mod paths;
pub mod rewrite;
pub mod transcode;
