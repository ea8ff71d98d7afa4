//! Stages of a single page conversion.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ render ──▶ encode ──▶ worker (upload + persist)
//! (HTTP)    (pdfium)   (PNG)
//! ```
//!
//! 1. [`fetch`]  — GET with exponential backoff on 5xx; the only stage with
//!    network I/O besides the storage upload
//! 2. [`render`] — rasterise one page and collect its link URIs; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — flatten to opaque RGB and PNG-encode
//! 4. [`worker`] — drives the stages above for one page, idempotently

pub mod encode;
pub mod fetch;
pub mod render;
pub mod worker;
