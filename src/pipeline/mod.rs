//! Pipeline stages for résumé conversion and review.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own and the rendering backend can be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (storage / inference) ──▶ postprocess
//! (select)  (pdfium)   (PNG)                                (feedback JSON)
//! ```
//!
//! 1. [`input`]: read a path or URL and apply the single-file selection rules
//! 2. [`render`]: decode the PDF and paint one page at a fixed scale; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode the surface into a named artifact, or into
//!    base64 `ImageData` for the vision model
//! 4. [`postprocess`]: strip fences and chatter from the model reply and
//!    parse it into a JSON object

pub mod encode;
pub mod input;
pub mod postprocess;
pub mod render;
