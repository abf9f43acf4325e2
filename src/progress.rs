//! Progress callbacks for conversion stages and review status messages.
//!
//! Inject an [`Arc<dyn ReviewProgressCallback>`] via
//! [`crate::config::ReviewConfigBuilder::progress_callback`]. The
//! orchestrator reports a human-readable status line before every step
//! (`Uploading the file...`, `Analyzing...`) and the conversion pipeline
//! reports each state transition. All methods default to no-ops.
//!
//! # Example
//!
//! ```rust
//! use resume_review::{ReviewConfig, ReviewProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StatusLog(Mutex<Vec<String>>);
//!
//! impl ReviewProgressCallback for StatusLog {
//!     fn on_status(&self, status: &str) {
//!         self.0.lock().unwrap().push(status.to_string());
//!     }
//! }
//!
//! let config = ReviewConfig::builder()
//!     .progress_callback(Arc::new(StatusLog::default()))
//!     .build()
//!     .unwrap();
//! ```

use crate::convert::ConversionStage;
use std::sync::Arc;

/// Receives pipeline events.
///
/// Implementations must be `Send + Sync`: decode and render run on the
/// blocking pool, so `on_stage` may fire from a thread other than the one
/// that started the conversion.
pub trait ReviewProgressCallback: Send + Sync {
    /// A conversion entered `stage`.
    fn on_stage(&self, stage: ConversionStage) {
        let _ = stage;
    }

    /// The orchestrator's status line changed. Failures start with `Error:`.
    fn on_status(&self, status: &str) {
        let _ = status;
    }

    /// A record was persisted with feedback attached.
    fn on_complete(&self, record_id: &str) {
        let _ = record_id;
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl ReviewProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn ReviewProgressCallback>;

/// Fan an event out to an optional callback.
pub(crate) fn emit_stage(cb: Option<&ProgressCallback>, stage: ConversionStage) {
    if let Some(cb) = cb {
        cb.on_stage(stage);
    }
}

pub(crate) fn emit_status(cb: Option<&ProgressCallback>, status: &str) {
    if let Some(cb) = cb {
        cb.on_status(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<ConversionStage>>,
        statuses: Mutex<Vec<String>>,
    }

    impl ReviewProgressCallback for Recorder {
        fn on_stage(&self, stage: ConversionStage) {
            self.stages.lock().unwrap().push(stage);
        }
        fn on_status(&self, status: &str) {
            self.statuses.lock().unwrap().push(status.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage(ConversionStage::Decoding);
        cb.on_status("Analyzing...");
        cb.on_complete("id");
    }

    #[test]
    fn emit_helpers_forward_to_callback() {
        let rec = Arc::new(Recorder::default());
        let cb: ProgressCallback = rec.clone();
        emit_stage(Some(&cb), ConversionStage::Rendering);
        emit_status(Some(&cb), "Uploading the file...");
        emit_status(None, "dropped");

        assert_eq!(*rec.stages.lock().unwrap(), vec![ConversionStage::Rendering]);
        assert_eq!(
            *rec.statuses.lock().unwrap(),
            vec!["Uploading the file...".to_string()]
        );
    }
}
