//! Lazy, shared loading of the PDF rendering library.
//!
//! [`LibraryLoader`] is an explicit service object rather than a global: the
//! caller constructs one, wraps it in an `Arc` and hands it to every
//! conversion. Its lifecycle is
//!
//! ```text
//! Uninitialized ──ensure_ready──▶ Loading ──ok──▶ Ready
//!       ▲                            │
//!       └──────────── err ───────────┘
//! ```
//!
//! While `Loading`, every caller awaits the same shared future, so at most
//! one load is in flight and all of them receive the same handle (or the
//! same error). A failed load returns the loader to `Uninitialized` so the
//! next call starts over. Once `Ready`, the handle is returned without I/O.
//!
//! The load itself runs on its own task: a caller that stops awaiting does
//! not cancel it, and a panicking provider surfaces as
//! [`LoadError::Interrupted`] instead of poisoning the waiters.

use crate::error::LoadError;
use crate::pipeline::render::{PdfEngine, PdfiumEngine};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An initialised rendering library, shared read-only by all conversions.
pub type LibraryHandle = Arc<dyn PdfEngine>;

/// Produces a ready [`LibraryHandle`].
///
/// Implemented over pdfium by [`PdfiumProvider`]; tests supply stubs.
#[async_trait]
pub trait LibraryProvider: Send + Sync {
    async fn load(&self) -> Result<LibraryHandle, LoadError>;
}

/// Observable lifecycle state of a [`LibraryLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    Uninitialized,
    Loading,
    Ready,
}

type LoadFuture = Shared<BoxFuture<'static, Result<LibraryHandle, LoadError>>>;

enum State {
    Uninitialized,
    Loading { future: LoadFuture, generation: u64 },
    Ready(LibraryHandle),
}

struct Inner {
    state: State,
    /// Bumped on every new load and on reset so a stale load cannot
    /// overwrite a newer state.
    generation: u64,
}

/// Single-flight loader for the rendering library.
pub struct LibraryLoader {
    provider: Arc<dyn LibraryProvider>,
    inner: Mutex<Inner>,
    attempts: AtomicUsize,
}

impl LibraryLoader {
    pub fn new(provider: Arc<dyn LibraryProvider>) -> Self {
        Self {
            provider,
            inner: Mutex::new(Inner {
                state: State::Uninitialized,
                generation: 0,
            }),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Loader backed by a downloaded (or `PDFIUM_LIB_PATH`) pdfium.
    pub fn pdfium(download_timeout: Duration) -> Self {
        Self::new(Arc::new(PdfiumProvider::new(download_timeout)))
    }

    /// Return the handle, loading the library first if needed.
    pub async fn ensure_ready(&self) -> Result<LibraryHandle, LoadError> {
        let (future, generation) = {
            let mut inner = self.lock();
            match &inner.state {
                State::Ready(handle) => return Ok(Arc::clone(handle)),
                State::Loading { future, generation } => {
                    debug!("Library load already in flight, joining");
                    (future.clone(), *generation)
                }
                State::Uninitialized => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("Loading rendering library (attempt {})", attempt);

                    let future = self.spawn_load();
                    inner.state = State::Loading {
                        future: future.clone(),
                        generation,
                    };
                    (future, generation)
                }
            }
        };

        let outcome = future.await;

        let mut inner = self.lock();
        let current = matches!(
            inner.state,
            State::Loading { generation: g, .. } if g == generation
        );
        if current {
            inner.state = match &outcome {
                Ok(handle) => {
                    info!("Rendering library ready: {}", handle.describe());
                    State::Ready(Arc::clone(handle))
                }
                Err(e) => {
                    warn!("Rendering library load failed: {}", e);
                    State::Uninitialized
                }
            };
        }
        outcome
    }

    pub fn status(&self) -> LoaderStatus {
        match self.lock().state {
            State::Uninitialized => LoaderStatus::Uninitialized,
            State::Loading { .. } => LoaderStatus::Loading,
            State::Ready(_) => LoaderStatus::Ready,
        }
    }

    /// Number of times the provider has been asked to load.
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Drop the cached handle. An in-flight load still completes for its
    /// waiters but is not cached.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = State::Uninitialized;
        debug!("Library loader reset");
    }

    fn spawn_load(&self) -> LoadFuture {
        let provider = Arc::clone(&self.provider);
        let task = tokio::spawn(async move { provider.load().await });
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(LoadError::Interrupted(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── pdfium ────────────────────────────────────────────────────────────────

/// Fetches the pinned pdfium release (or honours `PDFIUM_LIB_PATH`) and binds it.
pub struct PdfiumProvider {
    client: reqwest::Client,
}

impl PdfiumProvider {
    pub fn new(download_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

#[async_trait]
impl LibraryProvider for PdfiumProvider {
    async fn load(&self) -> Result<LibraryHandle, LoadError> {
        let location = pdfium_fetch::fetch_library(&self.client)
            .await
            .map_err(|e| LoadError::Unavailable(e.to_string()))?;
        debug!(
            "pdfium located at {} ({:?})",
            location.path.display(),
            location.source
        );

        // Binding dlopens the library and resolves every symbol.
        tokio::task::spawn_blocking(move || {
            let pdfium = pdfium_fetch::bind(&location).map_err(|e| LoadError::Bind(e.to_string()))?;
            let engine: LibraryHandle = Arc::new(PdfiumEngine::new(pdfium, location.version));
            Ok(engine)
        })
        .await
        .map_err(|e| LoadError::Interrupted(e.to_string()))?
    }
}
