//! Window Buffer
//!
//! Loads contiguous windows of a session from the [`EventStore`] and keeps
//! at most one background prefetch in flight. A prefetch never touches the
//! live window: it parks its result in a slot keyed by window start, and a
//! later [`WindowBuffer::load`] for the same start promotes it. A load for
//! any other start aborts the stale prefetch first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ports::EventStore;
use crate::domain::replay::Window;
use crate::infrastructure::metrics::{self, WindowLoadOutcome};

use super::settings::to_delta;

// =============================================================================
// Loader
// =============================================================================

/// Queries one window worth of events. Cheap to clone into a prefetch task.
#[derive(Clone)]
struct WindowLoader {
    store: Arc<dyn EventStore>,
    session_id: Arc<str>,
    session_end: DateTime<Utc>,
    window_size: TimeDelta,
}

impl WindowLoader {
    fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_signed(self.window_size)
            .map_or(self.session_end, |end| end.min(self.session_end))
    }

    async fn fetch(&self, start: DateTime<Utc>) -> Window {
        let end = self.window_end(start);
        let session_id = &*self.session_id;
        let started = Instant::now();

        let result = tokio::try_join!(
            self.store.query_soldier_movement(session_id, start, end),
            self.store.query_kill_events(session_id, start, end),
            self.store.query_stats(session_id, start, end),
        );
        metrics::record_window_load_duration(started.elapsed());

        match result {
            Ok((tracks, kills, stats)) => {
                let window = Window::assemble(start, end, tracks, kills, stats);
                metrics::record_window_load(WindowLoadOutcome::Ok);
                info!(
                    session_id = %session_id,
                    window_start = %start,
                    window_end = %end,
                    events = window.len(),
                    "Loaded replay window"
                );
                window
            }
            Err(error) => {
                metrics::record_window_load(WindowLoadOutcome::Error);
                warn!(
                    session_id = %session_id,
                    window_start = %start,
                    window_end = %end,
                    error = %error,
                    "Window load failed, continuing with an empty window"
                );
                Window::empty(start, end)
            }
        }
    }
}

// =============================================================================
// Buffer
// =============================================================================

struct Prefetch {
    start: DateTime<Utc>,
    handle: JoinHandle<Window>,
}

/// Window loader with a single coalescing prefetch slot.
pub struct WindowBuffer {
    loader: WindowLoader,
    prefetch: Mutex<Option<Prefetch>>,
}

impl std::fmt::Debug for WindowBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowBuffer")
            .field("session_id", &self.loader.session_id)
            .field("session_end", &self.loader.session_end)
            .field("window_size", &self.loader.window_size)
            .field("prefetch", &self.pending_prefetch())
            .finish()
    }
}

impl WindowBuffer {
    /// Create a buffer over `session_id`, whose last event is at `session_end`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        session_id: &str,
        session_end: DateTime<Utc>,
        window_size: Duration,
    ) -> Self {
        Self {
            loader: WindowLoader {
                store,
                session_id: Arc::from(session_id),
                session_end,
                window_size: to_delta(window_size),
            },
            prefetch: Mutex::new(None),
        }
    }

    /// Last instant of the session.
    #[must_use]
    pub const fn session_end(&self) -> DateTime<Utc> {
        self.loader.session_end
    }

    /// End of the window starting at `start`, capped at the session end.
    #[must_use]
    pub fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        self.loader.window_end(start)
    }

    /// Load the window starting at `start`.
    ///
    /// A prefetch for the same start is promoted, awaiting it if it has not
    /// finished. Store failures yield an empty window rather than an error.
    pub async fn load(&self, start: DateTime<Utc>) -> Window {
        let pending = self.prefetch.lock().take();
        if let Some(prefetch) = pending {
            if prefetch.start == start {
                match prefetch.handle.await {
                    Ok(window) => {
                        metrics::record_window_load(WindowLoadOutcome::Prefetched);
                        debug!(window_start = %start, "Promoted prefetched window");
                        return window;
                    }
                    Err(error) => {
                        warn!(window_start = %start, error = %error, "Prefetch task failed, reloading");
                    }
                }
            } else {
                debug!(
                    stale_start = %prefetch.start,
                    window_start = %start,
                    "Discarding stale prefetch"
                );
                prefetch.handle.abort();
            }
        }
        self.loader.fetch(start).await
    }

    /// Start loading the window at `start` in the background.
    ///
    /// Idempotent for the same start; a prefetch for a different start
    /// replaces the outstanding one.
    pub fn prefetch(&self, start: DateTime<Utc>) {
        let mut slot = self.prefetch.lock();
        if slot.as_ref().is_some_and(|pending| pending.start == start) {
            return;
        }
        if let Some(stale) = slot.take() {
            stale.handle.abort();
        }

        let loader = self.loader.clone();
        let handle = tokio::spawn(async move { loader.fetch(start).await });
        debug!(window_start = %start, "Prefetching next window");
        *slot = Some(Prefetch { start, handle });
    }

    /// Abort any outstanding prefetch.
    pub fn cancel_prefetch(&self) {
        if let Some(pending) = self.prefetch.lock().take() {
            pending.handle.abort();
        }
    }

    /// Start of the outstanding prefetch, if any.
    #[must_use]
    pub fn pending_prefetch(&self) -> Option<DateTime<Utc>> {
        self.prefetch.lock().as_ref().map(|pending| pending.start)
    }
}

impl Drop for WindowBuffer {
    fn drop(&mut self) {
        self.cancel_prefetch();
    }
}
