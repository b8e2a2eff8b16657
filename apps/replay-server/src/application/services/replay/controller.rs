//! Replay Controller
//!
//! Control surface for one session's playback. The controller owns the
//! cursor, the current window, and the scheduler task. Control operations
//! run concurrently with the scheduler; cursor and window changes happen
//! under one async mutex so the loop never observes a half-applied seek,
//! while pause and speed are lock-free flags read on each iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{BroadcastPort, EventStore};
use crate::domain::replay::{Cursor, Window};
use crate::domain::time::SharedClock;
use crate::infrastructure::metrics::{self, SeekDirection};

use super::buffer::WindowBuffer;
use super::error::ReplayError;
use super::scheduler::{self, LoopExit};
use super::settings::{DEFAULT_SPEED, ReplaySettings, clamp_speed, seconds_delta};

// =============================================================================
// Status
// =============================================================================

/// Playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Initialized, scheduler not launched.
    Idle,
    /// Scheduler is replaying events.
    Running,
    /// Scheduler is launched but suspended.
    Paused,
    /// Every event up to the session end has been processed.
    Completed,
    /// Stopped on request.
    Stopped,
}

/// Point-in-time view of a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    /// Session being replayed.
    pub session_id: String,
    /// Lifecycle state.
    pub status: PlaybackStatus,
    /// Current replay instant.
    pub current_time: DateTime<Utc>,
    /// Next event index within the window.
    pub current_index: usize,
    /// Current window start.
    pub window_start: DateTime<Utc>,
    /// Current window end.
    pub window_end: DateTime<Utc>,
    /// Events in the current window.
    pub window_events: usize,
    /// First instant of the session.
    pub session_start: DateTime<Utc>,
    /// Last instant of the session.
    pub session_end: DateTime<Utc>,
    /// Playback speed.
    pub speed: f64,
    /// Whether playback is paused.
    pub paused: bool,
}

// =============================================================================
// Shared State
// =============================================================================

/// First and last instants of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SessionBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Flags mutated by control operations and read by the loop each iteration.
#[derive(Debug)]
pub(super) struct Controls {
    paused: AtomicBool,
    running: AtomicBool,
    speed_bits: AtomicU64,
}

impl Controls {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            running: AtomicBool::new(true),
            speed_bits: AtomicU64::new(DEFAULT_SPEED.to_bits()),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Set the pause flag, returning the previous value.
    fn swap_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::AcqRel)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }

    fn set_speed(&self, speed: f64) {
        self.speed_bits.store(speed.to_bits(), Ordering::Release);
    }
}

/// Cursor and the window it indexes, replaced together.
#[derive(Debug)]
pub(super) struct PlaybackState {
    pub cursor: Cursor,
    pub window: Arc<Window>,
}

/// State shared between the controller and its scheduler task.
pub(super) struct Shared {
    pub session_id: String,
    pub settings: ReplaySettings,
    pub bounds: SessionBounds,
    pub buffer: WindowBuffer,
    pub port: Arc<dyn BroadcastPort>,
    pub controls: Controls,
    pub state: Mutex<PlaybackState>,
    pub status: watch::Sender<PlaybackStatus>,
    /// Wakes a loop parked on pause. Never stores a permit.
    pub resumed: Notify,
    /// Wakes a loop sleeping between events after the cursor moved.
    pub seeked: Notify,
}

impl Shared {
    fn set_status(&self, status: PlaybackStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(session_id = %self.session_id, ?previous, ?status, "Playback status changed");
        }
    }
}

struct ReplayTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

// =============================================================================
// Controller
// =============================================================================

/// Playback controller for one session.
pub struct ReplayController {
    shared: Arc<Shared>,
    task: Mutex<Option<ReplayTask>>,
}

impl std::fmt::Debug for ReplayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayController")
            .field("session_id", &self.shared.session_id)
            .field("status", &*self.shared.status.borrow())
            .finish_non_exhaustive()
    }
}

impl ReplayController {
    /// Load a session and its first window.
    ///
    /// Computes the session bounds across every location, stat sample and
    /// kill, initializes every channel watermark to the session start, and
    /// leaves the controller `Idle` until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Fails if the session does not exist, has no participants, has a
    /// malformed location timestamp, or the store lookup fails.
    pub async fn initialize(
        session_id: &str,
        store: Arc<dyn EventStore>,
        port: Arc<dyn BroadcastPort>,
        clock: SharedClock,
        settings: ReplaySettings,
    ) -> Result<Self, ReplayError> {
        let session = store
            .find_session(session_id)
            .await?
            .ok_or_else(|| ReplayError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        session.validate()?;

        let (start, end) = session.time_bounds(clock.as_ref());
        let buffer = WindowBuffer::new(store, session_id, end, settings.window_size);
        let window = buffer.load(start).await;

        info!(
            session_id = %session_id,
            session_start = %start,
            session_end = %end,
            soldiers = session.participated_soldiers.len(),
            kills = session.events.len(),
            first_window_events = window.len(),
            "Initialized replay"
        );

        let (status, _) = watch::channel(PlaybackStatus::Idle);
        let shared = Shared {
            session_id: session_id.to_string(),
            settings,
            bounds: SessionBounds { start, end },
            buffer,
            port,
            controls: Controls::new(),
            state: Mutex::new(PlaybackState {
                cursor: Cursor::new(start),
                window: Arc::new(window),
            }),
            status,
            resumed: Notify::new(),
            seeked: Notify::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
            task: Mutex::new(None),
        })
    }

    /// Session being replayed.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// First instant of the session.
    #[must_use]
    pub fn session_start(&self) -> DateTime<Utc> {
        self.shared.bounds.start
    }

    /// Last instant of the session.
    #[must_use]
    pub fn session_end(&self) -> DateTime<Utc> {
        self.shared.bounds.end
    }

    /// Launch the scheduler. A no-op while it is already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            debug!(session_id = %self.shared.session_id, "Replay already running");
            return;
        }

        self.shared.controls.set_running(true);
        self.shared.set_status(if self.shared.controls.is_paused() {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Running
        });

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            if scheduler::run(Arc::clone(&shared), token).await == LoopExit::Completed {
                shared.controls.set_running(false);
                shared.set_status(PlaybackStatus::Completed);
                info!(session_id = %shared.session_id, "Replay completed");
            }
        });

        *task = Some(ReplayTask { handle, cancel });
        info!(session_id = %self.shared.session_id, "Started replay");
    }

    /// Cancel the scheduler and wait for it to finish. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.shared.controls.set_running(false);

        let task = self.task.lock().await.take();
        if let Some(ReplayTask { handle, cancel }) = task {
            cancel.cancel();
            if let Err(error) = handle.await {
                if !error.is_cancelled() {
                    warn!(session_id = %self.shared.session_id, error = %error, "Replay task ended abnormally");
                }
            }
        }

        self.shared.buffer.cancel_prefetch();
        self.shared.set_status(PlaybackStatus::Stopped);
        info!(session_id = %self.shared.session_id, "Stopped replay");
    }

    /// Suspend playback at the next poll.
    pub fn pause(&self) {
        self.shared.controls.swap_paused(true);
        self.shared.status.send_if_modified(|status| {
            if *status == PlaybackStatus::Running {
                *status = PlaybackStatus::Paused;
                return true;
            }
            false
        });
        info!(session_id = %self.shared.session_id, "Paused replay");
    }

    /// Continue playback. Only toggles the flag when not paused, so the
    /// pending inter-event delay is kept.
    pub fn resume(&self) {
        let was_paused = self.shared.controls.swap_paused(false);
        self.shared.status.send_if_modified(|status| {
            if *status == PlaybackStatus::Paused {
                *status = PlaybackStatus::Running;
                return true;
            }
            false
        });
        if was_paused {
            self.shared.resumed.notify_waiters();
        }
        info!(session_id = %self.shared.session_id, was_paused, "Resumed replay");
    }

    /// Set the playback speed, clamped to the allowed range. Returns the
    /// speed actually applied. Takes effect from the next inter-event delay.
    pub fn set_speed(&self, requested: f64) -> f64 {
        let speed = clamp_speed(requested);
        self.shared.controls.set_speed(speed);
        info!(session_id = %self.shared.session_id, requested, speed, "Changed replay speed");
        speed
    }

    /// Current playback speed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.shared.controls.speed()
    }

    /// Whether the replay has not been stopped or completed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.controls.is_running()
    }

    /// Seek forward by `seconds`. Returns the instant reached.
    pub async fn skip(&self, seconds: f64) -> DateTime<Utc> {
        self.seek_by(seconds.abs(), SeekDirection::Forward).await
    }

    /// Seek backward by `seconds`. Returns the instant reached.
    pub async fn go_back(&self, seconds: f64) -> DateTime<Utc> {
        self.seek_by(-seconds.abs(), SeekDirection::Backward).await
    }

    async fn seek_by(&self, offset_secs: f64, direction: SeekDirection) -> DateTime<Utc> {
        let shared = &self.shared;
        let SessionBounds { start, end } = shared.bounds;
        let mut state = shared.state.lock().await;

        let current = state.cursor.current_instant;
        let target = current
            .checked_add_signed(seconds_delta(offset_secs))
            .unwrap_or(match direction {
                SeekDirection::Forward => end,
                SeekDirection::Backward => start,
            })
            .clamp(start, end);

        if !state.window.contains(target) {
            let reload_from = if target > start {
                (target - shared.settings.seek_context_delta()).max(start)
            } else {
                start
            };
            state.window = Arc::new(shared.buffer.load(reload_from).await);
        }

        let window = Arc::clone(&state.window);
        let index = window.find_index(target);
        state.cursor.seek(target, index);

        let snapshot = window.state_at(target);
        for event in &snapshot {
            shared.port.publish(event).await;
        }
        drop(state);

        metrics::record_seek(direction);
        shared.seeked.notify_waiters();
        info!(
            session_id = %shared.session_id,
            from = %current,
            to = %target,
            index,
            snapshot_events = snapshot.len(),
            "Seeked replay"
        );
        target
    }

    /// Start of the window being prefetched, if any.
    #[must_use]
    pub fn pending_prefetch(&self) -> Option<DateTime<Utc>> {
        self.shared.buffer.pending_prefetch()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> PlaybackStatus {
        *self.shared.status.borrow()
    }

    /// Watch lifecycle changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.shared.status.subscribe()
    }

    /// Snapshot of the current position.
    pub async fn position(&self) -> PlaybackPosition {
        let state = self.shared.state.lock().await;
        PlaybackPosition {
            session_id: self.shared.session_id.clone(),
            status: self.status(),
            current_time: state.cursor.current_instant,
            current_index: state.cursor.current_index,
            window_start: state.window.start(),
            window_end: state.window.end(),
            window_events: state.window.len(),
            session_start: self.shared.bounds.start,
            session_end: self.shared.bounds.end,
            speed: self.speed(),
            paused: self.shared.controls.is_paused(),
        }
    }
}
