//! Session Replay
//!
//! Windowed, time-ordered replay of a recorded session.
//!
//! ```text
//! ReplayService ──► ReplayController ──► scheduler loop ──► BroadcastPort
//!                        │                    │
//!                        └──── WindowBuffer ◄─┘ (load / prefetch)
//!                                   │
//!                               EventStore
//! ```

mod buffer;
mod command;
mod controller;
mod error;
mod scheduler;
mod service;
mod settings;

pub use buffer::WindowBuffer;
pub use command::{ControlCommand, ControlRequest, ControlResponse, SelectSessionResponse};
pub use controller::{PlaybackPosition, PlaybackStatus, ReplayController};
pub use error::ReplayError;
pub use service::ReplayService;
pub use settings::{DEFAULT_SPEED, MAX_SPEED, MIN_SPEED, ReplaySettings, clamp_speed};
