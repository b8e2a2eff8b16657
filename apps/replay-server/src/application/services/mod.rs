//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ReplayService`: Owns the active replay and dispatches control commands
//! - `ReplayController`: Drives one session's windowed playback

/// Session replay engine and control surface.
pub mod replay;
