//! Domain Layer - Recorded sessions and replay types.
//!
//! Pure types and algorithms with no I/O: timestamp resolution, the typed
//! session document, and the sorted replay window with its cursor.

/// Timestamp resolution and clocks.
pub mod time;

/// Recorded session documents and range queries.
pub mod session;

/// Replay events, windows and cursors.
pub mod replay;
