//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the session store and subscriber fan-out.
pub mod ports;

/// Application services for session replay.
pub mod services;
