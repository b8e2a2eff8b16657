//! Replay domain: events, the sorted window, and the cursor into it.

mod cursor;
mod event;
mod window;

pub use cursor::{Cursor, Watermarks};
pub use event::{Channel, KillFeedEvent, MovementEvent, ReplayEvent, StatsEvent};
pub use window::Window;
