//! Session lifecycle management
//!
//! The [`SessionStore`] persists the local session claim, the
//! [`TimerCoordinator`] owns the scheduled activities, and the
//! [`SessionController`] ties both to the remote session API.

pub mod controller;
pub mod storage;
pub mod timers;
pub mod types;

pub use controller::SessionController;
pub use storage::{FileStore, MemoryStore, SessionStore, CURRENT_USER_KEY, SESSION_ID_KEY};
pub use timers::{minutes_left, TimerCoordinator};
pub use types::*;
