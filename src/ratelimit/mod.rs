//! Fixed-window rate limiting logic and state management.

mod clock;
mod limiter;
mod store;
mod window;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use limiter::FixedWindowLimiter;
pub use store::{store_for, CoarseStore, LockPolicy, PerKeyStore, WindowStore};
pub use window::{Decision, WindowRule, WindowState};
