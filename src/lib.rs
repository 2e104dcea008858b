//! Windowgate - Per-Key Fixed-Window Rate Limiting
//!
//! This crate admits or rejects requests tagged with a key so that no key
//! exceeds a configured number of admissions within a fixed time window.
//! The same windowing rule runs under either a single table-wide lock or a
//! lock per key, selected with [`ratelimit::LockPolicy`].

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod replay;

pub use error::{Result, WindowgateError};
pub use ratelimit::{Clock, FixedWindowLimiter, LockPolicy, ManualClock, MonotonicClock};
