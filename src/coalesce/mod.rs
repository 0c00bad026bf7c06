//! Coalescing, serializing rate limiter.
//!
//! Many "something changed" signals collapse into a single run of a
//! [`Handler`]. Runs never overlap and consecutive run starts are at least
//! one interval apart.

mod handler;
mod limiter;
mod sink;

pub use handler::Handler;
pub use limiter::{CoalescingLimiter, LimiterState, LimiterStats};
pub use sink::{ErrorSink, LogSink};
