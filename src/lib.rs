//! Coalescer - Coalescing Reload Limiter
//!
//! This crate serializes and throttles expensive reload work, such as
//! regenerating and reloading a proxy configuration, in response to a stream
//! of "something changed" signals. Bursts of signals collapse into a single
//! run and consecutive runs are spaced by a minimum interval.

pub mod coalesce;
pub mod config;
pub mod error;
pub mod reload;
pub mod trigger;
