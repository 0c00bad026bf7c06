//! Reload handlers.
//!
//! Concrete [`Handler`](crate::coalesce::Handler) implementations for
//! refreshing a proxy: running an external reload script, and running
//! several steps in order.

mod command;
mod sequence;

pub use command::CommandHandler;
pub use sequence::Sequence;
