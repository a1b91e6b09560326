//! Storage abstraction: the revision store contract, commit events, and the
//! in-memory implementation.

mod event;
pub mod memory;
mod revision_store;

pub use event::*;
pub use revision_store::*;
