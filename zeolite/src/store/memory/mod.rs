//! In-memory revision store and its process-wide named registry.

pub mod registry;
mod store;

pub use store::MemoryRevisionStore;
