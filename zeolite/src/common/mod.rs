//! Common types and helpers shared across the crate.

mod constants;
mod sync;
mod value;

pub use constants::*;
pub use sync::*;
pub use value::*;
