//! Collections: document handles, mutation policies, and change events.

#[allow(clippy::module_inception)]
mod collection;
mod document;
mod event;
mod mutation;

pub use collection::Collection;
pub use document::Document;
pub use event::{CollectionChange, DocumentChange};
pub use mutation::ConcurrencyControl;
