//! # Zeolite - Embedded Multi-Process Document Database Core
//!
//! Zeolite is the concurrency and notification core of an embedded document
//! database: document handles with copy-on-write properties, optimistic
//! save/delete with pluggable conflict policies, and change notification
//! with per-handle scheduling.
//!
//! ## Key Features
//!
//! - **Embedded**: No separate server process required
//! - **Shared State**: Several database handles open on the same name share
//!   one store; a commit through any handle notifies listeners on all of
//!   them
//! - **Copy-on-Write Documents**: Reading a document is cheap; mutating a
//!   handle materializes only the touched paths
//! - **Conflict Policies**: Last-write-wins, fail-on-conflict, or an
//!   application-supplied merge handler, all built on one atomic
//!   compare-and-swap primitive
//! - **Change Events**: Per-collection and per-document listeners, with
//!   commits coalesced so a slow listener never sees an unbounded backlog
//! - **Scheduling Control**: Listeners run on the mutating thread by
//!   default, or are buffered and drained from a thread the application
//!   chooses
//! - **Pluggable Storage**: The built-in in-memory store can be replaced by
//!   any [`store::RevisionStoreProvider`] implementation
//! - **Clean API**: PIMPL pattern provides stable, encapsulated interface
//!
//! ## Quick Start
//!
//! ```rust
//! use zeolite::{props, Document};
//!
//! # fn main() -> zeolite::errors::ZeoliteResult<()> {
//! let db = zeolite::database::open_private("quick-start")?;
//! let collection = db.default_collection()?;
//!
//! // save a document
//! let doc = Document::with_properties("greeting", props! { text: "Howdy!" });
//! collection.save(&doc)?;
//!
//! // listen for changes
//! let token = collection.add_change_listener(|change| {
//!     println!("changed: {:?}", change.doc_ids());
//! })?;
//!
//! doc.put("text", "Hello!")?;
//! collection.save(&doc)?;
//!
//! token.remove();
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Pattern
//!
//! Zeolite uses the **PIMPL (Pointer To IMPLementation)** design pattern:
//! [`Database`], [`Collection`], and [`Document`] are cheap-to-clone
//! handles whose clones share the same underlying state through an `Arc`,
//! while the implementation stays encapsulated and free to evolve.
//!
//! ## Module Organization
//!
//! - [`collection`] - Collections, document handles, mutation policies, and
//!   change events
//! - [`common`] - Values, properties trees, and shared utilities
//! - [`database`] - The database handle
//! - [`errors`] - Error types and result definitions
//! - [`listener`] - Listener registration and removal tokens
//! - [`notifier`] - Notification scheduling (immediate vs. buffered)
//! - [`store`] - The revision store contract and the in-memory backend

pub mod collection;
pub mod common;
pub mod database;
pub mod errors;
pub mod listener;
pub mod notifier;
pub mod store;

pub use collection::{Collection, CollectionChange, ConcurrencyControl, Document, DocumentChange};
pub use database::Database;
pub use errors::{ErrorKind, ZeoliteError, ZeoliteResult};
pub use listener::ListenerToken;
