//! Terminal client for a GraphQL note store.
//!
//! Edits are written to the local [`storage::NoteCache`] immediately and
//! pushed to the store in debounced, coalesced updates by
//! [`service::NoteEditor`].

pub mod config;
pub mod error;
pub mod service;
pub mod storage;

pub use error::{SyncError, SyncResult};
