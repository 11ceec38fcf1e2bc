//! Core abstractions for passwatch: credential entries, search matching,
//! key metadata types and the serialized backend contract.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod backend;
pub mod content;
pub mod entry;
pub mod keyinfo;
pub mod search;
