//! dsnet_store — local persistence for the anonymous search-and-messaging
//! client (spec.md §3, §4.4, §6).
//!
//! Non-sensitive metadata and key material alike are stored as plain BLOBs:
//! unlike a chat vault, nothing here is encrypted at rest, because the
//! specification's data model has no local-unlock/password concept.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on first open.

pub mod db;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;

pub use db::Store;
pub use error::StoreError;
pub use repository::{ConversationUpsert, LoadedConversation, SqliteRepository};
