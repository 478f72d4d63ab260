//! dsnet_proto — wire types and serialisation for the anonymous
//! search-and-messaging network.
//!
//! # Modules
//! - `wire`  — tagged binary frames (Query/PigeonholeMessage/Notification/Publication, spec §6)
//! - `api`   — bulletin-board and token-server HTTP DTOs (MessagePack)
//! - `error` — unified error type

pub mod api;
pub mod error;
pub mod wire;

pub use error::ProtoError;
pub use wire::{decode_any, Notification, PigeonholeMessage, Publication, Query, WireMessage, WireTag};
