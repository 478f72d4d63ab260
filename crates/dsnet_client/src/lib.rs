//! Client core for an anonymous, server-mediated search-and-messaging
//! network: conversation state machine, pigeonhole ratchet wiring, token
//! acquisition, message sender/retriever, MSPSI engine, index abstraction
//! and the long-lived notification coordinator.

pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod mspsi;
pub mod query;
pub mod retriever;
pub mod sender;
pub mod token;

pub use config::{ClientConfig, CoverTrafficConfig, QueryType};
pub use conversation::{Conversation, ConversationRole};
pub use coordinator::ClientCoordinator;
pub use error::ClientError;
pub use index::{Document, Index, MemoryIndex};
pub use query::{IssuedQuery, QueryIssuer};
pub use retriever::{AddressMatchMessageRetriever, MessageRetriever, ProbabilisticCoverMessageRetriever};
pub use sender::{CoverTrafficSender, DirectMessageSender, MessageSender};
pub use token::{AbeToken, TokenManager};
