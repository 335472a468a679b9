//! Momo messaging core.
//!
//! - `conversation`: deterministic pair → conversation id packing
//! - `registry`: conversation id → live subscribers
//! - `channel`: replay and fan-out for one conversation
//! - `session`: per-connection read loop and outbound writer
//! - `discovery`: conversation id lookup over a long-lived stream
//! - `store`: the persistence interface the core depends on

pub mod channel;
pub mod conversation;
pub mod discovery;
pub mod error;
pub mod registry;
pub mod session;
pub mod store;

pub use channel::{ConversationChannel, FanOut};
pub use conversation::{MAX_PAIR_USER_ID, pair_conversation_id, pair_members, parse_conversation_id};
pub use discovery::{resolve_request, run_discovery};
pub use error::GatewayError;
pub use registry::{ConnectionId, ConnectionRegistry, Outbound, Subscriber, Subscription};
pub use session::{ExitReason, SessionConfig, SessionContext, SessionReport, SessionState, run_session};
pub use store::{MessageStore, SqliteStore};
