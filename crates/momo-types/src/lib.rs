pub mod api;
pub mod frames;
pub mod models;

/// Authenticated user identifier.
pub type UserId = i64;

/// Opaque conversation identifier: a packed user pair for direct chats,
/// the group id for group chats.
pub type ConversationId = i64;
