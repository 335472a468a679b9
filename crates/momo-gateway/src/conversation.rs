use momo_types::{ConversationId, UserId};

use crate::error::GatewayError;

/// Largest user id that can take part in a direct conversation. Both ids of
/// a pair must fit in 31 bits so the packed id stays a positive i64.
pub const MAX_PAIR_USER_ID: UserId = i32::MAX as UserId;

const LOW_MASK: i64 = 0xFFFF_FFFF;

/// Conversation id shared by two users, the same whichever of them asks.
///
/// The smaller id goes in the high 32 bits and the larger in the low 32 bits.
/// Self-conversations and ids outside `1..=MAX_PAIR_USER_ID` are rejected.
pub fn pair_conversation_id(a: UserId, b: UserId) -> Result<ConversationId, GatewayError> {
    for id in [a, b] {
        if id <= 0 || id > MAX_PAIR_USER_ID {
            return Err(GatewayError::validation(format!(
                "user id {} is outside the supported range 1..={}",
                id, MAX_PAIR_USER_ID
            )));
        }
    }
    if a == b {
        return Err(GatewayError::validation("cannot open a conversation with yourself"));
    }

    let (low, high) = if a < b { (a, b) } else { (b, a) };
    Ok((low << 32) | (high & LOW_MASK))
}

/// Inverse of [`pair_conversation_id`]. Returns `None` for ids that cannot
/// have come out of it (group ids included).
pub fn pair_members(conversation_id: ConversationId) -> Option<(UserId, UserId)> {
    let low = conversation_id >> 32;
    let high = conversation_id & LOW_MASK;
    let in_range = |id: UserId| id > 0 && id <= MAX_PAIR_USER_ID;

    (conversation_id > 0 && in_range(low) && in_range(high) && low < high).then_some((low, high))
}

/// Parse the `conv_id` query value of a message stream request.
pub fn parse_conversation_id(raw: Option<&str>) -> Result<ConversationId, GatewayError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::validation("missing conversation id"))?;

    match raw.parse::<ConversationId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(GatewayError::validation("invalid conversation id")),
    }
}
