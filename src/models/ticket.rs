use crate::entities::{ticket_entity, ticket_message_entity};

#[derive(Debug, Clone)]
pub struct TicketWithMessages {
    pub ticket: ticket_entity::Model,
    pub messages: Vec<ticket_message_entity::Model>,
    pub owner_telegram_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketCounts {
    pub open: u64,
    pub answered: u64,
    pub closed: u64,
}

/// Returned by admin replies so the bot can notify the ticket owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    pub ticket_id: i32,
    pub owner_telegram_id: i64,
}
