pub mod lucky_games;
pub mod payments;
pub mod promocode_usages;
pub mod promocodes;
pub mod referral_earnings;
pub mod referral_programs;
pub mod star_payments;
pub mod subscriptions;
pub mod ticket_messages;
pub mod tickets;
pub mod user_subscriptions;
pub mod users;

pub use lucky_games as lucky_game_entity;
pub use payments as payment_entity;
pub use promocode_usages as promocode_usage_entity;
pub use promocodes as promocode_entity;
pub use referral_earnings as referral_earning_entity;
pub use referral_programs as referral_program_entity;
pub use star_payments as star_payment_entity;
pub use subscriptions as plan_entity;
pub use ticket_messages as ticket_message_entity;
pub use tickets as ticket_entity;
pub use user_subscriptions as user_subscription_entity;
pub use users as user_entity;

pub use payments::{PaymentKind, PaymentMethod, PaymentStatus};
pub use promocodes::PromocodeKind;
pub use referral_earnings::ReferralEarningKind;
pub use tickets::{TicketPriority, TicketStatus};
