pub mod common;
pub mod lucky_game;
pub mod payment;
pub mod promocode;
pub mod referral;
pub mod stats;
pub mod subscription;
pub mod ticket;
pub mod user;

pub use crate::utils::pagination::{PaginatedResponse, PaginationInfo, PaginationParams};
pub use common::*;
pub use lucky_game::*;
pub use payment::*;
pub use promocode::*;
pub use referral::*;
pub use stats::*;
pub use subscription::*;
pub use ticket::*;
pub use user::*;
