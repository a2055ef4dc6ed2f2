pub mod ledger;
pub mod lucky_game_service;
pub mod payment_service;
pub mod promocode_service;
pub mod referral_service;
pub mod stats_service;
pub mod subscription_service;
pub mod sync_service;
pub mod ticket_service;
pub mod user_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use lucky_game_service::*;
pub use payment_service::*;
pub use promocode_service::*;
pub use referral_service::*;
pub use stats_service::*;
pub use subscription_service::*;
pub use sync_service::*;
pub use ticket_service::*;
pub use user_service::*;

use crate::config::Config;
use crate::database::DbPool;
use crate::external::PanelApi;
use std::sync::Arc;

/// Every service wired over one pool and one panel client. Cheap to clone.
#[derive(Clone)]
pub struct ServiceRegistry {
    pub config: Arc<Config>,
    pub panel: Arc<dyn PanelApi>,
    pub users: UserService,
    pub subscriptions: SubscriptionService,
    pub sync: SyncService,
    pub payments: PaymentService,
    pub referrals: ReferralService,
    pub promocodes: PromocodeService,
    pub tickets: TicketService,
    pub lucky_game: LuckyGameService,
    pub stats: StatsService,
}

impl ServiceRegistry {
    pub fn new(pool: DbPool, config: Arc<Config>, panel: Arc<dyn PanelApi>) -> Self {
        let users = UserService::new(pool.clone(), config.clone());
        let subscriptions = SubscriptionService::new(pool.clone(), config.clone(), panel.clone());
        let referrals = ReferralService::new(pool.clone(), config.clone());
        let payments = PaymentService::new(
            pool.clone(),
            config.clone(),
            users.clone(),
            referrals.clone(),
        );
        Self {
            sync: SyncService::new(pool.clone(), panel.clone()),
            promocodes: PromocodeService::new(pool.clone(), subscriptions.clone()),
            tickets: TicketService::new(pool.clone(), config.clone()),
            lucky_game: LuckyGameService::new(pool.clone(), config.clone()),
            stats: StatsService::new(pool, payments.clone()),
            config,
            panel,
            users,
            subscriptions,
            payments,
            referrals,
        }
    }
}
