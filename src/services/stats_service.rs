use crate::entities::{
    TicketStatus, ticket_entity as tickets, user_entity as users,
    user_subscription_entity as user_subs,
};
use crate::error::AppResult;
use crate::models::DashboardStats;
use crate::services::PaymentService;
use chrono::{Datelike, TimeZone, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

#[derive(Clone)]
pub struct StatsService {
    pool: DatabaseConnection,
    payments: PaymentService,
}

impl StatsService {
    pub fn new(pool: DatabaseConnection, payments: PaymentService) -> Self {
        Self { pool, payments }
    }

    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        let now = Utc::now();
        let today = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now);

        let users_total = users::Entity::find().count(&self.pool).await?;
        let users_new_today = users::Entity::find()
            .filter(users::Column::CreatedAt.gte(today))
            .count(&self.pool)
            .await?;
        let users_banned = users::Entity::find()
            .filter(users::Column::IsBanned.eq(true))
            .count(&self.pool)
            .await?;

        let active = user_subs::Entity::find()
            .filter(user_subs::Column::IsActive.eq(true))
            .filter(user_subs::Column::ExpiresAt.gt(now));
        let active_subscriptions = active.clone().count(&self.pool).await?;
        let trial_subscriptions = active
            .filter(user_subs::Column::IsTrial.eq(true))
            .count(&self.pool)
            .await?;

        let open_tickets = tickets::Entity::find()
            .filter(tickets::Column::Status.eq(TicketStatus::Open))
            .count(&self.pool)
            .await?;
        let revenue = self.payments.revenue_stats().await?;

        Ok(DashboardStats {
            users_total,
            users_new_today,
            users_banned,
            active_subscriptions,
            trial_subscriptions,
            revenue_total: revenue.total,
            revenue_today: revenue.today,
            open_tickets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentMethod;
    use crate::services::test_support::*;

    #[tokio::test]
    async fn test_dashboard_counts() {
        let ctx = setup().await;
        let a = seed_user(&ctx.pool, 800).await;
        let b = seed_user_with_balance(&ctx.pool, 801, 50_000).await;
        ctx.services.users.set_banned(b.id, true).await.unwrap();

        ctx.services.subscriptions.activate_trial(a.id).await.unwrap();
        let plan = seed_plan(&ctx.pool, 20_000, 30).await;
        ctx.services.subscriptions.purchase(b.id, plan.id).await.unwrap();

        ctx.services
            .payments
            .credit_topup(a.id, 15_000, PaymentMethod::TelegramStars, Some("c-1".into()), None)
            .await
            .unwrap();
        ctx.services.tickets.create(a.id, "Вопрос", "текст").await.unwrap();

        let stats = ctx.services.stats.dashboard().await.unwrap();
        assert_eq!(stats.users_total, 2);
        assert_eq!(stats.users_new_today, 2);
        assert_eq!(stats.users_banned, 1);
        assert_eq!(stats.active_subscriptions, 2);
        assert_eq!(stats.trial_subscriptions, 1);
        assert_eq!(stats.revenue_total, 15_000);
        assert_eq!(stats.revenue_today, 15_000);
        assert_eq!(stats.open_tickets, 1);
    }
}
