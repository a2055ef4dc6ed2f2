use crate::config::Config;
use crate::entities::{
    PaymentKind, PaymentMethod, ReferralEarningKind, referral_earning_entity as earnings,
    referral_program_entity as programs, user_entity as users,
};
use crate::error::AppResult;
use crate::models::{
    PaginatedResponse, PaginationParams, ReferralEntry, ReferralNotification, ReferralStats,
};
use crate::services::ledger::{self, LedgerEntry};
use crate::utils::format_money;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReferralService {
    pool: DatabaseConnection,
    config: Arc<Config>,
}

impl ReferralService {
    pub fn new(pool: DatabaseConnection, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    /// Pays referral rewards for a completed top-up, inside the top-up transaction.
    ///
    /// - first qualifying top-up: `first_reward` to the referrer and
    ///   `referred_bonus` to the invited user, once per invited user
    /// - every top-up: `commission_percent` of the amount to the referrer
    ///
    /// Returns the messages to send once the transaction is committed.
    pub async fn on_topup<C: ConnectionTrait>(
        &self,
        db: &C,
        referred_user_id: i32,
        amount: i64,
        payment_id: i32,
    ) -> AppResult<Vec<ReferralNotification>> {
        let Some(program) = programs::Entity::find()
            .filter(programs::Column::ReferredId.eq(referred_user_id))
            .one(db)
            .await?
        else {
            return Ok(Vec::new());
        };

        let referrer = users::Entity::find_by_id(program.referrer_id).one(db).await?;
        let referred = users::Entity::find_by_id(referred_user_id).one(db).await?;
        let (Some(referrer), Some(referred)) = (referrer, referred) else {
            log::warn!(
                "Referral program {} points to a missing user, skipping rewards",
                program.id
            );
            return Ok(Vec::new());
        };

        let rules = &self.config.referral;
        let mut notifications = Vec::new();
        let mut earned_by_referrer = 0i64;
        let mut first_paid_now = false;

        if !program.first_reward_paid && amount >= rules.min_topup_for_first_reward {
            first_paid_now = true;
            if rules.first_reward > 0 {
                self.credit(
                    db,
                    referrer.id,
                    &program,
                    rules.first_reward,
                    ReferralEarningKind::FirstReward,
                    payment_id,
                )
                .await?;
                earned_by_referrer += rules.first_reward;
                notifications.push(ReferralNotification {
                    telegram_id: referrer.telegram_id,
                    text: format!(
                        "🎉 Ваш друг {} пополнил баланс. Вам начислено {} за приглашение!",
                        referred.display_name(),
                        format_money(rules.first_reward)
                    ),
                });
            }
            if rules.referred_bonus > 0 {
                self.credit(
                    db,
                    referred.id,
                    &program,
                    rules.referred_bonus,
                    ReferralEarningKind::ReferredBonus,
                    payment_id,
                )
                .await?;
                notifications.push(ReferralNotification {
                    telegram_id: referred.telegram_id,
                    text: format!(
                        "🎁 Бонус за регистрацию по приглашению: {} на баланс",
                        format_money(rules.referred_bonus)
                    ),
                });
            }
        }

        let commission = amount * rules.commission_percent / 100;
        if commission > 0 {
            self.credit(
                db,
                referrer.id,
                &program,
                commission,
                ReferralEarningKind::Commission,
                payment_id,
            )
            .await?;
            earned_by_referrer += commission;
            notifications.push(ReferralNotification {
                telegram_id: referrer.telegram_id,
                text: format!(
                    "💰 Реферальное начисление {} ({}% от пополнения {})",
                    format_money(commission),
                    rules.commission_percent,
                    referred.display_name()
                ),
            });
        }

        if first_paid_now || earned_by_referrer > 0 {
            let total_earned = program.total_earned + earned_by_referrer;
            let mut am = program.into_active_model();
            if first_paid_now {
                am.first_reward_paid = Set(true);
            }
            am.total_earned = Set(total_earned);
            am.update(db).await?;
        }

        if earned_by_referrer > 0 {
            log::info!(
                "Referral rewards for user {}: {} from top-up of user {}",
                referrer.id,
                earned_by_referrer,
                referred_user_id
            );
        }
        Ok(notifications)
    }

    /// Ledger credit plus the matching earnings row. For `ReferredBonus` the
    /// credit goes to the invited user; the row still keys on the referrer.
    async fn credit<C: ConnectionTrait>(
        &self,
        db: &C,
        recipient_id: i32,
        program: &programs::Model,
        amount: i64,
        kind: ReferralEarningKind,
        payment_id: i32,
    ) -> AppResult<()> {
        let description = match kind {
            ReferralEarningKind::FirstReward => "Награда за приглашённого друга",
            ReferralEarningKind::Commission => "Реферальная комиссия",
            ReferralEarningKind::ReferredBonus => "Бонус за регистрацию по приглашению",
        };
        ledger::apply(
            db,
            LedgerEntry::new(
                recipient_id,
                amount,
                PaymentKind::ReferralReward,
                PaymentMethod::Referral,
            )
            .description(description),
        )
        .await?;

        earnings::ActiveModel {
            referrer_id: Set(program.referrer_id),
            referred_id: Set(program.referred_id),
            amount: Set(amount),
            kind: Set(kind),
            payment_id: Set(Some(payment_id)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(())
    }

    pub async fn stats(&self, user: &users::Model) -> AppResult<ReferralStats> {
        let base = programs::Entity::find().filter(programs::Column::ReferrerId.eq(user.id));
        let invited = base.clone().count(&self.pool).await?;
        let paid_referrals = base
            .clone()
            .filter(programs::Column::FirstRewardPaid.eq(true))
            .count(&self.pool)
            .await?;
        let total_earned = base
            .select_only()
            .column_as(
                Expr::cust("CAST(COALESCE(SUM(total_earned), 0) AS BIGINT)"),
                "total",
            )
            .into_tuple::<i64>()
            .one(&self.pool)
            .await?
            .unwrap_or(0);

        Ok(ReferralStats {
            invited,
            paid_referrals,
            total_earned,
            referral_link: self.referral_link(&user.referral_code),
        })
    }

    pub fn referral_link(&self, referral_code: &str) -> String {
        let bot = self.config.bot.username.as_deref().unwrap_or("bot");
        format!("https://t.me/{bot}?start=ref_{referral_code}")
    }

    /// Credits received by `user_id` as a referrer
    pub async fn earnings(
        &self,
        user_id: i32,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<earnings::Model>> {
        let base = earnings::Entity::find()
            .filter(earnings::Column::ReferrerId.eq(user_id))
            .filter(earnings::Column::Kind.ne(ReferralEarningKind::ReferredBonus));
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(earnings::Column::CreatedAt)
            .order_by_desc(earnings::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    pub async fn referrals(
        &self,
        user_id: i32,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<ReferralEntry>> {
        let base = programs::Entity::find().filter(programs::Column::ReferrerId.eq(user_id));
        let total = base.clone().count(&self.pool).await?;
        let rows = base
            .order_by_desc(programs::Column::CreatedAt)
            .order_by_desc(programs::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;

        let ids: Vec<i32> = rows.iter().map(|p| p.referred_id).collect();
        let names: HashMap<i32, String> = users::Entity::find()
            .filter(users::Column::Id.is_in(ids))
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|u| (u.id, u.display_name()))
            .collect();

        let items = rows
            .into_iter()
            .map(|p| ReferralEntry {
                display_name: names
                    .get(&p.referred_id)
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", p.referred_id)),
                joined_at: p.created_at,
                earned: p.total_earned,
                first_reward_paid: p.first_reward_paid,
            })
            .collect();
        Ok(PaginatedResponse::new(items, params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TelegramProfile;
    use crate::services::test_support::*;

    async fn invited_pair(ctx: &TestContext) -> (users::Model, users::Model) {
        let referrer = seed_user(&ctx.pool, 300).await;
        let payload = format!("ref_{}", referrer.referral_code);
        let (referred, _) = ctx
            .services
            .users
            .get_or_create(&TelegramProfile::new(301), Some(&payload))
            .await
            .unwrap();
        (referrer, referred)
    }

    async fn balance(ctx: &TestContext, user_id: i32) -> i64 {
        ledger::current_balance(&ctx.pool, user_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_reward_and_commission() {
        let ctx = setup().await;
        let (referrer, referred) = invited_pair(&ctx).await;
        let payments = &ctx.services.payments;

        // defaults: min 100 ₽, first reward 100 ₽, bonus 50 ₽, commission 25%
        let outcome = payments
            .credit_topup(referred.id, 20_000, PaymentMethod::Admin, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.notifications.len(), 3);
        assert_eq!(balance(&ctx, referrer.id).await, 10_000 + 5_000);
        assert_eq!(balance(&ctx, referred.id).await, 20_000 + 5_000);

        // second top-up: commission only
        payments
            .credit_topup(referred.id, 10_000, PaymentMethod::Admin, None, None)
            .await
            .unwrap();
        assert_eq!(balance(&ctx, referrer.id).await, 15_000 + 2_500);

        let stats = ctx.services.referrals.stats(&referrer).await.unwrap();
        assert_eq!(stats.invited, 1);
        assert_eq!(stats.paid_referrals, 1);
        assert_eq!(stats.total_earned, 17_500);
        assert_eq!(
            stats.referral_link,
            format!("https://t.me/remna_shop_bot?start=ref_{}", referrer.referral_code)
        );

        let earned = ctx
            .services
            .referrals
            .earnings(referrer.id, &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(earned.pagination.total, 3);
    }

    #[tokio::test]
    async fn test_small_topup_gets_commission_but_no_first_reward() {
        let ctx = setup().await;
        let (referrer, referred) = invited_pair(&ctx).await;

        ctx.services
            .payments
            .credit_topup(referred.id, 4_000, PaymentMethod::Admin, None, None)
            .await
            .unwrap();
        assert_eq!(balance(&ctx, referrer.id).await, 1_000);
        assert_eq!(balance(&ctx, referred.id).await, 4_000);

        let list = ctx
            .services
            .referrals
            .referrals(referrer.id, &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(list.items.len(), 1);
        assert!(!list.items[0].first_reward_paid);
        assert_eq!(list.items[0].earned, 1_000);
    }

    #[tokio::test]
    async fn test_no_referrer_no_rewards() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 310).await;
        let outcome = ctx
            .services
            .payments
            .credit_topup(user.id, 50_000, PaymentMethod::Admin, None, None)
            .await
            .unwrap();
        assert!(outcome.notifications.is_empty());
        assert_eq!(outcome.new_balance, 50_000);
    }
}
