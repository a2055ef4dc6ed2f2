use crate::config::Config;
use crate::entities::{
    PaymentKind, PaymentMethod, PaymentStatus, payment_entity as payments,
    star_payment_entity as star_payments, user_entity as users,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    PaginatedResponse, PaginationParams, RevenueStats, StarsInvoice, SuccessfulStarPayment,
    TopupOutcome, TributeDonation, TributeOutcome, TributeWebhook,
};
use crate::services::ledger::{self, LedgerEntry};
use crate::services::{ReferralService, UserService};
use crate::utils::{format_money, verify_hmac_sha256_hex};
use chrono::{Datelike, TimeZone, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use std::sync::Arc;

pub const STARS_CURRENCY: &str = "XTR";
const TOPUP_PAYLOAD_PREFIX: &str = "topup";
const TRIBUTE_DONATION_EVENT: &str = "new_donation";

#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    config: Arc<Config>,
    users: UserService,
    referrals: ReferralService,
}

impl PaymentService {
    pub fn new(
        pool: DatabaseConnection,
        config: Arc<Config>,
        users: UserService,
        referrals: ReferralService,
    ) -> Self {
        Self {
            pool,
            config,
            users,
            referrals,
        }
    }

    pub async fn history(
        &self,
        user_id: i32,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<payments::Model>> {
        let base = payments::Entity::find().filter(payments::Column::UserId.eq(user_id));
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    /// Credits a top-up and pays referral rewards in one transaction.
    ///
    /// With an `external_id` the call is idempotent: a second delivery of the
    /// same provider payment returns the first ledger row with `duplicate` set.
    pub async fn credit_topup(
        &self,
        user_id: i32,
        amount: i64,
        method: PaymentMethod,
        external_id: Option<String>,
        description: Option<String>,
    ) -> AppResult<TopupOutcome> {
        if let Some(outcome) = self.already_credited(method, external_id.as_deref()).await? {
            return Ok(outcome);
        }

        let txn = self.pool.begin().await?;
        let outcome = match self
            .credit_topup_in(&txn, user_id, amount, method, external_id.clone(), description)
            .await
        {
            Ok(outcome) => txn.commit().await.map(|_| outcome).map_err(AppError::from),
            Err(e) => {
                txn.rollback().await?;
                Err(e)
            }
        };

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // the same payment delivered twice at once trips the unique index
                match self.already_credited(method, external_id.as_deref()).await? {
                    Some(duplicate) => Ok(duplicate),
                    None => Err(e),
                }
            }
        }
    }

    async fn credit_topup_in<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: i32,
        amount: i64,
        method: PaymentMethod,
        external_id: Option<String>,
        description: Option<String>,
    ) -> AppResult<TopupOutcome> {
        if amount <= 0 {
            return Err(AppError::ValidationError(
                "Сумма пополнения должна быть больше нуля".into(),
            ));
        }
        let mut entry = LedgerEntry::new(user_id, amount, PaymentKind::Topup, method)
            .description(description.unwrap_or_else(|| format!("Пополнение: {}", method.label())));
        if let Some(external_id) = external_id {
            entry = entry.external_id(external_id);
        }
        let (payment, _) = ledger::apply(db, entry).await?;
        let notifications = self
            .referrals
            .on_topup(db, user_id, amount, payment.id)
            .await?;
        // referral bonus may have changed the payer's balance too
        let new_balance = ledger::current_balance(db, user_id).await?;

        log::info!(
            "Top-up of {} for user {user_id} via {:?} (payment {})",
            format_money(amount),
            method,
            payment.id
        );
        Ok(TopupOutcome {
            payment,
            new_balance,
            notifications,
            duplicate: false,
        })
    }

    async fn already_credited(
        &self,
        method: PaymentMethod,
        external_id: Option<&str>,
    ) -> AppResult<Option<TopupOutcome>> {
        let Some(external_id) = external_id else {
            return Ok(None);
        };
        let Some(payment) = ledger::find_external(&self.pool, method, external_id).await? else {
            return Ok(None);
        };
        log::info!("Payment {method:?}/{external_id} was already credited, skipping");
        let new_balance = ledger::current_balance(&self.pool, payment.user_id).await?;
        Ok(Some(TopupOutcome {
            payment,
            new_balance,
            notifications: Vec::new(),
            duplicate: true,
        }))
    }

    /// Stars needed to credit `amount`, rounded up
    pub fn stars_for(&self, amount: i64) -> u32 {
        let rate = self.config.payments.stars_rate.max(1);
        u32::try_from((amount + rate - 1) / rate).unwrap_or(u32::MAX)
    }

    pub fn stars_invoice(&self, user_id: i32, amount: i64) -> AppResult<StarsInvoice> {
        if !self.config.payments.stars_enabled {
            return Err(AppError::ValidationError(
                "Оплата звёздами сейчас недоступна".into(),
            ));
        }
        self.check_topup_bounds(amount)?;
        Ok(StarsInvoice {
            title: "Пополнение баланса".to_string(),
            description: format!("Пополнение баланса на {}", format_money(amount)),
            payload: format!("{TOPUP_PAYLOAD_PREFIX}:{user_id}:{amount}"),
            stars: self.stars_for(amount),
            amount,
        })
    }

    fn check_topup_bounds(&self, amount: i64) -> AppResult<()> {
        let payments = &self.config.payments;
        if amount < payments.min_topup || amount > payments.max_topup {
            return Err(AppError::ValidationError(format!(
                "Сумма пополнения должна быть от {} до {}",
                format_money(payments.min_topup),
                format_money(payments.max_topup)
            )));
        }
        Ok(())
    }

    /// Checks an invoice payload before Telegram charges the user
    pub async fn validate_stars_payload(
        &self,
        telegram_id: i64,
        payload: &str,
    ) -> AppResult<(users::Model, i64)> {
        let (user_id, amount) = parse_topup_payload(payload)
            .ok_or_else(|| AppError::ValidationError("Некорректный счёт".into()))?;
        let user = self
            .users
            .find_by_telegram_id(telegram_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))?;
        if user.id != user_id {
            return Err(AppError::ValidationError(
                "Счёт выставлен другому пользователю".into(),
            ));
        }
        if user.is_banned {
            return Err(AppError::Forbidden);
        }
        self.check_topup_bounds(amount)?;
        Ok((user, amount))
    }

    /// Credits a completed Stars payment. Redelivery of the same charge id is a no-op.
    pub async fn process_star_payment(
        &self,
        payment: &SuccessfulStarPayment,
    ) -> AppResult<TopupOutcome> {
        if payment.currency != STARS_CURRENCY {
            return Err(AppError::ValidationError(format!(
                "Неожиданная валюта платежа: {}",
                payment.currency
            )));
        }
        let (user, amount) = self
            .validate_stars_payload(payment.telegram_id, &payment.invoice_payload)
            .await?;
        let expected = self.stars_for(amount);
        if payment.total_amount < expected {
            return Err(AppError::ValidationError(format!(
                "Оплачено {} ⭐ вместо {expected} ⭐",
                payment.total_amount
            )));
        }

        let charge_id = payment.telegram_payment_charge_id.clone();
        let seen = star_payments::Entity::find()
            .filter(star_payments::Column::TelegramPaymentChargeId.eq(charge_id.as_str()))
            .one(&self.pool)
            .await?;
        if seen.is_some() {
            if let Some(outcome) = self
                .already_credited(PaymentMethod::TelegramStars, Some(&charge_id))
                .await?
            {
                return Ok(outcome);
            }
        }

        let txn = self.pool.begin().await?;
        let result = async {
            let outcome = self
                .credit_topup_in(
                    &txn,
                    user.id,
                    amount,
                    PaymentMethod::TelegramStars,
                    Some(charge_id.clone()),
                    Some(format!("Telegram Stars: {} ⭐", payment.total_amount)),
                )
                .await?;
            star_payments::ActiveModel {
                user_id: Set(user.id),
                telegram_payment_charge_id: Set(charge_id.clone()),
                stars: Set(i32::try_from(payment.total_amount).unwrap_or(i32::MAX)),
                amount: Set(amount),
                payload: Set(payment.invoice_payload.clone()),
                payment_id: Set(Some(outcome.payment.id)),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            Ok::<_, AppError>(outcome)
        }
        .await;

        match result {
            Ok(outcome) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                txn.rollback().await?;
                match self
                    .already_credited(PaymentMethod::TelegramStars, Some(&charge_id))
                    .await?
                {
                    Some(duplicate) => Ok(duplicate),
                    None => Err(e),
                }
            }
        }
    }

    pub fn verify_tribute_signature(&self, body: &[u8], signature: Option<&str>) -> bool {
        match signature {
            Some(sig) => verify_hmac_sha256_hex(&self.config.payments.tribute_api_key, body, sig),
            None => false,
        }
    }

    /// Handles a verified Tribute webhook. Only `new_donation` credits the balance.
    pub async fn process_tribute(&self, webhook: TributeWebhook) -> AppResult<TributeOutcome> {
        if !self.config.payments.tribute_enabled {
            return Ok(TributeOutcome::Ignored("tribute disabled".into()));
        }
        if webhook.name != TRIBUTE_DONATION_EVENT {
            return Ok(TributeOutcome::Ignored(format!("event {}", webhook.name)));
        }
        let donation: TributeDonation = serde_json::from_value(webhook.payload)
            .map_err(|e| AppError::ValidationError(format!("invalid donation payload: {e}")))?;
        if donation.amount <= 0 {
            return Ok(TributeOutcome::Ignored("non-positive amount".into()));
        }

        let user = self
            .users
            .find_by_telegram_id(donation.telegram_user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "donor {} has never started the bot",
                    donation.telegram_user_id
                ))
            })?;

        // recurring donations reuse the request id
        let external_id = match webhook.created_at.as_deref().or(webhook.sent_at.as_deref()) {
            Some(at) => format!("{}:{at}", donation.donation_request_id),
            None => donation.donation_request_id.to_string(),
        };
        let description = match &donation.donation_name {
            Some(name) => format!("Tribute: {name}"),
            None => "Tribute".to_string(),
        };

        let outcome = self
            .credit_topup(
                user.id,
                donation.amount,
                PaymentMethod::Tribute,
                Some(external_id),
                Some(description),
            )
            .await?;
        if outcome.duplicate {
            return Ok(TributeOutcome::Duplicate);
        }
        Ok(TributeOutcome::Credited {
            telegram_id: user.telegram_id,
            amount: donation.amount,
            new_balance: outcome.new_balance,
            notifications: outcome.notifications,
        })
    }

    pub async fn revenue_stats(&self) -> AppResult<RevenueStats> {
        let now = Utc::now();
        let today = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now);
        let month = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        Ok(RevenueStats {
            total: sum_amount(topups(), &self.pool).await?,
            today: sum_amount(
                topups().filter(payments::Column::CreatedAt.gte(today)),
                &self.pool,
            )
            .await?,
            month: sum_amount(
                topups().filter(payments::Column::CreatedAt.gte(month)),
                &self.pool,
            )
            .await?,
            stars_total: sum_amount(
                topups().filter(payments::Column::Method.eq(PaymentMethod::TelegramStars)),
                &self.pool,
            )
            .await?,
            tribute_total: sum_amount(
                topups().filter(payments::Column::Method.eq(PaymentMethod::Tribute)),
                &self.pool,
            )
            .await?,
            topups_count: topups().count(&self.pool).await?,
        })
    }
}

/// Completed top-ups paid with real money
fn topups() -> Select<payments::Entity> {
    payments::Entity::find()
        .filter(payments::Column::Kind.eq(PaymentKind::Topup))
        .filter(payments::Column::Status.eq(PaymentStatus::Completed))
        .filter(
            Condition::any()
                .add(payments::Column::Method.eq(PaymentMethod::TelegramStars))
                .add(payments::Column::Method.eq(PaymentMethod::Tribute)),
        )
}

pub(crate) async fn sum_amount<C: ConnectionTrait>(
    query: Select<payments::Entity>,
    db: &C,
) -> AppResult<i64> {
    Ok(query
        .select_only()
        .column_as(Expr::cust("CAST(COALESCE(SUM(amount), 0) AS BIGINT)"), "total")
        .into_tuple::<i64>()
        .one(db)
        .await?
        .unwrap_or(0))
}

/// `topup:<user_id>:<amount>`
pub fn parse_topup_payload(payload: &str) -> Option<(i32, i64)> {
    let mut parts = payload.split(':');
    if parts.next()? != TOPUP_PAYLOAD_PREFIX {
        return None;
    }
    let user_id = parts.next()?.parse().ok()?;
    let amount = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((user_id, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;
    use crate::utils::hmac_sha256_hex;
    use serde_json::json;

    fn star_payment(
        telegram_id: i64,
        invoice: &StarsInvoice,
        charge_id: &str,
    ) -> SuccessfulStarPayment {
        SuccessfulStarPayment {
            telegram_id,
            telegram_payment_charge_id: charge_id.to_string(),
            total_amount: invoice.stars,
            currency: STARS_CURRENCY.to_string(),
            invoice_payload: invoice.payload.clone(),
        }
    }

    fn donation(request_id: i64, telegram_user_id: i64, amount: i64) -> TributeWebhook {
        TributeWebhook {
            name: "new_donation".into(),
            created_at: Some("2025-03-20T01:15:58.33246Z".into()),
            sent_at: None,
            payload: json!({
                "donation_request_id": request_id,
                "donation_name": "Support",
                "amount": amount,
                "currency": "rub",
                "telegram_user_id": telegram_user_id,
                "period": "once"
            }),
        }
    }

    #[test]
    fn test_parse_topup_payload() {
        assert_eq!(parse_topup_payload("topup:7:15000"), Some((7, 15_000)));
        assert_eq!(parse_topup_payload("topup:7"), None);
        assert_eq!(parse_topup_payload("topup:7:1:2"), None);
        assert_eq!(parse_topup_payload("gift:7:100"), None);
        assert_eq!(parse_topup_payload("topup:x:100"), None);
    }

    #[tokio::test]
    async fn test_stars_invoice_rounds_up() {
        let ctx = setup().await;
        let invoice = ctx.services.payments.stars_invoice(5, 10_000).unwrap();
        // 10000 / 130 = 76.9
        assert_eq!(invoice.stars, 77);
        assert_eq!(invoice.payload, "topup:5:10000");

        let err = ctx.services.payments.stars_invoice(5, 500).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_credit_topup_is_idempotent_per_external_id() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 400).await;
        let payments = &ctx.services.payments;

        let first = payments
            .credit_topup(user.id, 15_000, PaymentMethod::Tribute, Some("ext-1".into()), None)
            .await
            .unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.new_balance, 15_000);

        let second = payments
            .credit_topup(user.id, 15_000, PaymentMethod::Tribute, Some("ext-1".into()), None)
            .await
            .unwrap();
        assert!(second.duplicate);
        assert_eq!(second.payment.id, first.payment.id);
        assert_eq!(second.new_balance, 15_000);

        let history = payments
            .history(user.id, &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(history.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_star_payment_credits_once() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 401).await;
        let payments = &ctx.services.payments;
        let invoice = payments.stars_invoice(user.id, 20_000).unwrap();

        payments
            .validate_stars_payload(401, &invoice.payload)
            .await
            .unwrap();
        let paid = star_payment(401, &invoice, "charge-1");
        let outcome = payments.process_star_payment(&paid).await.unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(outcome.new_balance, 20_000);

        let again = payments.process_star_payment(&paid).await.unwrap();
        assert!(again.duplicate);
        assert_eq!(ledger::current_balance(&ctx.pool, user.id).await.unwrap(), 20_000);
        assert_eq!(star_payments::Entity::find().count(&ctx.pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_star_payment_rejects_foreign_or_underpaid_invoice() {
        let ctx = setup().await;
        let owner = seed_user(&ctx.pool, 402).await;
        seed_user(&ctx.pool, 403).await;
        let payments = &ctx.services.payments;
        let invoice = payments.stars_invoice(owner.id, 20_000).unwrap();

        let foreign = star_payment(403, &invoice, "charge-2");
        assert!(payments.process_star_payment(&foreign).await.is_err());

        let mut underpaid = star_payment(402, &invoice, "charge-3");
        underpaid.total_amount = invoice.stars - 1;
        assert!(payments.process_star_payment(&underpaid).await.is_err());

        let mut wrong_currency = star_payment(402, &invoice, "charge-4");
        wrong_currency.currency = "USD".into();
        assert!(payments.process_star_payment(&wrong_currency).await.is_err());

        assert_eq!(ledger::current_balance(&ctx.pool, owner.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tribute_signature() {
        let ctx = setup().await;
        let body = br#"{"name":"new_donation"}"#;
        let sig = hmac_sha256_hex("tribute-secret", body);
        let payments = &ctx.services.payments;
        assert!(payments.verify_tribute_signature(body, Some(&sig)));
        assert!(!payments.verify_tribute_signature(body, Some("00ff")));
        assert!(!payments.verify_tribute_signature(body, None));
    }

    #[tokio::test]
    async fn test_tribute_donation_credits_and_deduplicates() {
        let ctx = setup().await;
        seed_user(&ctx.pool, 404).await;
        let payments = &ctx.services.payments;

        let outcome = payments.process_tribute(donation(77, 404, 30_000)).await.unwrap();
        match outcome {
            TributeOutcome::Credited {
                telegram_id,
                amount,
                new_balance,
                ..
            } => {
                assert_eq!(telegram_id, 404);
                assert_eq!(amount, 30_000);
                assert_eq!(new_balance, 30_000);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let again = payments.process_tribute(donation(77, 404, 30_000)).await.unwrap();
        assert_eq!(again, TributeOutcome::Duplicate);

        let mut renewal = donation(77, 404, 30_000);
        renewal.created_at = Some("2025-04-20T01:15:58.33246Z".into());
        assert!(matches!(
            payments.process_tribute(renewal).await.unwrap(),
            TributeOutcome::Credited { new_balance: 60_000, .. }
        ));
    }

    #[tokio::test]
    async fn test_tribute_ignores_other_events_and_rejects_unknown_donors() {
        let ctx = setup().await;
        let payments = &ctx.services.payments;

        let mut cancelled = donation(1, 405, 10_000);
        cancelled.name = "cancelled_subscription".into();
        assert!(matches!(
            payments.process_tribute(cancelled).await.unwrap(),
            TributeOutcome::Ignored(_)
        ));

        let err = payments.process_tribute(donation(2, 405, 10_000)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(ctx.services.users.find_by_telegram_id(405).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revenue_stats_count_only_real_money() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 406).await;
        let payments = &ctx.services.payments;
        payments
            .credit_topup(user.id, 10_000, PaymentMethod::Tribute, Some("t1".into()), None)
            .await
            .unwrap();
        payments
            .credit_topup(user.id, 13_000, PaymentMethod::TelegramStars, Some("s1".into()), None)
            .await
            .unwrap();
        ctx.services
            .users
            .add_balance(user.id, 99_000, None)
            .await
            .unwrap();

        let stats = payments.revenue_stats().await.unwrap();
        assert_eq!(stats.total, 23_000);
        assert_eq!(stats.today, 23_000);
        assert_eq!(stats.month, 23_000);
        assert_eq!(stats.stars_total, 13_000);
        assert_eq!(stats.tribute_total, 10_000);
        assert_eq!(stats.topups_count, 2);
    }
}
