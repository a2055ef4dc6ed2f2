use crate::entities::{
    PaymentKind, PaymentMethod, PromocodeKind, promocode_entity as promocodes,
    promocode_usage_entity as usages,
};
use crate::error::{AppError, AppResult};
use crate::models::{NewPromocode, PaginatedResponse, PaginationParams, RedeemOutcome};
use crate::services::SubscriptionService;
use crate::services::ledger::{self, LedgerEntry};
use crate::utils::{format_money, normalize_promocode};
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

#[derive(Clone)]
pub struct PromocodeService {
    pool: DatabaseConnection,
    subscriptions: SubscriptionService,
}

impl PromocodeService {
    pub fn new(pool: DatabaseConnection, subscriptions: SubscriptionService) -> Self {
        Self {
            pool,
            subscriptions,
        }
    }

    pub async fn create(&self, new: NewPromocode) -> AppResult<promocodes::Model> {
        let code = normalize_promocode(&new.code)?;
        if new.value <= 0 {
            return Err(AppError::ValidationError(
                "Номинал промокода должен быть больше нуля".into(),
            ));
        }
        if new.max_uses < 0 {
            return Err(AppError::ValidationError(
                "Лимит активаций не может быть отрицательным".into(),
            ));
        }
        if new.valid_days.is_some_and(|d| d <= 0) {
            return Err(AppError::ValidationError(
                "Срок действия должен быть больше нуля".into(),
            ));
        }
        if self.find_by_code(&code).await?.is_some() {
            return Err(AppError::ValidationError(format!(
                "Промокод {code} уже существует"
            )));
        }

        let now = Utc::now();
        let promocode = promocodes::ActiveModel {
            code: Set(code),
            kind: Set(new.kind),
            value: Set(new.value),
            max_uses: Set(new.max_uses),
            current_uses: Set(0),
            valid_until: Set(new.valid_days.map(|d| now + Duration::days(d))),
            is_active: Set(true),
            created_by: Set(new.created_by),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!(
            "Promocode {} created ({:?}, value {}, max uses {})",
            promocode.code,
            promocode.kind,
            promocode.value,
            promocode.max_uses
        );
        Ok(promocode)
    }

    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<promocodes::Model>> {
        Ok(promocodes::Entity::find()
            .filter(promocodes::Column::Code.eq(code))
            .one(&self.pool)
            .await?)
    }

    pub async fn list(
        &self,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<promocodes::Model>> {
        let total = promocodes::Entity::find().count(&self.pool).await?;
        let items = promocodes::Entity::find()
            .order_by_desc(promocodes::Column::CreatedAt)
            .order_by_desc(promocodes::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    pub async fn deactivate(&self, promocode_id: i32) -> AppResult<promocodes::Model> {
        let promocode = promocodes::Entity::find_by_id(promocode_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Промокод не найден".into()))?;
        let mut am = promocode.into_active_model();
        am.is_active = Set(false);
        Ok(am.update(&self.pool).await?)
    }

    /// Applies a promocode for `user_id`.
    ///
    /// The use counter, the usage row and the reward share one transaction.
    /// The counter is bumped with a guarded UPDATE so the last free activation
    /// cannot be taken twice.
    pub async fn redeem(&self, user_id: i32, raw_code: &str) -> AppResult<RedeemOutcome> {
        let code = normalize_promocode(raw_code)
            .map_err(|_| AppError::NotFound("Промокод не найден".into()))?;
        let now = Utc::now();

        let txn = self.pool.begin().await?;
        let promocode = promocodes::Entity::find()
            .filter(promocodes::Column::Code.eq(code.as_str()))
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::NotFound("Промокод не найден".into()))?;
        if promocode.is_expired_at(now) {
            return Err(AppError::ValidationError("Срок действия промокода истёк".into()));
        }
        if promocode.is_exhausted() {
            return Err(AppError::ValidationError(
                "Промокод больше не действует: активации закончились".into(),
            ));
        }

        let used = usages::Entity::find()
            .filter(usages::Column::PromocodeId.eq(promocode.id))
            .filter(usages::Column::UserId.eq(user_id))
            .count(&txn)
            .await?;
        if used > 0 {
            return Err(AppError::ValidationError(
                "Вы уже активировали этот промокод".into(),
            ));
        }

        let bumped = promocodes::Entity::update_many()
            .col_expr(
                promocodes::Column::CurrentUses,
                Expr::col(promocodes::Column::CurrentUses).add(1),
            )
            .filter(promocodes::Column::Id.eq(promocode.id))
            .filter(
                Condition::any()
                    .add(promocodes::Column::MaxUses.eq(0))
                    .add(
                        Expr::col(promocodes::Column::CurrentUses)
                            .lt(Expr::col(promocodes::Column::MaxUses)),
                    ),
            )
            .exec(&txn)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(AppError::ValidationError(
                "Промокод больше не действует: активации закончились".into(),
            ));
        }

        usages::ActiveModel {
            promocode_id: Set(promocode.id),
            user_id: Set(user_id),
            used_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let outcome = match promocode.kind {
            PromocodeKind::Balance => {
                let (_, new_balance) = ledger::apply(
                    &txn,
                    LedgerEntry::new(
                        user_id,
                        promocode.value,
                        PaymentKind::Promocode,
                        PaymentMethod::Promocode,
                    )
                    .description(format!("Промокод {}", promocode.code)),
                )
                .await?;
                RedeemOutcome::BalanceCredited {
                    amount: promocode.value,
                    new_balance,
                }
            }
            PromocodeKind::SubscriptionDays => {
                let sub = self
                    .subscriptions
                    .extend_days_in(&txn, user_id, promocode.value)
                    .await?;
                RedeemOutcome::SubscriptionExtended {
                    days: promocode.value,
                    expires_at: sub.expires_at,
                }
            }
        };
        txn.commit().await?;

        match &outcome {
            RedeemOutcome::BalanceCredited { amount, .. } => log::info!(
                "User {user_id} redeemed {} for {}",
                promocode.code,
                format_money(*amount)
            ),
            RedeemOutcome::SubscriptionExtended { days, .. } => log::info!(
                "User {user_id} redeemed {} for {days} days",
                promocode.code
            ),
        }
        Ok(outcome)
    }
}
