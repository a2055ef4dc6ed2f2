use crate::config::Config;
use crate::entities::{
    PaymentKind, PaymentMethod, plan_entity as plans, user_entity as users,
    user_subscription_entity as user_subs,
};
use crate::error::{AppError, AppResult};
use crate::external::{CreatePanelUser, PanelApi, PanelUser, PanelUserStatus, UpdatePanelUser};
use crate::models::{NewPlan, PurchaseOutcome};
use crate::services::ledger::{self, LedgerEntry};
use crate::utils::{format_money, gb_to_bytes, join_uuid_list};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait, TryIntoModel,
};
use std::sync::Arc;

/// Term, traffic and squads to push to the panel for one user
struct PanelTerm {
    expires_at: DateTime<Utc>,
    traffic_limit_gb: i32,
    squads: Vec<String>,
}

/// Which local rows `panel_uuids` collects
#[derive(Debug, Clone, Copy)]
enum UuidScope {
    All,
    Active,
    Unexpired(DateTime<Utc>),
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: DatabaseConnection,
    config: Arc<Config>,
    panel: Arc<dyn PanelApi>,
}

impl SubscriptionService {
    pub fn new(pool: DatabaseConnection, config: Arc<Config>, panel: Arc<dyn PanelApi>) -> Self {
        Self {
            pool,
            config,
            panel,
        }
    }

    // -----------------------------
    // Plans
    // -----------------------------

    pub async fn list_active_plans(&self) -> AppResult<Vec<plans::Model>> {
        Ok(plans::Entity::find()
            .filter(plans::Column::IsActive.eq(true))
            .filter(plans::Column::IsTrial.eq(false))
            .order_by_asc(plans::Column::SortOrder)
            .order_by_asc(plans::Column::Price)
            .all(&self.pool)
            .await?)
    }

    pub async fn list_all_plans(&self) -> AppResult<Vec<plans::Model>> {
        Ok(plans::Entity::find()
            .order_by_asc(plans::Column::SortOrder)
            .order_by_asc(plans::Column::Id)
            .all(&self.pool)
            .await?)
    }

    pub async fn get_plan(&self, plan_id: i32) -> AppResult<plans::Model> {
        plans::Entity::find_by_id(plan_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Тариф не найден".into()))
    }

    pub async fn create_plan(&self, plan: NewPlan) -> AppResult<plans::Model> {
        let name = plan.name.trim();
        if name.is_empty() || name.chars().count() > 128 {
            return Err(AppError::ValidationError(
                "Название тарифа: от 1 до 128 символов".into(),
            ));
        }
        if plan.price <= 0 {
            return Err(AppError::ValidationError("Цена должна быть больше нуля".into()));
        }
        if plan.duration_days <= 0 {
            return Err(AppError::ValidationError(
                "Длительность должна быть больше нуля".into(),
            ));
        }
        if plan.traffic_limit_gb < 0 || plan.device_limit < 0 {
            return Err(AppError::ValidationError(
                "Лимиты не могут быть отрицательными".into(),
            ));
        }

        let now = Utc::now();
        let model = plans::ActiveModel {
            name: Set(name.to_string()),
            description: Set(plan.description.filter(|d| !d.trim().is_empty())),
            price: Set(plan.price),
            duration_days: Set(plan.duration_days),
            traffic_limit_gb: Set(plan.traffic_limit_gb),
            device_limit: Set(plan.device_limit),
            squad_uuids: Set(join_uuid_list(&plan.squad_uuids)),
            is_active: Set(true),
            is_trial: Set(false),
            sort_order: Set(plan.sort_order),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        log::info!("Plan created: {} ({})", model.name, model.id);
        Ok(model)
    }

    pub async fn set_plan_active(&self, plan_id: i32, active: bool) -> AppResult<plans::Model> {
        let plan = self.get_plan(plan_id).await?;
        let mut am = plan.into_active_model();
        am.is_active = Set(active);
        am.updated_at = Set(Utc::now());
        Ok(am.update(&self.pool).await?)
    }

    // -----------------------------
    // User subscriptions
    // -----------------------------

    pub async fn user_subscriptions(&self, user_id: i32) -> AppResult<Vec<user_subs::Model>> {
        Ok(user_subs::Entity::find()
            .filter(user_subs::Column::UserId.eq(user_id))
            .order_by_desc(user_subs::Column::ExpiresAt)
            .all(&self.pool)
            .await?)
    }

    pub async fn active_subscription(&self, user_id: i32) -> AppResult<Option<user_subs::Model>> {
        active_subscription_in(&self.pool, user_id, Utc::now()).await
    }

    /// One free trial per user, only while the user has nothing active
    pub async fn activate_trial(&self, user_id: i32) -> AppResult<user_subs::Model> {
        let trial = &self.config.trial;
        if !trial.enabled {
            return Err(AppError::ValidationError(
                "Пробный период сейчас недоступен".into(),
            ));
        }

        let txn = self.pool.begin().await?;
        if !claim_trial(&txn, user_id).await? {
            find_user(&txn, user_id).await?;
            return Err(AppError::ValidationError(
                "Пробный период уже был использован".into(),
            ));
        }
        let user = find_user(&txn, user_id).await?;
        let now = Utc::now();
        if active_subscription_in(&txn, user_id, now).await?.is_some() {
            return Err(AppError::ValidationError(
                "У вас уже есть активная подписка".into(),
            ));
        }

        let squads = if trial.squad_uuids.is_empty() {
            self.config.remnawave.default_squad_uuids.clone()
        } else {
            trial.squad_uuids.clone()
        };
        let term = PanelTerm {
            expires_at: now + Duration::days(trial.duration_days),
            traffic_limit_gb: trial.traffic_limit_gb,
            squads,
        };
        let existing = latest_subscription_in(&txn, user_id).await?;
        let panel_user = self
            .push_to_panel(&user, existing.as_ref(), &term)
            .await?;

        let sub = save_subscription(&txn, user_id, existing, None, &term, &panel_user, true).await?;

        let mut am = user.into_active_model();
        am.remnawave_uuid = Set(Some(panel_user.uuid.clone()));
        am.updated_at = Set(now);
        am.update(&txn).await?;

        txn.commit().await?;
        log::info!("Trial activated for user {user_id} until {}", sub.expires_at);
        Ok(sub)
    }

    /// Buys `plan_id` from the balance.
    ///
    /// Runs in one transaction: debit, ledger row, panel create or extend, local
    /// row. Any failure, including the panel call, rolls the debit back.
    pub async fn purchase(&self, user_id: i32, plan_id: i32) -> AppResult<PurchaseOutcome> {
        let plan = self.get_plan(plan_id).await?;
        if !plan.is_active {
            return Err(AppError::ValidationError("Тариф недоступен для покупки".into()));
        }

        let txn = self.pool.begin().await?;
        let user = find_user(&txn, user_id).await?;
        if user.balance < plan.price {
            return Err(AppError::InsufficientBalance {
                required: plan.price,
                available: user.balance,
            });
        }

        let (_, new_balance) = ledger::apply(
            &txn,
            LedgerEntry::new(
                user_id,
                -plan.price,
                PaymentKind::SubscriptionPurchase,
                PaymentMethod::Balance,
            )
            .description(format!("Подписка «{}»", plan.name)),
        )
        .await?;

        let now = Utc::now();
        let existing = latest_subscription_in(&txn, user_id).await?;
        let extended = existing
            .as_ref()
            .is_some_and(|s| s.is_active && !s.is_expired_at(now));
        let start = existing
            .as_ref()
            .filter(|_| extended)
            .map(|s| s.expires_at.max(now))
            .unwrap_or(now);

        let squads = match plan.squads() {
            s if s.is_empty() => self.config.remnawave.default_squad_uuids.clone(),
            s => s,
        };
        let term = PanelTerm {
            expires_at: start + Duration::days(i64::from(plan.duration_days)),
            traffic_limit_gb: plan.traffic_limit_gb,
            squads,
        };

        let panel_user = self
            .push_to_panel(&user, existing.as_ref(), &term)
            .await?;
        let subscription = save_subscription(
            &txn,
            user_id,
            existing,
            Some(plan.id),
            &term,
            &panel_user,
            false,
        )
        .await?;

        if user.remnawave_uuid.as_deref() != Some(panel_user.uuid.as_str()) {
            let mut am = user.into_active_model();
            am.remnawave_uuid = Set(Some(panel_user.uuid.clone()));
            am.updated_at = Set(now);
            am.update(&txn).await?;
        }

        txn.commit().await?;
        log::info!(
            "User {user_id} bought plan {} for {}, active until {}",
            plan.id,
            format_money(plan.price),
            subscription.expires_at
        );

        Ok(PurchaseOutcome {
            plan,
            subscription,
            new_balance,
            extended,
        })
    }

    /// Adds days to the user's latest subscription (promocodes, gifts)
    pub async fn extend_days(&self, user_id: i32, days: i64) -> AppResult<user_subs::Model> {
        let txn = self.pool.begin().await?;
        let sub = self.extend_days_in(&txn, user_id, days).await?;
        txn.commit().await?;
        Ok(sub)
    }

    /// Same as `extend_days` inside a caller's transaction
    pub async fn extend_days_in<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: i32,
        days: i64,
    ) -> AppResult<user_subs::Model> {
        if days <= 0 {
            return Err(AppError::ValidationError(
                "Количество дней должно быть больше нуля".into(),
            ));
        }
        let user = find_user(db, user_id).await?;
        let existing = latest_subscription_in(db, user_id).await?.ok_or_else(|| {
            AppError::NotFound("У вас нет подписки, которую можно продлить".into())
        })?;

        let now = Utc::now();
        let start = if existing.is_active {
            existing.expires_at.max(now)
        } else {
            now
        };
        let term = PanelTerm {
            expires_at: start + Duration::days(days),
            traffic_limit_gb: existing.traffic_limit_gb,
            squads: crate::utils::split_uuid_list(existing.squad_uuids.as_deref()),
        };
        let panel_user = self.push_to_panel(&user, Some(&existing), &term).await?;
        let subscription_id = existing.subscription_id;
        let is_trial = existing.is_trial;
        let sub = save_subscription(
            db,
            user_id,
            Some(existing),
            subscription_id,
            &term,
            &panel_user,
            is_trial,
        )
        .await?;
        log::info!("Subscription of user {user_id} extended by {days} days");
        Ok(sub)
    }

    /// Flips `is_active` for rows past their expiry and returns them
    pub async fn deactivate_expired(&self) -> AppResult<Vec<user_subs::Model>> {
        let now = Utc::now();
        let expired = user_subs::Entity::find()
            .filter(user_subs::Column::IsActive.eq(true))
            .filter(user_subs::Column::ExpiresAt.lte(now))
            .all(&self.pool)
            .await?;
        if expired.is_empty() {
            return Ok(expired);
        }

        let ids: Vec<i32> = expired.iter().map(|s| s.id).collect();
        user_subs::Entity::update_many()
            .col_expr(user_subs::Column::IsActive, Expr::value(false))
            .col_expr(user_subs::Column::UpdatedAt, Expr::value(now))
            .filter(user_subs::Column::Id.is_in(ids))
            .exec(&self.pool)
            .await?;

        log::info!("Deactivated {} expired subscriptions", expired.len());
        Ok(expired
            .into_iter()
            .map(|mut s| {
                s.is_active = false;
                s.updated_at = now;
                s
            })
            .collect())
    }

    /// Active rows expiring within `hours` that were not reminded about yet
    pub async fn expiring_within(&self, hours: i64) -> AppResult<Vec<user_subs::Model>> {
        let now = Utc::now();
        Ok(user_subs::Entity::find()
            .filter(user_subs::Column::IsActive.eq(true))
            .filter(user_subs::Column::ExpiryNotified.eq(false))
            .filter(user_subs::Column::ExpiresAt.gt(now))
            .filter(user_subs::Column::ExpiresAt.lte(now + Duration::hours(hours)))
            .order_by_asc(user_subs::Column::ExpiresAt)
            .all(&self.pool)
            .await?)
    }

    pub async fn mark_expiry_notified(&self, subscription_id: i32) -> AppResult<()> {
        user_subs::Entity::update_many()
            .col_expr(user_subs::Column::ExpiryNotified, Expr::value(true))
            .filter(user_subs::Column::Id.eq(subscription_id))
            .exec(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------
    // Admin actions
    // -----------------------------

    /// Disabling touches the panel users behind active rows. Enabling touches
    /// every row with an unexpired term, since a sync during a ban leaves
    /// those rows inactive, and marks them active again.
    /// Returns how many panel users were switched.
    pub async fn set_panel_access(&self, user_id: i32, enabled: bool) -> AppResult<usize> {
        let now = Utc::now();
        let scope = if enabled {
            UuidScope::Unexpired(now)
        } else {
            UuidScope::Active
        };
        let mut uuids = Vec::new();
        for uuid in self.panel_uuids(user_id, scope).await? {
            if enabled {
                // revoked rows keep their term but have no panel user
                if self.panel.get_user_by_uuid(&uuid).await?.is_none() {
                    continue;
                }
                self.panel.enable_user(&uuid).await?;
            } else {
                self.panel.disable_user(&uuid).await?;
            }
            uuids.push(uuid);
        }
        if enabled && !uuids.is_empty() {
            user_subs::Entity::update_many()
                .col_expr(user_subs::Column::IsActive, Expr::value(true))
                .col_expr(user_subs::Column::UpdatedAt, Expr::value(now))
                .filter(user_subs::Column::UserId.eq(user_id))
                .filter(user_subs::Column::RemnawaveUuid.is_in(uuids.clone()))
                .filter(user_subs::Column::ExpiresAt.gt(now))
                .exec(&self.pool)
                .await?;
        }
        log::info!(
            "Panel access of user {user_id} set to {enabled} ({} panel users)",
            uuids.len()
        );
        Ok(uuids.len())
    }

    pub async fn reset_traffic(&self, user_id: i32) -> AppResult<()> {
        let uuid = self
            .active_subscription(user_id)
            .await?
            .and_then(|s| s.remnawave_uuid)
            .ok_or_else(|| AppError::NotFound("Нет активной подписки в панели".into()))?;
        self.panel.reset_user_traffic(&uuid).await?;
        log::info!("Traffic of panel user {uuid} (user {user_id}) reset");
        Ok(())
    }

    /// Deletes the user's panel accounts and deactivates every local row.
    /// Returns the number of deactivated subscriptions.
    pub async fn revoke(&self, user_id: i32) -> AppResult<u64> {
        for uuid in self.panel_uuids(user_id, UuidScope::All).await? {
            self.panel.delete_user(&uuid).await?;
        }
        let now = Utc::now();
        let res = user_subs::Entity::update_many()
            .col_expr(user_subs::Column::IsActive, Expr::value(false))
            .col_expr(user_subs::Column::UpdatedAt, Expr::value(now))
            .filter(user_subs::Column::UserId.eq(user_id))
            .filter(user_subs::Column::IsActive.eq(true))
            .exec(&self.pool)
            .await?;
        users::Entity::update_many()
            .col_expr(users::Column::RemnawaveUuid, Expr::value(Option::<String>::None))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.pool)
            .await?;
        log::info!(
            "Subscriptions of user {user_id} revoked ({} rows deactivated)",
            res.rows_affected
        );
        Ok(res.rows_affected)
    }

    async fn panel_uuids(&self, user_id: i32, scope: UuidScope) -> AppResult<Vec<String>> {
        let mut query = user_subs::Entity::find()
            .filter(user_subs::Column::UserId.eq(user_id))
            .filter(user_subs::Column::RemnawaveUuid.is_not_null());
        query = match scope {
            UuidScope::All => query,
            UuidScope::Active => query.filter(user_subs::Column::IsActive.eq(true)),
            UuidScope::Unexpired(now) => query.filter(user_subs::Column::ExpiresAt.gt(now)),
        };
        let mut uuids: Vec<String> = query
            .all(&self.pool)
            .await?
            .into_iter()
            .filter_map(|s| s.remnawave_uuid)
            .collect();
        uuids.sort();
        uuids.dedup();
        Ok(uuids)
    }

    /// Creates the panel user or pushes the new term to the existing one
    async fn push_to_panel(
        &self,
        user: &users::Model,
        existing: Option<&user_subs::Model>,
        term: &PanelTerm,
    ) -> AppResult<PanelUser> {
        let known_uuid = existing
            .and_then(|s| s.remnawave_uuid.clone())
            .or_else(|| user.remnawave_uuid.clone());

        if let Some(uuid) = known_uuid
            && self.panel.get_user_by_uuid(&uuid).await?.is_some()
        {
            return self
                .panel
                .update_user(&UpdatePanelUser {
                    uuid,
                    status: Some(PanelUserStatus::Active),
                    expire_at: Some(term.expires_at),
                    traffic_limit_bytes: Some(gb_to_bytes(term.traffic_limit_gb)),
                    active_internal_squads: Some(term.squads.clone()),
                    telegram_id: Some(user.telegram_id),
                })
                .await;
        }

        self.panel
            .create_user(&CreatePanelUser {
                username: format!(
                    "{}_{}",
                    self.config.remnawave.username_prefix, user.telegram_id
                ),
                status: PanelUserStatus::Active,
                expire_at: term.expires_at,
                traffic_limit_bytes: gb_to_bytes(term.traffic_limit_gb),
                traffic_limit_strategy: "NO_RESET".to_string(),
                telegram_id: Some(user.telegram_id),
                active_internal_squads: term.squads.clone(),
                description: user.username.as_ref().map(|u| format!("@{u}")),
            })
            .await
    }
}

async fn find_user<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<users::Model> {
    users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))
}

/// Flips `has_had_trial` only if it is still false. Concurrent activations
/// block on the row lock and then see zero affected rows.
async fn claim_trial<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<bool> {
    let res = users::Entity::update_many()
        .col_expr(users::Column::HasHadTrial, Expr::value(true))
        .filter(users::Column::Id.eq(user_id))
        .filter(users::Column::HasHadTrial.eq(false))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}

pub(crate) async fn active_subscription_in<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    now: DateTime<Utc>,
) -> AppResult<Option<user_subs::Model>> {
    Ok(user_subs::Entity::find()
        .filter(user_subs::Column::UserId.eq(user_id))
        .filter(user_subs::Column::IsActive.eq(true))
        .filter(user_subs::Column::ExpiresAt.gt(now))
        .order_by_desc(user_subs::Column::ExpiresAt)
        .one(db)
        .await?)
}

async fn latest_subscription_in<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> AppResult<Option<user_subs::Model>> {
    Ok(user_subs::Entity::find()
        .filter(user_subs::Column::UserId.eq(user_id))
        .order_by_desc(user_subs::Column::IsActive)
        .order_by_desc(user_subs::Column::ExpiresAt)
        .one(db)
        .await?)
}

/// Updates `existing` in place or inserts a new row mirroring the panel user
async fn save_subscription<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    existing: Option<user_subs::Model>,
    subscription_id: Option<i32>,
    term: &PanelTerm,
    panel_user: &PanelUser,
    is_trial: bool,
) -> AppResult<user_subs::Model> {
    let now = Utc::now();
    let mut am = match existing {
        Some(row) => row.into_active_model(),
        None => user_subs::ActiveModel {
            user_id: Set(user_id),
            auto_renew: Set(false),
            created_at: Set(now),
            ..Default::default()
        },
    };
    am.subscription_id = Set(subscription_id);
    am.remnawave_uuid = Set(Some(panel_user.uuid.clone()));
    am.short_uuid = Set(panel_user.short_uuid.clone());
    am.subscription_url = Set(panel_user.subscription_url.clone());
    am.expires_at = Set(term.expires_at);
    am.traffic_limit_gb = Set(term.traffic_limit_gb);
    am.squad_uuids = Set(join_uuid_list(&term.squads));
    am.is_active = Set(true);
    am.is_trial = Set(is_trial);
    am.expiry_notified = Set(false);
    am.updated_at = Set(now);
    Ok(am.save(db).await?.try_into_model()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    #[tokio::test]
    async fn test_purchase_debits_and_creates_panel_user() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 100, 50_000).await;
        let plan = seed_plan(&ctx.pool, 19_900, 30).await;

        let outcome = ctx
            .services
            .subscriptions
            .purchase(user.id, plan.id)
            .await
            .unwrap();
        assert_eq!(outcome.new_balance, 30_100);
        assert!(!outcome.extended);
        let sub = outcome.subscription;
        assert!(sub.is_active);
        assert_eq!(sub.subscription_id, Some(plan.id));
        assert_eq!(sub.squad_uuids.as_deref(), Some("sq-default"));

        let panel_user = ctx.panel.get(sub.remnawave_uuid.as_deref().unwrap()).unwrap();
        assert_eq!(panel_user.username, "tg_100");
        assert_eq!(panel_user.telegram_id, Some(100));
        assert_eq!(panel_user.expire_at, sub.expires_at);
        assert_eq!(panel_user.traffic_limit_gb(), 100);
    }

    #[tokio::test]
    async fn test_second_purchase_extends_from_current_expiry() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 101, 100_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let svc = &ctx.services.subscriptions;

        let first = svc.purchase(user.id, plan.id).await.unwrap();
        let second = svc.purchase(user.id, plan.id).await.unwrap();
        assert!(second.extended);
        assert_eq!(second.subscription.id, first.subscription.id);
        assert_eq!(
            second.subscription.expires_at,
            first.subscription.expires_at + Duration::days(30)
        );
        assert_eq!(ctx.panel.len(), 1);
        assert_eq!(svc.user_subscriptions(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_changes_nothing() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 102, 100).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;

        let err = ctx
            .services
            .subscriptions
            .purchase(user.id, plan.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientBalance {
                required: 10_000,
                available: 100
            }
        ));
        assert_eq!(ctx.panel.len(), 0);
    }

    #[tokio::test]
    async fn test_panel_failure_rolls_back_debit() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 103, 50_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        ctx.panel.set_failing(true);

        let err = ctx
            .services
            .subscriptions
            .purchase(user.id, plan.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));

        let balance = ledger::current_balance(&ctx.pool, user.id).await.unwrap();
        assert_eq!(balance, 50_000);
        assert!(
            ctx.services
                .subscriptions
                .user_subscriptions(user.id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            crate::entities::payment_entity::Entity::find()
                .all(&ctx.pool)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_trial_only_once() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 104).await;
        let svc = &ctx.services.subscriptions;

        let trial = svc.activate_trial(user.id).await.unwrap();
        assert!(trial.is_trial);
        assert_eq!(trial.traffic_limit_gb, 10);
        assert!(matches!(
            svc.activate_trial(user.id).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_trial_claim_is_single_shot() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 111).await;
        let svc = &ctx.services.subscriptions;

        // another activation already flipped the flag
        assert!(claim_trial(&ctx.pool, user.id).await.unwrap());
        assert!(!claim_trial(&ctx.pool, user.id).await.unwrap());
        assert!(matches!(
            svc.activate_trial(user.id).await,
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(ctx.panel.len(), 0);
        assert!(matches!(
            svc.activate_trial(9_999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_trial_disabled() {
        let mut config = test_config();
        config.trial.enabled = false;
        let ctx = setup_with(config).await;
        let user = seed_user(&ctx.pool, 105).await;
        assert!(
            ctx.services
                .subscriptions
                .activate_trial(user.id)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_extend_days_requires_subscription() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 106).await;
        let svc = &ctx.services.subscriptions;
        assert!(matches!(
            svc.extend_days(user.id, 7).await,
            Err(AppError::NotFound(_))
        ));

        let trial = svc.activate_trial(user.id).await.unwrap();
        let extended = svc.extend_days(user.id, 7).await.unwrap();
        assert_eq!(extended.expires_at, trial.expires_at + Duration::days(7));
        assert!(extended.is_trial);
    }

    #[tokio::test]
    async fn test_deactivate_expired_and_reminders() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 107, 100_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let svc = &ctx.services.subscriptions;
        let sub = svc.purchase(user.id, plan.id).await.unwrap().subscription;

        // expiring in 10 hours
        let mut am = sub.clone().into_active_model();
        am.expires_at = Set(Utc::now() + Duration::hours(10));
        am.update(&ctx.pool).await.unwrap();
        let soon = svc.expiring_within(24).await.unwrap();
        assert_eq!(soon.len(), 1);
        svc.mark_expiry_notified(sub.id).await.unwrap();
        assert!(svc.expiring_within(24).await.unwrap().is_empty());

        let mut am = sub.into_active_model();
        am.expires_at = Set(Utc::now() - Duration::hours(1));
        am.update(&ctx.pool).await.unwrap();
        let expired = svc.deactivate_expired().await.unwrap();
        assert_eq!(expired.len(), 1);
        assert!(!expired[0].is_active);
        assert!(svc.active_subscription(user.id).await.unwrap().is_none());
        assert!(svc.deactivate_expired().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panel_access_and_revoke() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 108, 50_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let svc = &ctx.services.subscriptions;
        let sub = svc.purchase(user.id, plan.id).await.unwrap().subscription;
        let uuid = sub.remnawave_uuid.clone().unwrap();

        assert_eq!(svc.set_panel_access(user.id, false).await.unwrap(), 1);
        assert_eq!(ctx.panel.get(&uuid).unwrap().status, PanelUserStatus::Disabled);
        svc.set_panel_access(user.id, true).await.unwrap();
        assert_eq!(ctx.panel.get(&uuid).unwrap().status, PanelUserStatus::Active);

        svc.reset_traffic(user.id).await.unwrap();
        assert_eq!(ctx.panel.get(&uuid).unwrap().used_traffic_bytes, Some(0.0));

        assert_eq!(svc.revoke(user.id).await.unwrap(), 1);
        assert!(ctx.panel.get(&uuid).is_none());
        assert!(svc.active_subscription(user.id).await.unwrap().is_none());
        assert!(matches!(
            svc.reset_traffic(user.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unban_after_sync_restores_access() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 109, 50_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let svc = &ctx.services.subscriptions;
        let sub = svc.purchase(user.id, plan.id).await.unwrap().subscription;
        let uuid = sub.remnawave_uuid.clone().unwrap();

        ctx.services.users.set_banned(user.id, true).await.unwrap();
        assert_eq!(svc.set_panel_access(user.id, false).await.unwrap(), 1);
        let report = ctx.services.sync.sync_all().await.unwrap();
        assert_eq!(report.deactivated, 1);
        assert!(svc.active_subscription(user.id).await.unwrap().is_none());

        ctx.services.users.set_banned(user.id, false).await.unwrap();
        assert_eq!(svc.set_panel_access(user.id, true).await.unwrap(), 1);
        assert_eq!(ctx.panel.get(&uuid).unwrap().status, PanelUserStatus::Active);
        let active = svc.active_subscription(user.id).await.unwrap().unwrap();
        assert_eq!(active.id, sub.id);

        let report = ctx.services.sync.sync_all().await.unwrap();
        assert_eq!(report.deactivated, 0);
        assert!(svc.active_subscription(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_enable_skips_revoked_panel_users() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 110, 50_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let svc = &ctx.services.subscriptions;
        svc.purchase(user.id, plan.id).await.unwrap();

        svc.revoke(user.id).await.unwrap();
        assert_eq!(svc.set_panel_access(user.id, true).await.unwrap(), 0);
        assert!(svc.active_subscription(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_plan_validation() {
        let ctx = setup().await;
        let svc = &ctx.services.subscriptions;
        let bad = NewPlan {
            name: "Month".into(),
            price: 0,
            duration_days: 30,
            ..Default::default()
        };
        assert!(svc.create_plan(bad).await.is_err());

        let plan = svc
            .create_plan(NewPlan {
                name: "Month".into(),
                price: 19_900,
                duration_days: 30,
                squad_uuids: vec!["a".into(), "b".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plan.squads(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(svc.list_active_plans().await.unwrap().len(), 1);

        svc.set_plan_active(plan.id, false).await.unwrap();
        assert!(svc.list_active_plans().await.unwrap().is_empty());
        assert_eq!(svc.list_all_plans().await.unwrap().len(), 1);
    }
}
