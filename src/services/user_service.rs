use crate::config::Config;
use crate::entities::{
    PaymentKind, PaymentMethod, referral_program_entity as programs, user_entity as users,
};
use crate::error::{AppError, AppResult};
use crate::models::{PaginatedResponse, PaginationParams, TelegramProfile, parse_referral_payload};
use crate::services::ledger::{self, LedgerEntry};
use crate::utils::generate_unique_referral_code;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;

const SEARCH_LIMIT: u64 = 20;

#[derive(Clone)]
pub struct UserService {
    pool: DatabaseConnection,
    config: Arc<Config>,
}

impl UserService {
    pub fn new(pool: DatabaseConnection, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    /// Resolves the local user behind an update, creating it on first contact.
    ///
    /// Returns the user and whether it was created by this call. A `ref_<code>`
    /// payload only links a referrer when the user is created here.
    pub async fn get_or_create(
        &self,
        profile: &TelegramProfile,
        start_payload: Option<&str>,
    ) -> AppResult<(users::Model, bool)> {
        if let Some(existing) = self.find_by_telegram_id(profile.telegram_id).await? {
            let user = self.refresh_profile(existing, profile).await?;
            return Ok((user, false));
        }

        match self.create(profile, start_payload).await {
            Ok(user) => Ok((user, true)),
            Err(e) => {
                // two updates from a new user can race on the unique telegram_id
                if let Some(existing) = self.find_by_telegram_id(profile.telegram_id).await? {
                    log::debug!(
                        "User {} was created concurrently: {e}",
                        profile.telegram_id
                    );
                    Ok((existing, false))
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn create(
        &self,
        profile: &TelegramProfile,
        start_payload: Option<&str>,
    ) -> AppResult<users::Model> {
        let txn = self.pool.begin().await?;
        let now = Utc::now();

        let referrer = match parse_referral_payload(start_payload) {
            Some(code) => users::Entity::find()
                .filter(users::Column::ReferralCode.eq(code.as_str()))
                .one(&txn)
                .await?
                .filter(|r| r.telegram_id != profile.telegram_id),
            None => None,
        };

        let referral_code = generate_unique_referral_code(&txn).await?;
        let user = users::ActiveModel {
            telegram_id: Set(profile.telegram_id),
            username: Set(profile.username.clone()),
            first_name: Set(profile.first_name.clone()),
            last_name: Set(profile.last_name.clone()),
            language_code: Set(profile.language_code.clone()),
            balance: Set(0),
            referral_code: Set(referral_code),
            referred_by_id: Set(referrer.as_ref().map(|r| r.id)),
            is_banned: Set(false),
            has_had_trial: Set(false),
            remnawave_uuid: Set(None),
            last_activity: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if let Some(referrer) = &referrer {
            programs::ActiveModel {
                referrer_id: Set(referrer.id),
                referred_id: Set(user.id),
                first_reward_paid: Set(false),
                total_earned: Set(0),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        match &referrer {
            Some(r) => log::info!(
                "New user {} (id {}) invited by user {}",
                user.telegram_id,
                user.id,
                r.id
            ),
            None => log::info!("New user {} (id {})", user.telegram_id, user.id),
        }
        Ok(user)
    }

    async fn refresh_profile(
        &self,
        user: users::Model,
        profile: &TelegramProfile,
    ) -> AppResult<users::Model> {
        let mut am = user.clone().into_active_model();
        if user.username != profile.username {
            am.username = Set(profile.username.clone());
        }
        if profile.first_name.is_some() && user.first_name != profile.first_name {
            am.first_name = Set(profile.first_name.clone());
        }
        if user.last_name != profile.last_name {
            am.last_name = Set(profile.last_name.clone());
        }
        if profile.language_code.is_some() && user.language_code != profile.language_code {
            am.language_code = Set(profile.language_code.clone());
        }
        am.last_activity = Set(Utc::now());
        Ok(am.update(&self.pool).await?)
    }

    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::TelegramId.eq(telegram_id))
            .one(&self.pool)
            .await?)
    }

    pub async fn find_by_id(&self, user_id: i32) -> AppResult<Option<users::Model>> {
        Ok(users::Entity::find_by_id(user_id).one(&self.pool).await?)
    }

    pub async fn get(&self, user_id: i32) -> AppResult<users::Model> {
        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))
    }

    /// Numeric queries match the telegram id or the local id, anything else
    /// is a username substring (a leading `@` is ignored).
    pub async fn search(&self, query: &str) -> AppResult<Vec<users::Model>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::ValidationError("Пустой запрос".into()));
        }

        let condition = if let Ok(number) = query.parse::<i64>() {
            let mut cond = Condition::any().add(users::Column::TelegramId.eq(number));
            if let Ok(id) = i32::try_from(number) {
                cond = cond.add(users::Column::Id.eq(id));
            }
            cond
        } else {
            let name = query.trim_start_matches('@');
            Condition::any()
                .add(users::Column::Username.contains(name))
                .add(users::Column::FirstName.contains(name))
        };

        Ok(users::Entity::find()
            .filter(condition)
            .order_by_asc(users::Column::Id)
            .limit(SEARCH_LIMIT)
            .all(&self.pool)
            .await?)
    }

    pub async fn list_users(
        &self,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<users::Model>> {
        let base = users::Entity::find();
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(users::Column::CreatedAt)
            .order_by_desc(users::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    /// Admin balance adjustment. A debit larger than the balance is clamped so the
    /// balance lands on zero. Returns the new balance.
    pub async fn add_balance(
        &self,
        user_id: i32,
        amount: i64,
        description: Option<String>,
    ) -> AppResult<i64> {
        if amount == 0 {
            return Err(AppError::ValidationError("Сумма должна быть ненулевой".into()));
        }
        let txn = self.pool.begin().await?;
        let balance = ledger::current_balance(&txn, user_id).await?;
        let effective = if amount < 0 { amount.max(-balance) } else { amount };
        if effective == 0 {
            return Err(AppError::ValidationError("Баланс пользователя уже нулевой".into()));
        }

        let mut entry = LedgerEntry::new(
            user_id,
            effective,
            PaymentKind::AdminAdjustment,
            PaymentMethod::Admin,
        );
        entry.description = description.or_else(|| Some("Корректировка администратором".into()));
        let (_, new_balance) = ledger::apply(&txn, entry).await?;
        txn.commit().await?;

        log::info!("Admin balance change for user {user_id}: {effective:+}, now {new_balance}");
        Ok(new_balance)
    }

    pub async fn set_banned(&self, user_id: i32, banned: bool) -> AppResult<users::Model> {
        let user = self.get(user_id).await?;
        let mut am = user.into_active_model();
        am.is_banned = Set(banned);
        am.updated_at = Set(Utc::now());
        let user = am.update(&self.pool).await?;
        log::info!(
            "User {} {}",
            user.id,
            if banned { "banned" } else { "unbanned" }
        );
        Ok(user)
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.config.is_admin(telegram_id)
    }

    /// Telegram ids of every user who is not banned, for broadcasts
    pub async fn broadcast_targets(&self) -> AppResult<Vec<i64>> {
        Ok(users::Entity::find()
            .select_only()
            .column(users::Column::TelegramId)
            .filter(users::Column::IsBanned.eq(false))
            .into_tuple::<i64>()
            .all(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_user, seed_user_with_balance, setup};

    fn profile(tg: i64) -> TelegramProfile {
        TelegramProfile {
            telegram_id: tg,
            username: Some(format!("name{tg}")),
            first_name: Some("Ivan".into()),
            last_name: None,
            language_code: Some("ru".into()),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_creates_once_and_refreshes() {
        let ctx = setup().await;
        let svc = &ctx.services.users;

        let (user, created) = svc.get_or_create(&profile(10), None).await.unwrap();
        assert!(created);
        assert_eq!(user.balance, 0);
        assert_eq!(user.referral_code.len(), 8);

        let mut renamed = profile(10);
        renamed.username = Some("renamed".into());
        let (again, created) = svc.get_or_create(&renamed, None).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
        assert_eq!(again.username.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_referral_link_only_on_creation() {
        let ctx = setup().await;
        let svc = &ctx.services.users;
        let referrer = seed_user(&ctx.pool, 20).await;
        let payload = format!("ref_{}", referrer.referral_code.to_lowercase());

        let (user, _) = svc.get_or_create(&profile(21), Some(&payload)).await.unwrap();
        assert_eq!(user.referred_by_id, Some(referrer.id));
        let program = programs::Entity::find()
            .filter(programs::Column::ReferredId.eq(user.id))
            .one(&ctx.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(program.referrer_id, referrer.id);

        // an existing user never gets a referrer afterwards
        let other = seed_user(&ctx.pool, 22).await;
        let (same, created) = svc
            .get_or_create(&profile(22), Some(&payload))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(same.id, other.id);
        assert_eq!(same.referred_by_id, None);
    }

    #[tokio::test]
    async fn test_unknown_referral_code_is_ignored() {
        let ctx = setup().await;
        let (user, created) = ctx
            .services
            .users
            .get_or_create(&profile(30), Some("ref_NOPE"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(user.referred_by_id, None);
    }

    #[tokio::test]
    async fn test_search_by_id_and_username() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 777_000).await;

        let found = ctx.services.users.search("777000").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, user.id);

        let found = ctx.services.users.search("@user777").await.unwrap();
        assert_eq!(found.len(), 1);

        assert!(ctx.services.users.search("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_add_balance_never_goes_negative() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 40, 1_000).await;
        let svc = &ctx.services.users;

        assert_eq!(svc.add_balance(user.id, 500, None).await.unwrap(), 1_500);
        assert_eq!(svc.add_balance(user.id, -5_000, None).await.unwrap(), 0);
        assert!(matches!(
            svc.add_balance(user.id, -1, None).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_ban() {
        let ctx = setup().await;
        for tg in 50..55 {
            seed_user(&ctx.pool, tg).await;
        }
        let page = ctx
            .services
            .users
            .list_users(&PaginationParams::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);

        let banned = ctx
            .services
            .users
            .set_banned(page.items[0].id, true)
            .await
            .unwrap();
        assert!(banned.is_banned);
        assert_eq!(ctx.services.users.broadcast_targets().await.unwrap().len(), 4);
        assert!(ctx.services.users.is_admin(1));
    }
}
