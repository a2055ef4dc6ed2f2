use crate::config::{Config, LuckyPrize};
use crate::entities::{PaymentKind, PaymentMethod, lucky_game_entity as games, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::{LuckyGameResult, PaginatedResponse, PaginationParams};
use crate::services::ledger::{self, LedgerEntry};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;

/// Picks the prize whose cumulative basis-point window contains `roll`.
/// `roll` must be in `0..total`, where total is the sum of positive weights.
pub fn pick_prize(prizes: &[LuckyPrize], roll: i32) -> Option<&LuckyPrize> {
    let mut acc = 0;
    for prize in prizes.iter().filter(|p| p.probability_bp > 0) {
        acc += prize.probability_bp;
        if roll < acc {
            return Some(prize);
        }
    }
    None
}

fn total_weight(prizes: &[LuckyPrize]) -> i32 {
    prizes.iter().map(|p| p.probability_bp.max(0)).sum()
}

#[derive(Clone)]
pub struct LuckyGameService {
    pool: DatabaseConnection,
    config: Arc<Config>,
}

impl LuckyGameService {
    pub fn new(pool: DatabaseConnection, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    fn cooldown(&self) -> Duration {
        Duration::hours(self.config.lucky_game.cooldown_hours.max(0))
    }

    /// `None` when the user may play now, otherwise when the next play opens
    pub async fn can_play(&self, user_id: i32) -> AppResult<Option<DateTime<Utc>>> {
        next_play_at(&self.pool, user_id, self.cooldown(), Utc::now()).await
    }

    pub async fn play(&self, user_id: i32) -> AppResult<LuckyGameResult> {
        let settings = &self.config.lucky_game;
        if !settings.enabled {
            return Err(AppError::ValidationError("Игра сейчас недоступна".into()));
        }
        let total = total_weight(&settings.prizes);
        if total <= 0 {
            return Err(AppError::ConfigError("lucky game has no prizes".into()));
        }

        let now = Utc::now();
        let txn = self.pool.begin().await?;
        if let Some(next) = next_play_at(&txn, user_id, self.cooldown(), now).await? {
            return Err(cooldown_error(next));
        }
        if !claim_play(&txn, user_id, self.cooldown(), now).await? {
            log::debug!("Lucky game play of user {user_id} lost the race for the slot");
            return Err(cooldown_error(now + self.cooldown()));
        }

        let roll = rand::thread_rng().gen_range(0..total);
        let prize = pick_prize(&settings.prizes, roll)
            .ok_or_else(|| AppError::InternalError(format!("no prize for roll {roll}")))?;

        games::ActiveModel {
            user_id: Set(user_id),
            prize_name: Set(prize.name.clone()),
            reward: Set(prize.reward),
            played_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let new_balance = if prize.reward > 0 {
            ledger::apply(
                &txn,
                LedgerEntry::new(
                    user_id,
                    prize.reward,
                    PaymentKind::LuckyGame,
                    PaymentMethod::LuckyGame,
                )
                .description(format!("Выигрыш: {}", prize.name)),
            )
            .await?
            .1
        } else {
            ledger::current_balance(&txn, user_id).await?
        };
        txn.commit().await?;

        log::info!("User {user_id} played the lucky game: {} ({})", prize.name, prize.reward);
        Ok(LuckyGameResult {
            prize_name: prize.name.clone(),
            reward: prize.reward,
            new_balance,
            next_play_at: now + self.cooldown(),
        })
    }

    pub async fn history(
        &self,
        user_id: i32,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<games::Model>> {
        let base = games::Entity::find().filter(games::Column::UserId.eq(user_id));
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(games::Column::PlayedAt)
            .order_by_desc(games::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }
}

fn cooldown_error(next: DateTime<Utc>) -> AppError {
    AppError::ValidationError(format!(
        "Следующая попытка будет доступна {} UTC",
        next.format("%d.%m.%Y %H:%M")
    ))
}

/// Stamps `users.last_lucky_play_at` unless a play inside the cooldown already
/// did. The row lock taken by the update serialises concurrent plays.
async fn claim_play<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let res = users::Entity::update_many()
        .col_expr(users::Column::LastLuckyPlayAt, Expr::value(now))
        .filter(users::Column::Id.eq(user_id))
        .filter(
            Condition::any()
                .add(users::Column::LastLuckyPlayAt.is_null())
                .add(users::Column::LastLuckyPlayAt.lte(now - cooldown)),
        )
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}

async fn next_play_at<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> AppResult<Option<DateTime<Utc>>> {
    let last = games::Entity::find()
        .filter(games::Column::UserId.eq(user_id))
        .order_by_desc(games::Column::PlayedAt)
        .one(db)
        .await?;
    Ok(last
        .map(|g| g.played_at + cooldown)
        .filter(|next| *next > now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    fn prize(name: &str, reward: i64, probability_bp: i32) -> LuckyPrize {
        LuckyPrize {
            name: name.into(),
            reward,
            probability_bp,
        }
    }

    #[test]
    fn test_pick_prize_windows() {
        let prizes = vec![
            prize("nothing", 0, 6000),
            prize("small", 1_000, 3000),
            prize("disabled", 50_000, 0),
            prize("big", 10_000, 1000),
        ];
        assert_eq!(total_weight(&prizes), 10_000);
        assert_eq!(pick_prize(&prizes, 0).unwrap().name, "nothing");
        assert_eq!(pick_prize(&prizes, 5999).unwrap().name, "nothing");
        assert_eq!(pick_prize(&prizes, 6000).unwrap().name, "small");
        assert_eq!(pick_prize(&prizes, 9000).unwrap().name, "big");
        assert_eq!(pick_prize(&prizes, 9999).unwrap().name, "big");
        assert!(pick_prize(&prizes, 10_000).is_none());
    }

    #[tokio::test]
    async fn test_play_credits_and_enforces_cooldown() {
        let mut config = test_config();
        config.lucky_game.prizes = vec![prize("Всегда 5 ₽", 500, 10_000)];
        let ctx = setup_with(config).await;
        let user = seed_user(&ctx.pool, 700).await;
        let game = &ctx.services.lucky_game;

        assert!(game.can_play(user.id).await.unwrap().is_none());
        let result = game.play(user.id).await.unwrap();
        assert_eq!(result.reward, 500);
        assert_eq!(result.new_balance, 500);

        let next = game.can_play(user.id).await.unwrap().unwrap();
        assert!(next > Utc::now() + Duration::hours(23));
        let err = game.play(user.id).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let history = game.history(user.id, &PaginationParams::default()).await.unwrap();
        assert_eq!(history.pagination.total, 1);
        assert_eq!(history.items[0].prize_name, "Всегда 5 ₽");
    }

    #[tokio::test]
    async fn test_losing_play_leaves_balance() {
        let mut config = test_config();
        config.lucky_game.prizes = vec![prize("Мимо", 0, 10_000)];
        config.lucky_game.cooldown_hours = 0;
        let ctx = setup_with(config).await;
        let user = seed_user(&ctx.pool, 701).await;

        let result = ctx.services.lucky_game.play(user.id).await.unwrap();
        assert_eq!(result.reward, 0);
        assert_eq!(result.new_balance, 0);
        // no cooldown configured
        assert!(ctx.services.lucky_game.play(user.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_claimed_slot_blocks_play() {
        let mut config = test_config();
        config.lucky_game.prizes = vec![prize("Всегда 5 ₽", 500, 10_000)];
        let ctx = setup_with(config).await;
        let user = seed_user(&ctx.pool, 703).await;
        let cooldown = Duration::hours(24);
        let now = Utc::now();

        // a concurrent play claimed the slot but has not written its game row yet
        assert!(claim_play(&ctx.pool, user.id, cooldown, now).await.unwrap());
        assert!(!claim_play(&ctx.pool, user.id, cooldown, now).await.unwrap());

        let err = ctx.services.lucky_game.play(user.id).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(ledger::current_balance(&ctx.pool, user.id).await.unwrap(), 0);
        assert!(
            claim_play(&ctx.pool, user.id, cooldown, now + cooldown)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_disabled_game() {
        let mut config = test_config();
        config.lucky_game.enabled = false;
        let ctx = setup_with(config).await;
        let user = seed_user(&ctx.pool, 702).await;
        assert!(ctx.services.lucky_game.play(user.id).await.is_err());
    }
}
