use crate::config::Config;
use crate::database::DbPool;
use crate::entities::{plan_entity as plans, user_entity as users};
use crate::external::fake_panel::FakePanel;
use crate::external::PanelApi;
use crate::services::ServiceRegistry;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;

pub struct TestContext {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub panel: Arc<FakePanel>,
    pub services: ServiceRegistry,
}

pub fn test_config() -> Config {
    let mut config = Config::parse(
        r#"
        [bot]
        token = "123:abc"
        admin_ids = [1]
        username = "remna_shop_bot"

        [server]
        host = "127.0.0.1"
        port = 8080

        [database]
        url = "sqlite::memory:"
        max_connections = 1

        [remnawave]
        base_url = "http://panel.local"
        api_token = "token"
        default_squad_uuids = ["sq-default"]
        "#,
    )
    .unwrap();
    config.payments.tribute_enabled = true;
    config.payments.tribute_api_key = "tribute-secret".into();
    config
}

pub async fn setup() -> TestContext {
    setup_with(test_config()).await
}

pub async fn setup_with(config: Config) -> TestContext {
    let pool = crate::database::connection::test_pool().await;
    let config = Arc::new(config);
    let panel = Arc::new(FakePanel::new());
    let services = ServiceRegistry::new(
        pool.clone(),
        config.clone(),
        panel.clone() as Arc<dyn PanelApi>,
    );
    TestContext {
        pool,
        config,
        panel,
        services,
    }
}

pub async fn seed_user(pool: &DbPool, telegram_id: i64) -> users::Model {
    let now = Utc::now();
    users::ActiveModel {
        telegram_id: Set(telegram_id),
        username: Set(Some(format!("user{telegram_id}"))),
        first_name: Set(Some("Test".into())),
        balance: Set(0),
        referral_code: Set(format!("CODE{telegram_id}")),
        is_banned: Set(false),
        has_had_trial: Set(false),
        last_activity: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(pool)
    .await
    .unwrap()
}

pub async fn seed_user_with_balance(pool: &DbPool, telegram_id: i64, balance: i64) -> users::Model {
    let user = seed_user(pool, telegram_id).await;
    let mut am: users::ActiveModel = user.into();
    am.balance = Set(balance);
    am.update(pool).await.unwrap()
}

pub async fn seed_plan(pool: &DbPool, price: i64, duration_days: i32) -> plans::Model {
    let now = Utc::now();
    plans::ActiveModel {
        name: Set(format!("{duration_days} дней")),
        description: Set(None),
        price: Set(price),
        duration_days: Set(duration_days),
        traffic_limit_gb: Set(100),
        device_limit: Set(3),
        squad_uuids: Set(None),
        is_active: Set(true),
        is_trial: Set(false),
        sort_order: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(pool)
    .await
    .unwrap()
}
