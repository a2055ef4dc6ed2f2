use super::{Screen, show};
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::texts;
use crate::error::AppResult;
use crate::services::ServiceRegistry;
use chrono::Utc;
use teloxide::prelude::*;

pub async fn plans(bot: &Bot, screen: Screen, services: &ServiceRegistry) -> AppResult<()> {
    let plans = services.subscriptions.list_active_plans().await?;
    show(bot, screen, texts::plans(&plans), keyboards::plans(&plans)).await
}

pub async fn confirm(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    plan_id: i32,
) -> AppResult<()> {
    let plan = services.subscriptions.get_plan(plan_id).await?;
    let user = services.users.get(current.user.id).await?;
    let extends = services
        .subscriptions
        .active_subscription(user.id)
        .await?
        .is_some();
    show(
        bot,
        screen,
        texts::confirm_purchase(&plan, user.balance, extends),
        keyboards::confirm_purchase(plan.id),
    )
    .await
}

pub async fn purchase(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    plan_id: i32,
) -> AppResult<()> {
    let outcome = services.subscriptions.purchase(current.user.id, plan_id).await?;
    show(
        bot,
        screen,
        texts::purchased(&outcome),
        keyboards::subscription(true),
    )
    .await
}

/// Pulls the panel state first so the link and expiry are current
pub async fn my_subscription(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    if let Err(e) = services.sync.sync_user(current.user.id).await {
        log::warn!("On-demand sync failed for user {}: {e}", current.user.id);
    }
    let subscriptions = services.subscriptions.user_subscriptions(current.user.id).await?;
    let now = Utc::now();
    let shown = subscriptions
        .iter()
        .find(|s| s.is_active && !s.is_expired_at(now))
        .or_else(|| subscriptions.first());
    show(
        bot,
        screen,
        texts::subscription(shown, now),
        keyboards::subscription(shown.is_some()),
    )
    .await
}

pub async fn trial(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    services.subscriptions.activate_trial(current.user.id).await?;
    show(
        bot,
        screen,
        texts::TRIAL_ACTIVATED,
        keyboards::subscription(true),
    )
    .await
}
