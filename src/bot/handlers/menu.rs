use super::{Screen, reply, show};
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::states::{BotDialogue, State, reset_state, set_state};
use crate::bot::texts;
use crate::error::AppResult;
use crate::models::{PaginationParams, RedeemOutcome};
use crate::services::ServiceRegistry;
use crate::utils::format_money;
use teloxide::prelude::*;

const RECENT_REFERRALS: u64 = 5;

pub async fn main_menu(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    let user = services.users.get(current.user.id).await?;
    let trial_available = services.config.trial.enabled
        && !user.has_had_trial
        && services
            .subscriptions
            .active_subscription(user.id)
            .await?
            .is_none();
    show(
        bot,
        screen,
        texts::main_menu(&user, &services.config, current.is_new),
        keyboards::main_menu(current.is_admin, trial_available),
    )
    .await
}

pub async fn help(bot: &Bot, chat_id: ChatId) -> AppResult<()> {
    reply(bot, chat_id, texts::HELP, Some(keyboards::back_to_menu())).await
}

pub async fn referral(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    let stats = services.referrals.stats(&current.user).await?;
    let recent = services
        .referrals
        .referrals(
            current.user.id,
            &PaginationParams::new(Some(1), Some(RECENT_REFERRALS)),
        )
        .await?;
    let credits = services
        .referrals
        .earnings(
            current.user.id,
            &PaginationParams::new(Some(1), Some(RECENT_REFERRALS)),
        )
        .await?;
    show(
        bot,
        screen,
        texts::referral(&stats, &services.config, &recent.items, &credits.items),
        keyboards::back_to_menu(),
    )
    .await
}

pub async fn ask_promocode(bot: &Bot, screen: Screen, dialogue: &BotDialogue) -> AppResult<()> {
    set_state(dialogue, State::PromocodeInput).await?;
    show(bot, screen, texts::ASK_PROMOCODE, keyboards::cancel()).await
}

pub async fn redeem_promocode(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    code: &str,
) -> AppResult<()> {
    // a wrong code keeps the prompt open for another try
    let outcome = services.promocodes.redeem(current.user.id, code).await?;
    reset_state(dialogue).await?;
    let text = match outcome {
        RedeemOutcome::BalanceCredited {
            amount,
            new_balance,
        } => format!(
            "🎟 Промокод активирован: +{}\n💰 Баланс: {}",
            format_money(amount),
            format_money(new_balance)
        ),
        RedeemOutcome::SubscriptionExtended { days, expires_at } => format!(
            "🎟 Промокод активирован: +{days} дн. подписки\nДействует до {}",
            expires_at.format("%d.%m.%Y %H:%M UTC")
        ),
    };
    reply(bot, current.chat_id(), text, Some(keyboards::back_to_menu())).await
}

pub async fn cancel(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
) -> AppResult<()> {
    reset_state(dialogue).await?;
    reply(bot, screen.chat_id, texts::CANCELLED, None).await?;
    main_menu(bot, Screen::new_message(screen.chat_id), services, current).await
}
