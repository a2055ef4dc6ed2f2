//! Admin panel screens. Callers guarantee the current user is an admin.

use super::{Screen, notify, reply, show};
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::states::{
    BotDialogue, State, parse_plan_form, parse_promocode_form, reset_state, set_state,
};
use crate::bot::texts;
use crate::entities::{TicketPriority, user_entity};
use crate::error::{AppError, AppResult};
use crate::models::PaginationParams;
use crate::services::ServiceRegistry;
use crate::utils::{format_money, parse_rubles};
use chrono::Utc;
use std::time::Duration;
use teloxide::prelude::*;

/// Pause between broadcast messages, keeps well under Telegram's 30 msg/s
const BROADCAST_DELAY: Duration = Duration::from_millis(50);

pub async fn menu(bot: &Bot, screen: Screen) -> AppResult<()> {
    show(
        bot,
        screen,
        "🛠 <b>Админ-панель</b>",
        keyboards::admin_menu(),
    )
    .await
}

pub async fn stats(bot: &Bot, screen: Screen, services: &ServiceRegistry) -> AppResult<()> {
    let dashboard = services.stats.dashboard().await?;
    let revenue = services.payments.revenue_stats().await?;
    let tickets = services.tickets.counts_by_status().await?;
    show(
        bot,
        screen,
        texts::dashboard(&dashboard, &revenue, &tickets),
        keyboards::back_to_admin(),
    )
    .await
}

pub async fn panel_stats(bot: &Bot, screen: Screen, services: &ServiceRegistry) -> AppResult<()> {
    let stats = services.panel.get_system_stats().await?;
    let squads = services.panel.get_internal_squads().await?;
    show(
        bot,
        screen,
        texts::panel_stats(&stats, &squads),
        keyboards::back_to_admin(),
    )
    .await
}

// -----------------------------
// Users
// -----------------------------

const NEWEST_USERS: u64 = 10;

fn user_rows(users: &[user_entity::Model]) -> Vec<(i32, String)> {
    users
        .iter()
        .map(|u| (u.id, format!("{} · {}", u.display_name(), u.telegram_id)))
        .collect()
}

/// Prompt for a query, with the newest users listed as shortcuts
pub async fn ask_user_search(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    dialogue: &BotDialogue,
) -> AppResult<()> {
    let newest = services
        .users
        .list_users(&PaginationParams::new(Some(1), Some(NEWEST_USERS)))
        .await?;
    set_state(dialogue, State::AdminUserSearch).await?;
    show(
        bot,
        screen,
        format!(
            "{}\n\nВсего пользователей: {}. Последние зарегистрированные:",
            texts::ASK_USER_SEARCH,
            newest.pagination.total
        ),
        keyboards::admin_search_results(&user_rows(&newest.items)),
    )
    .await
}

pub async fn on_user_search(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    query: &str,
) -> AppResult<()> {
    let found = services.users.search(query).await?;
    reset_state(dialogue).await?;
    let screen = Screen::new_message(current.chat_id());
    match found.as_slice() {
        [] => Err(AppError::NotFound("Пользователи не найдены".into())),
        [only] => user(bot, screen, services, only.id).await,
        many => {
            show(
                bot,
                screen,
                format!("🔎 Найдено: {}", many.len()),
                keyboards::admin_search_results(&user_rows(many)),
            )
            .await
        }
    }
}

pub async fn user(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    user_id: i32,
) -> AppResult<()> {
    let user = services.users.get(user_id).await?;
    let subscriptions = services.subscriptions.user_subscriptions(user_id).await?;
    show(
        bot,
        screen,
        texts::admin_user(&user, subscriptions.first()),
        keyboards::admin_user(user.id, user.is_banned),
    )
    .await
}

pub async fn ask_balance(
    bot: &Bot,
    screen: Screen,
    dialogue: &BotDialogue,
    user_id: i32,
) -> AppResult<()> {
    set_state(dialogue, State::AdminBalanceChange { user_id }).await?;
    show(bot, screen, texts::ASK_BALANCE_CHANGE, keyboards::cancel()).await
}

/// "-100" debits, "250.50" credits
fn parse_signed_rubles(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    match raw.strip_prefix('-') {
        Some(rest) => parse_rubles(rest).map(|v| -v),
        None => parse_rubles(raw.strip_prefix('+').unwrap_or(raw)),
    }
}

pub async fn on_balance(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    user_id: i32,
    raw: &str,
) -> AppResult<()> {
    let amount = parse_signed_rubles(raw)
        .ok_or_else(|| AppError::ValidationError("Введите сумму числом, например -100".into()))?;
    let new_balance = services
        .users
        .add_balance(
            user_id,
            amount,
            Some(format!("Корректировка администратором {}", current.user.telegram_id)),
        )
        .await?;
    reset_state(dialogue).await?;

    let target = services.users.get(user_id).await?;
    notify(
        bot,
        target.telegram_id,
        format!("💰 Баланс изменён администратором\nТекущий баланс: {}", format_money(new_balance)),
    )
    .await;
    user(bot, Screen::new_message(current.chat_id()), services, user_id).await
}

pub async fn set_banned(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    user_id: i32,
    banned: bool,
) -> AppResult<()> {
    if user_id == current.user.id {
        return Err(AppError::ValidationError("Нельзя заблокировать самого себя".into()));
    }
    services.users.set_banned(user_id, banned).await?;
    // a banned user keeps no VPN access
    if let Err(e) = services.subscriptions.set_panel_access(user_id, !banned).await {
        log::warn!("Cannot switch panel access of user {user_id}: {e}");
    }
    user(bot, screen, services, user_id).await
}

pub async fn reset_traffic(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    user_id: i32,
) -> AppResult<()> {
    services.subscriptions.reset_traffic(user_id).await?;
    reply(bot, screen.chat_id, "♻️ Трафик сброшен", None).await?;
    user(bot, screen, services, user_id).await
}

pub async fn revoke(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    user_id: i32,
) -> AppResult<()> {
    let revoked = services.subscriptions.revoke(user_id).await?;
    reply(
        bot,
        screen.chat_id,
        format!("🗑 Подписка отозвана, отключено записей: {revoked}"),
        None,
    )
    .await?;
    user(bot, Screen::new_message(screen.chat_id), services, user_id).await
}

// -----------------------------
// Plans
// -----------------------------

pub async fn plans(bot: &Bot, screen: Screen, services: &ServiceRegistry) -> AppResult<()> {
    let plans = services.subscriptions.list_all_plans().await?;
    show(
        bot,
        screen,
        texts::admin_plans(&plans),
        keyboards::admin_plans(&plans),
    )
    .await
}

pub async fn toggle_plan(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    plan_id: i32,
) -> AppResult<()> {
    let plan = services.subscriptions.get_plan(plan_id).await?;
    services
        .subscriptions
        .set_plan_active(plan.id, !plan.is_active)
        .await?;
    plans(bot, screen, services).await
}

pub async fn ask_plan(bot: &Bot, screen: Screen, dialogue: &BotDialogue) -> AppResult<()> {
    set_state(dialogue, State::AdminPlanCreate).await?;
    show(bot, screen, texts::ASK_PLAN, keyboards::cancel()).await
}

pub async fn on_plan(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    raw: &str,
) -> AppResult<()> {
    let mut plan = parse_plan_form(raw)?;
    plan.squad_uuids = services.config.remnawave.default_squad_uuids.clone();
    services.subscriptions.create_plan(plan).await?;
    reset_state(dialogue).await?;
    plans(bot, Screen::new_message(current.chat_id()), services).await
}

// -----------------------------
// Promocodes
// -----------------------------

pub async fn promocodes(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    page: u64,
) -> AppResult<()> {
    let page = services.promocodes.list(&PaginationParams::page(page)).await?;
    show(
        bot,
        screen,
        texts::promocodes(&page, Utc::now()),
        keyboards::admin_promocodes(&page.items, &page.pagination),
    )
    .await
}

pub async fn deactivate_promocode(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    promocode_id: i32,
) -> AppResult<()> {
    services.promocodes.deactivate(promocode_id).await?;
    promocodes(bot, screen, services, 1).await
}

pub async fn ask_promocode(bot: &Bot, screen: Screen, dialogue: &BotDialogue) -> AppResult<()> {
    set_state(dialogue, State::AdminPromocodeCreate).await?;
    show(bot, screen, texts::ASK_PROMOCODE_FORM, keyboards::cancel()).await
}

pub async fn on_promocode(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    raw: &str,
) -> AppResult<()> {
    let form = parse_promocode_form(raw, current.user.telegram_id)?;
    let created = services.promocodes.create(form).await?;
    reset_state(dialogue).await?;
    reply(
        bot,
        current.chat_id(),
        format!("✅ Промокод <code>{}</code> создан", created.code),
        None,
    )
    .await?;
    promocodes(bot, Screen::new_message(current.chat_id()), services, 1).await
}

// -----------------------------
// Tickets
// -----------------------------

pub async fn tickets(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    page: u64,
) -> AppResult<()> {
    let page = services
        .tickets
        .admin_tickets(None, &PaginationParams::page(page))
        .await?;
    show(
        bot,
        screen,
        texts::tickets(&page, "🎫 <b>Обращения</b>"),
        keyboards::admin_tickets(&page.items, &page.pagination),
    )
    .await
}

pub async fn ticket(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    ticket_id: i32,
) -> AppResult<()> {
    let view = services.tickets.get_with_messages(ticket_id, None).await?;
    show(
        bot,
        screen,
        texts::ticket(&view, true),
        keyboards::admin_ticket(&view),
    )
    .await
}

pub async fn ask_ticket_reply(
    bot: &Bot,
    screen: Screen,
    dialogue: &BotDialogue,
    ticket_id: i32,
) -> AppResult<()> {
    set_state(dialogue, State::AdminTicketReply { ticket_id }).await?;
    show(bot, screen, texts::ASK_TICKET_REPLY, keyboards::cancel()).await
}

pub async fn on_ticket_reply(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    ticket_id: i32,
    text: &str,
) -> AppResult<()> {
    let answered = services
        .tickets
        .add_admin_reply(current.user.telegram_id, ticket_id, text)
        .await?;
    reset_state(dialogue).await?;
    notify(
        bot,
        answered.owner_telegram_id,
        texts::ticket_answered(answered.ticket_id),
    )
    .await;
    ticket(bot, Screen::new_message(current.chat_id()), services, ticket_id).await
}

pub async fn close_ticket(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    ticket_id: i32,
) -> AppResult<()> {
    services.tickets.close(ticket_id, None).await?;
    ticket(bot, screen, services, ticket_id).await
}

pub async fn reopen_ticket(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    ticket_id: i32,
) -> AppResult<()> {
    services.tickets.reopen(ticket_id).await?;
    ticket(bot, screen, services, ticket_id).await
}

pub async fn set_ticket_priority(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    ticket_id: i32,
    priority: TicketPriority,
) -> AppResult<()> {
    services.tickets.set_priority(ticket_id, priority).await?;
    ticket(bot, screen, services, ticket_id).await
}

// -----------------------------
// Maintenance
// -----------------------------

pub async fn sync(bot: &Bot, screen: Screen, services: &ServiceRegistry) -> AppResult<()> {
    let report = services.sync.sync_all().await?;
    show(
        bot,
        screen,
        texts::sync_report(&report),
        keyboards::back_to_admin(),
    )
    .await
}

pub async fn ask_broadcast(bot: &Bot, screen: Screen, dialogue: &BotDialogue) -> AppResult<()> {
    set_state(dialogue, State::AdminBroadcast).await?;
    show(bot, screen, texts::ASK_BROADCAST, keyboards::cancel()).await
}

/// Sends in the background and reports back to the admin when done
pub async fn on_broadcast(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    text: &str,
) -> AppResult<()> {
    let targets = services.users.broadcast_targets().await?;
    reset_state(dialogue).await?;
    reply(
        bot,
        current.chat_id(),
        format!("📣 Рассылка запущена, получателей: {}", targets.len()),
        None,
    )
    .await?;

    let bot = bot.clone();
    let admin_chat = current.chat_id();
    let text = text.to_string();
    tokio::spawn(async move {
        let (mut delivered, mut failed) = (0usize, 0usize);
        for telegram_id in targets {
            match super::reply(&bot, ChatId(telegram_id), text.clone(), None).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    log::debug!("Broadcast to {telegram_id} failed: {e}");
                    failed += 1;
                }
            }
            tokio::time::sleep(BROADCAST_DELAY).await;
        }
        log::info!("Broadcast finished: {delivered} delivered, {failed} failed");
        if let Err(e) = super::reply(&bot, admin_chat, texts::broadcast_done(delivered, failed), None).await {
            log::warn!("Cannot report broadcast result: {e}");
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signed_rubles() {
        assert_eq!(parse_signed_rubles("-100"), Some(-10_000));
        assert_eq!(parse_signed_rubles("+250.5"), Some(25_050));
        assert_eq!(parse_signed_rubles(" 99 "), Some(9_900));
        assert_eq!(parse_signed_rubles("--5"), None);
        assert_eq!(parse_signed_rubles("abc"), None);
    }
}
