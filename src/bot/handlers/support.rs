use super::{Screen, notify, reply, show};
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::states::{BotDialogue, State, reset_state, set_state};
use crate::bot::texts;
use crate::error::AppResult;
use crate::models::PaginationParams;
use crate::services::ServiceRegistry;
use teloxide::prelude::*;

pub async fn tickets(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    page: u64,
) -> AppResult<()> {
    let page = services
        .tickets
        .user_tickets(current.user.id, &PaginationParams::page(page))
        .await?;
    let mut text = texts::tickets(&page, "🆘 <b>Поддержка</b>");
    if let Some(username) = &services.config.bot.support_username {
        text.push_str(&format!("\n\nСвязаться напрямую: @{}", crate::utils::escape_html(username)));
    }
    show(
        bot,
        screen,
        text,
        keyboards::support(&page.items, &page.pagination),
    )
    .await
}

pub async fn ticket(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    ticket_id: i32,
) -> AppResult<()> {
    let view = services
        .tickets
        .get_with_messages(ticket_id, Some(current.user.id))
        .await?;
    show(
        bot,
        screen,
        texts::ticket(&view, false),
        keyboards::user_ticket(&view),
    )
    .await
}

pub async fn ask_title(bot: &Bot, screen: Screen, dialogue: &BotDialogue) -> AppResult<()> {
    set_state(dialogue, State::TicketTitle).await?;
    show(bot, screen, texts::ASK_TICKET_TITLE, keyboards::cancel()).await
}

pub async fn on_title(
    bot: &Bot,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    title: &str,
) -> AppResult<()> {
    let title = title.trim();
    let len = title.chars().count();
    if !(3..=100).contains(&len) {
        return reply(bot, current.chat_id(), texts::ASK_TICKET_TITLE, Some(keyboards::cancel())).await;
    }
    set_state(
        dialogue,
        State::TicketText {
            title: title.to_string(),
        },
    )
    .await?;
    reply(bot, current.chat_id(), texts::ASK_TICKET_TEXT, Some(keyboards::cancel())).await
}

pub async fn on_text(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    title: &str,
    text: &str,
) -> AppResult<()> {
    let view = services.tickets.create(current.user.id, title, text).await?;
    reset_state(dialogue).await?;
    reply(
        bot,
        current.chat_id(),
        format!("✅ Обращение #{} создано. Мы ответим в ближайшее время.", view.ticket.id),
        Some(keyboards::user_ticket(&view)),
    )
    .await?;

    let alert = texts::new_ticket_for_admins(&view);
    for admin in &services.config.bot.admin_ids {
        notify(bot, *admin, alert.clone()).await;
    }
    Ok(())
}

pub async fn ask_reply(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    ticket_id: i32,
) -> AppResult<()> {
    // ownership check before prompting
    services
        .tickets
        .get_with_messages(ticket_id, Some(current.user.id))
        .await?;
    set_state(dialogue, State::TicketReply { ticket_id }).await?;
    show(bot, screen, texts::ASK_TICKET_REPLY, keyboards::cancel()).await
}

pub async fn on_reply(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    ticket_id: i32,
    text: &str,
) -> AppResult<()> {
    services
        .tickets
        .add_user_message(current.user.id, ticket_id, text)
        .await?;
    reset_state(dialogue).await?;
    let view = services
        .tickets
        .get_with_messages(ticket_id, Some(current.user.id))
        .await?;
    reply(
        bot,
        current.chat_id(),
        texts::ticket(&view, false),
        Some(keyboards::user_ticket(&view)),
    )
    .await?;

    let alert = format!("💬 Новое сообщение в обращении #{ticket_id}");
    for admin in &services.config.bot.admin_ids {
        notify(bot, *admin, alert.clone()).await;
    }
    Ok(())
}

pub async fn close(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    ticket_id: i32,
) -> AppResult<()> {
    services.tickets.close(ticket_id, Some(current.user.id)).await?;
    ticket(bot, screen, services, current, ticket_id).await
}
