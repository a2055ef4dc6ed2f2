//! Entry points the dispatcher calls: commands, inline buttons and free text
//! interpreted through the dialogue state.

use super::{HandlerResult, Screen, admin, finish, lucky, menu, payment, reply, shop, support};
use crate::bot::callback::CallbackAction;
use crate::bot::commands::Command;
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::states::{BotDialogue, State, reset_state};
use crate::bot::texts;
use crate::error::{AppError, AppResult};
use crate::services::ServiceRegistry;
use teloxide::prelude::*;

pub async fn on_command(
    bot: Bot,
    cmd: Command,
    services: ServiceRegistry,
    current: CurrentUser,
    dialogue: BotDialogue,
) -> HandlerResult {
    let result = run_command(&bot, cmd, &services, &current, &dialogue).await;
    finish(&bot, current.chat_id(), result).await
}

async fn run_command(
    bot: &Bot,
    cmd: Command,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
) -> AppResult<()> {
    reset_state(dialogue).await?;
    let screen = Screen::new_message(current.chat_id());
    match cmd {
        // the referral payload was consumed while resolving the user
        Command::Start(_) | Command::Menu => menu::main_menu(bot, screen, services, current).await,
        Command::Help => menu::help(bot, current.chat_id()).await,
        Command::Balance => payment::balance(bot, screen, services, current).await,
        Command::Promo => menu::ask_promocode(bot, screen, dialogue).await,
        Command::Referral => menu::referral(bot, screen, services, current).await,
        Command::Support => support::tickets(bot, screen, services, current, 1).await,
        Command::Admin if current.is_admin => admin::menu(bot, screen).await,
        Command::Admin => Err(AppError::Forbidden),
    }
}

pub async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    services: ServiceRegistry,
    current: CurrentUser,
    dialogue: BotDialogue,
) -> HandlerResult {
    let action = match q.data.as_deref().map(str::parse::<CallbackAction>) {
        Some(Ok(action)) => action,
        other => {
            log::warn!("Unknown callback data from {}: {other:?}", current.user.telegram_id);
            bot.answer_callback_query(q.id.clone())
                .text("Кнопка устарела, откройте меню заново")
                .await?;
            return Ok(());
        }
    };
    if action.requires_admin() && !current.is_admin {
        log::warn!("Non-admin {} pressed {action}", current.user.telegram_id);
        bot.answer_callback_query(q.id.clone())
            .text(texts::ADMIN_ONLY)
            .show_alert(true)
            .await?;
        return Ok(());
    }
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        log::debug!("Callback answer failed: {e}");
    }

    let screen = Screen::from_callback(&q, current.chat_id());
    let result: AppResult<()> = async {
        // any button press abandons a pending prompt
        reset_state(&dialogue).await?;
        run_action(&bot, action, screen, &services, &current, &dialogue).await
    }
    .await;
    finish(&bot, screen.chat_id, result).await
}

async fn run_action(
    bot: &Bot,
    action: CallbackAction,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
) -> AppResult<()> {
    use CallbackAction::*;
    match action {
        Menu => menu::main_menu(bot, screen, services, current).await,
        Cancel => menu::cancel(bot, screen, services, current, dialogue).await,
        Plans => shop::plans(bot, screen, services).await,
        Buy(plan_id) => shop::confirm(bot, screen, services, current, plan_id).await,
        ConfirmBuy(plan_id) => shop::purchase(bot, screen, services, current, plan_id).await,
        MySubscription => shop::my_subscription(bot, screen, services, current).await,
        Trial => shop::trial(bot, screen, services, current).await,
        Balance => payment::balance(bot, screen, services, current).await,
        History(page) => payment::history(bot, screen, services, current, page).await,
        Topup => payment::topup_menu(bot, screen, services).await,
        TopupStars(amount) => payment::send_invoice(bot, services, current, amount).await,
        TopupCustom => payment::ask_amount(bot, screen, dialogue).await,
        Promocode => menu::ask_promocode(bot, screen, dialogue).await,
        Referral => menu::referral(bot, screen, services, current).await,
        Support => support::tickets(bot, screen, services, current, 1).await,
        TicketNew => support::ask_title(bot, screen, dialogue).await,
        Tickets(page) => support::tickets(bot, screen, services, current, page).await,
        Ticket(id) => support::ticket(bot, screen, services, current, id).await,
        TicketReply(id) => support::ask_reply(bot, screen, services, current, dialogue, id).await,
        TicketClose(id) => support::close(bot, screen, services, current, id).await,
        LuckyGame => lucky::intro(bot, screen, services, current).await,
        LuckyPlay => lucky::play(bot, screen, services, current).await,
        Admin => admin::menu(bot, screen).await,
        AdminStats => admin::stats(bot, screen, services).await,
        AdminPanelStats => admin::panel_stats(bot, screen, services).await,
        AdminUserSearch => admin::ask_user_search(bot, screen, services, dialogue).await,
        AdminUser(id) => admin::user(bot, screen, services, id).await,
        AdminBalance(id) => admin::ask_balance(bot, screen, dialogue, id).await,
        AdminBan(id, banned) => admin::set_banned(bot, screen, services, current, id, banned).await,
        AdminResetTraffic(id) => admin::reset_traffic(bot, screen, services, id).await,
        AdminRevoke(id) => admin::revoke(bot, screen, services, id).await,
        AdminPlans => admin::plans(bot, screen, services).await,
        AdminPlanNew => admin::ask_plan(bot, screen, dialogue).await,
        AdminPlanToggle(id) => admin::toggle_plan(bot, screen, services, id).await,
        AdminPromos(page) => admin::promocodes(bot, screen, services, page).await,
        AdminPromoNew => admin::ask_promocode(bot, screen, dialogue).await,
        AdminPromoOff(id) => admin::deactivate_promocode(bot, screen, services, id).await,
        AdminTickets(page) => admin::tickets(bot, screen, services, page).await,
        AdminTicket(id) => admin::ticket(bot, screen, services, id).await,
        AdminTicketReply(id) => admin::ask_ticket_reply(bot, screen, dialogue, id).await,
        AdminTicketClose(id) => admin::close_ticket(bot, screen, services, id).await,
        AdminTicketReopen(id) => admin::reopen_ticket(bot, screen, services, id).await,
        AdminTicketPriority(id, priority) => {
            admin::set_ticket_priority(bot, screen, services, id, priority).await
        }
        AdminSync => admin::sync(bot, screen, services).await,
        AdminBroadcast => admin::ask_broadcast(bot, screen, dialogue).await,
    }
}

/// Free text, read according to what the dialogue is waiting for
pub async fn on_text(
    bot: Bot,
    msg: Message,
    services: ServiceRegistry,
    current: CurrentUser,
    dialogue: BotDialogue,
    state: State,
) -> HandlerResult {
    let result = match msg.text() {
        Some(text) => run_text(&bot, &services, &current, &dialogue, state, text).await,
        None if state == State::Idle => {
            reply(&bot, current.chat_id(), texts::UNKNOWN_INPUT, None).await
        }
        None => Err(AppError::ValidationError("Отправьте текстовое сообщение".into())),
    };
    finish(&bot, current.chat_id(), result).await
}

async fn run_text(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    state: State,
    text: &str,
) -> AppResult<()> {
    let admin_only = matches!(
        state,
        State::AdminUserSearch
            | State::AdminBalanceChange { .. }
            | State::AdminTicketReply { .. }
            | State::AdminBroadcast
            | State::AdminPlanCreate
            | State::AdminPromocodeCreate
    );
    if admin_only && !current.is_admin {
        reset_state(dialogue).await?;
        return Err(AppError::Forbidden);
    }

    match state {
        State::Idle => {
            reply(
                bot,
                current.chat_id(),
                texts::UNKNOWN_INPUT,
                Some(keyboards::back_to_menu()),
            )
            .await
        }
        State::TopupAmount => payment::on_amount(bot, services, current, dialogue, text).await,
        State::PromocodeInput => {
            menu::redeem_promocode(bot, services, current, dialogue, text).await
        }
        State::TicketTitle => support::on_title(bot, current, dialogue, text).await,
        State::TicketText { title } => {
            support::on_text(bot, services, current, dialogue, &title, text).await
        }
        State::TicketReply { ticket_id } => {
            support::on_reply(bot, services, current, dialogue, ticket_id, text).await
        }
        State::AdminUserSearch => {
            admin::on_user_search(bot, services, current, dialogue, text).await
        }
        State::AdminBalanceChange { user_id } => {
            admin::on_balance(bot, services, current, dialogue, user_id, text).await
        }
        State::AdminTicketReply { ticket_id } => {
            admin::on_ticket_reply(bot, services, current, dialogue, ticket_id, text).await
        }
        State::AdminBroadcast => admin::on_broadcast(bot, services, current, dialogue, text).await,
        State::AdminPlanCreate => admin::on_plan(bot, services, current, dialogue, text).await,
        State::AdminPromocodeCreate => {
            admin::on_promocode(bot, services, current, dialogue, text).await
        }
    }
}
