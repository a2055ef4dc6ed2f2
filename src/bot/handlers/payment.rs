//! Balance screens, Telegram Stars invoices and their payment updates.

use super::{HandlerResult, Screen, finish, notify, reply, show};
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::states::{BotDialogue, State, reset_state, set_state};
use crate::bot::texts;
use crate::error::{AppError, AppResult};
use crate::models::{PaginationParams, SuccessfulStarPayment};
use crate::services::{STARS_CURRENCY, ServiceRegistry};
use crate::utils::parse_rubles;
use teloxide::prelude::*;
use teloxide::types::{LabeledPrice, PreCheckoutQuery};

pub async fn balance(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    let user = services.users.get(current.user.id).await?;
    show(bot, screen, texts::balance(&user), keyboards::balance()).await
}

pub async fn history(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
    page: u64,
) -> AppResult<()> {
    let page = services
        .payments
        .history(current.user.id, &PaginationParams::page(page))
        .await?;
    show(
        bot,
        screen,
        texts::history(&page),
        keyboards::history(&page.pagination),
    )
    .await
}

pub async fn topup_menu(bot: &Bot, screen: Screen, services: &ServiceRegistry) -> AppResult<()> {
    if !services.config.payments.stars_enabled {
        return Err(AppError::ValidationError(
            "Оплата звёздами сейчас недоступна".into(),
        ));
    }
    show(
        bot,
        screen,
        format!(
            "⭐ Выберите сумму пополнения\n1 ⭐ = {}",
            crate::utils::format_money(services.config.payments.stars_rate)
        ),
        keyboards::topup(),
    )
    .await
}

pub async fn ask_amount(bot: &Bot, screen: Screen, dialogue: &BotDialogue) -> AppResult<()> {
    set_state(dialogue, State::TopupAmount).await?;
    show(bot, screen, texts::ASK_TOPUP_AMOUNT, keyboards::cancel()).await
}

pub async fn on_amount(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    dialogue: &BotDialogue,
    raw: &str,
) -> AppResult<()> {
    let amount = parse_rubles(raw)
        .ok_or_else(|| AppError::ValidationError("Введите сумму числом, например 250".into()))?;
    send_invoice(bot, services, current, amount).await?;
    reset_state(dialogue).await
}

pub async fn send_invoice(
    bot: &Bot,
    services: &ServiceRegistry,
    current: &CurrentUser,
    amount: i64,
) -> AppResult<()> {
    let invoice = services.payments.stars_invoice(current.user.id, amount)?;
    bot.send_invoice(
        current.chat_id(),
        invoice.title,
        invoice.description,
        invoice.payload,
        STARS_CURRENCY,
        vec![LabeledPrice::new("Пополнение баланса", invoice.stars)],
    )
    .await?;
    log::info!(
        "Stars invoice sent to user {}: {} stars for {}",
        current.user.id,
        invoice.stars,
        invoice.amount
    );
    Ok(())
}

/// Last check before Telegram takes the stars
pub async fn on_pre_checkout(
    bot: Bot,
    q: PreCheckoutQuery,
    services: ServiceRegistry,
) -> HandlerResult {
    let verdict = check_pre_checkout(&q, &services).await;
    match verdict {
        Ok(()) => {
            bot.answer_pre_checkout_query(q.id, true).await?;
        }
        Err(e) => {
            log::warn!("Pre-checkout rejected for {}: {e}", q.from.id.0);
            bot.answer_pre_checkout_query(q.id, false)
                .error_message(e.user_message())
                .await?;
        }
    }
    Ok(())
}

async fn check_pre_checkout(q: &PreCheckoutQuery, services: &ServiceRegistry) -> AppResult<()> {
    if q.currency != STARS_CURRENCY {
        return Err(AppError::ValidationError("Неподдерживаемая валюта".into()));
    }
    let (_, amount) = services
        .payments
        .validate_stars_payload(q.from.id.0 as i64, &q.invoice_payload)
        .await?;
    if q.total_amount < services.payments.stars_for(amount) {
        return Err(AppError::ValidationError("Сумма счёта изменилась".into()));
    }
    Ok(())
}

pub async fn on_successful_payment(
    bot: Bot,
    msg: Message,
    services: ServiceRegistry,
    current: CurrentUser,
) -> HandlerResult {
    let Some(paid) = msg.successful_payment() else {
        return Ok(());
    };
    let payment = SuccessfulStarPayment {
        telegram_id: current.user.telegram_id,
        telegram_payment_charge_id: paid.telegram_payment_charge_id.0.clone(),
        total_amount: paid.total_amount,
        currency: paid.currency.clone(),
        invoice_payload: paid.invoice_payload.clone(),
    };
    let result: AppResult<()> = async {
        let outcome = services.payments.process_star_payment(&payment).await?;
        if outcome.duplicate {
            log::info!(
                "Stars charge {} was already credited",
                payment.telegram_payment_charge_id
            );
            return Ok(());
        }
        reply(
            &bot,
            current.chat_id(),
            texts::topup_credited(outcome.payment.amount, outcome.new_balance),
            Some(keyboards::back_to_menu()),
        )
        .await?;
        for n in outcome.notifications {
            notify(&bot, n.telegram_id, n.text).await;
        }
        Ok(())
    }
    .await;
    finish(&bot, current.chat_id(), result).await
}
