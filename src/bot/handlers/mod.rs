pub mod admin;
pub mod lucky;
pub mod menu;
pub mod payment;
pub mod router;
pub mod shop;
pub mod support;

use crate::error::{AppError, AppResult};
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MaybeInaccessibleMessage, MessageId, ParseMode};

pub type HandlerResult = Result<(), AppError>;

/// Where a screen is drawn: a fresh message, or in place of the message
/// that carried the pressed button.
#[derive(Debug, Clone, Copy)]
pub struct Screen {
    pub chat_id: ChatId,
    pub message_id: Option<MessageId>,
}

impl Screen {
    pub fn new_message(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            message_id: None,
        }
    }

    pub fn from_callback(q: &CallbackQuery, fallback: ChatId) -> Self {
        match &q.message {
            Some(MaybeInaccessibleMessage::Regular(m)) => Self {
                chat_id: m.chat.id,
                message_id: Some(m.id),
            },
            Some(other) => Self::new_message(other.chat().id),
            None => Self::new_message(fallback),
        }
    }
}

pub async fn reply(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> AppResult<()> {
    let request = bot
        .send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html);
    match keyboard {
        Some(kb) => request.reply_markup(kb).await?,
        None => request.await?,
    };
    Ok(())
}

/// Edits the screen in place when possible and falls back to a new message
pub async fn show(
    bot: &Bot,
    screen: Screen,
    text: impl Into<String>,
    keyboard: InlineKeyboardMarkup,
) -> AppResult<()> {
    let text = text.into();
    let Some(message_id) = screen.message_id else {
        return reply(bot, screen.chat_id, text, Some(keyboard)).await;
    };
    let edited = bot
        .edit_message_text(screen.chat_id, message_id, text.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard.clone())
        .await;
    match edited {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(e) => {
            log::debug!("Cannot edit message {} in {}: {e}", message_id.0, screen.chat_id.0);
            reply(bot, screen.chat_id, text, Some(keyboard)).await
        }
    }
}

/// Best-effort message to someone other than the current chat
pub async fn notify(bot: &Bot, telegram_id: i64, text: impl Into<String>) {
    if let Err(e) = reply(bot, ChatId(telegram_id), text, None).await {
        log::warn!("Failed to notify {telegram_id}: {e}");
    }
}

/// Turns a handler error into a chat message. Only internal failures are
/// logged at error level.
pub async fn finish(bot: &Bot, chat_id: ChatId, result: AppResult<()>) -> HandlerResult {
    let Err(err) = result else {
        return Ok(());
    };
    let chat = chat_id.0;
    match &err {
        AppError::ValidationError(_)
        | AppError::NotFound(_)
        | AppError::Forbidden
        | AppError::InsufficientBalance { .. } => {
            log::debug!("Handler rejected request in {chat}: {err}")
        }
        _ => log::error!("Handler failed in {chat}: {err}"),
    }
    if let Err(e) = reply(bot, chat_id, err.user_message(), None).await {
        log::warn!("Cannot deliver error message to {chat}: {e}");
    }
    Ok(())
}
