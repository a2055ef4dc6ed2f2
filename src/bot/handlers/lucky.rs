use super::{Screen, show};
use crate::bot::keyboards;
use crate::bot::middleware::CurrentUser;
use crate::bot::texts;
use crate::error::{AppError, AppResult};
use crate::models::PaginationParams;
use crate::services::ServiceRegistry;
use teloxide::prelude::*;

const HISTORY_SIZE: u64 = 5;

pub async fn intro(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    if !services.config.lucky_game.enabled {
        return Err(AppError::ValidationError("Игра сейчас недоступна".into()));
    }
    let next = services.lucky_game.can_play(current.user.id).await?;
    let mut text = texts::lucky_intro(&services.config, next);
    let recent = services
        .lucky_game
        .history(current.user.id, &PaginationParams::new(Some(1), Some(HISTORY_SIZE)))
        .await?;
    if !recent.items.is_empty() {
        text.push_str("\n\nПоследние игры:\n");
        text.push_str(&texts::lucky_history(&recent.items));
    }
    show(bot, screen, text, keyboards::lucky_game(next.is_none())).await
}

pub async fn play(
    bot: &Bot,
    screen: Screen,
    services: &ServiceRegistry,
    current: &CurrentUser,
) -> AppResult<()> {
    let result = services.lucky_game.play(current.user.id).await?;
    show(
        bot,
        screen,
        texts::lucky_result(&result),
        keyboards::lucky_game(false),
    )
    .await
}
