pub mod callback;
pub mod commands;
pub mod handlers;
pub mod keyboards;
pub mod middleware;
pub mod states;
pub mod texts;

use crate::error::AppError;
use crate::services::ServiceRegistry;
use commands::Command;
use handlers::{payment, router};
use states::State;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

/// Update routing. Messages and callbacks pass the user middleware first;
/// pre-checkout queries are answered without it.
pub fn schema() -> UpdateHandler<AppError> {
    let messages = Update::filter_message()
        .filter_map_async(middleware::resolve_message_user)
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(
            dptree::filter(|msg: Message| msg.successful_payment().is_some())
                .endpoint(payment::on_successful_payment),
        )
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(router::on_command),
        )
        .branch(dptree::endpoint(router::on_text));

    let callbacks = Update::filter_callback_query()
        .filter_map_async(middleware::resolve_callback_user)
        .enter_dialogue::<CallbackQuery, InMemStorage<State>, State>()
        .endpoint(router::on_callback);

    let pre_checkout = Update::filter_pre_checkout_query().endpoint(payment::on_pre_checkout);

    dptree::entry()
        .branch(messages)
        .branch(callbacks)
        .branch(pre_checkout)
}

pub async fn run_bot(bot: Bot, services: ServiceRegistry) {
    log::info!("Starting bot dispatcher...");

    match bot.get_me().await {
        Ok(me) => log::info!(
            "Bot connected as @{}",
            me.username.as_deref().unwrap_or("unknown")
        ),
        Err(e) => {
            log::error!("Bot failed to connect to Telegram: {e}");
            return;
        }
    }
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Failed to register bot commands: {e}");
    }

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![services, InMemStorage::<State>::new()])
        .default_handler(|upd: std::sync::Arc<Update>| async move {
            log::debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Bot dispatcher stopped");
}
