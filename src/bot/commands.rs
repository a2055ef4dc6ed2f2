use teloxide::utils::command::BotCommands;

#[derive(Debug, Clone, PartialEq, Eq, BotCommands)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    /// Запуск бота
    Start(String),
    /// Главное меню
    Menu,
    /// Баланс и пополнение
    Balance,
    /// Активировать промокод
    Promo,
    /// Реферальная программа
    Referral,
    /// Поддержка
    Support,
    /// Панель администратора
    Admin,
    /// Справка
    Help,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_payload_is_captured() {
        assert_eq!(
            Command::parse("/start ref_ABC", "remna_shop_bot").unwrap(),
            Command::Start("ref_ABC".into())
        );
        assert_eq!(
            Command::parse("/menu", "remna_shop_bot").unwrap(),
            Command::Menu
        );
    }
}
