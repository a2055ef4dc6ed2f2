//! Resolves the local user behind every message and callback before any
//! feature handler runs.

use crate::entities::user_entity as users;
use crate::models::TelegramProfile;
use crate::services::ServiceRegistry;
use teloxide::prelude::*;

const BANNED_TEXT: &str = "⛔ Ваш аккаунт заблокирован. Обратитесь в поддержку.";

/// The user an update belongs to, injected into handlers
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: users::Model,
    pub is_admin: bool,
    /// created by this update
    pub is_new: bool,
}

impl CurrentUser {
    pub fn chat_id(&self) -> ChatId {
        ChatId(self.user.telegram_id)
    }
}

/// `/start <payload>` argument, if the message is a start command
fn start_payload(text: Option<&str>) -> Option<&str> {
    let rest = text?.strip_prefix("/start")?;
    let payload = rest.trim();
    (!payload.is_empty()).then_some(payload)
}

async fn resolve(
    bot: &Bot,
    services: &ServiceRegistry,
    from: &teloxide::types::User,
    payload: Option<&str>,
) -> Option<CurrentUser> {
    if from.is_bot {
        return None;
    }
    let profile = TelegramProfile::from_teloxide(from);
    let (user, is_new) = match services.users.get_or_create(&profile, payload).await {
        Ok(resolved) => resolved,
        Err(e) => {
            log::error!("Failed to resolve user {}: {e}", profile.telegram_id);
            if let Err(e) = bot
                .send_message(ChatId(profile.telegram_id), e.user_message())
                .await
            {
                log::debug!("Cannot report resolve failure to {}: {e}", profile.telegram_id);
            }
            return None;
        }
    };

    let is_admin = services.users.is_admin(user.telegram_id);
    if user.is_banned && !is_admin {
        log::debug!("Dropping update from banned user {}", user.telegram_id);
        if let Err(e) = bot.send_message(ChatId(user.telegram_id), BANNED_TEXT).await {
            log::debug!("Ban notice to {} failed: {e}", user.telegram_id);
        }
        return None;
    }
    Some(CurrentUser {
        user,
        is_admin,
        is_new,
    })
}

pub async fn resolve_message_user(
    bot: Bot,
    msg: Message,
    services: ServiceRegistry,
) -> Option<CurrentUser> {
    // groups and channels are not served
    if !msg.chat.is_private() {
        return None;
    }
    let from = msg.from.as_ref()?;
    resolve(&bot, &services, from, start_payload(msg.text())).await
}

pub async fn resolve_callback_user(
    bot: Bot,
    q: CallbackQuery,
    services: ServiceRegistry,
) -> Option<CurrentUser> {
    let current = resolve(&bot, &services, &q.from, None).await;
    if current.is_none() {
        if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
            log::debug!("Callback answer for unresolved user failed: {e}");
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_payload() {
        assert_eq!(start_payload(Some("/start ref_ABC")), Some("ref_ABC"));
        assert_eq!(start_payload(Some("/start")), None);
        assert_eq!(start_payload(Some("/start   ")), None);
        assert_eq!(start_payload(Some("hello")), None);
        assert_eq!(start_payload(None), None);
    }

    fn telegram_user(id: i64) -> teloxide::types::User {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "is_bot": false,
            "first_name": "Test"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_banned_user_dropped_even_if_notice_fails() {
        use crate::services::test_support::{seed_user, setup};
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 5150).await;
        let telegram = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&telegram)
            .await;
        let bot = Bot::new("0:test").set_api_url(reqwest::Url::parse(&telegram.uri()).unwrap());

        let current = resolve(&bot, &ctx.services, &telegram_user(5150), None).await;
        assert_eq!(current.unwrap().user.id, user.id);
        assert!(telegram.received_requests().await.unwrap().is_empty());

        ctx.services.users.set_banned(user.id, true).await.unwrap();
        assert!(
            resolve(&bot, &ctx.services, &telegram_user(5150), None)
                .await
                .is_none()
        );
        assert_eq!(telegram.received_requests().await.unwrap().len(), 1);
    }
}
