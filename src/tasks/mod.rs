//! Background scheduled tasks.
//!
//! Call `spawn_all` once during startup; every job runs detached on its own
//! schedule and only logs its failures.

use crate::bot::handlers::notify;
use crate::bot::texts;
use crate::error::AppResult;
use crate::services::ServiceRegistry;
use std::time::Duration;
use teloxide::Bot;

const EXPIRY_SWEEP_EVERY: Duration = Duration::from_secs(3600);
const REMINDER_WINDOW_HOURS: i64 = 24;

/// A message for one user produced by the expiry sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub telegram_id: i64,
    pub text: String,
}

pub fn spawn_all(services: ServiceRegistry, bot: Bot) {
    // RemnaWave -> local reconciliation
    if services.config.sync.enabled {
        let svc = services.clone();
        let every = Duration::from_secs(svc.config.sync.interval_minutes.max(1) * 60);
        tokio::spawn(async move {
            loop {
                match svc.sync.sync_all().await {
                    Ok(report) if report.updated + report.deactivated + report.imported > 0 => {
                        log::info!("Panel sync: {report:?}")
                    }
                    Ok(report) => log::debug!("Panel sync: {report:?}"),
                    Err(e) => log::error!("Panel sync failed: {e:?}"),
                }
                tokio::time::sleep(every).await;
            }
        });
    }

    // expired subscriptions and 24h reminders (hourly)
    {
        let svc = services.clone();
        tokio::spawn(async move {
            loop {
                match expiry_sweep(&svc).await {
                    Ok(notices) => {
                        if !notices.is_empty() {
                            log::info!("Expiry sweep produced {} notices", notices.len());
                        }
                        for n in notices {
                            notify(&bot, n.telegram_id, n.text).await;
                        }
                    }
                    Err(e) => log::error!("Expiry sweep failed: {e:?}"),
                }
                tokio::time::sleep(EXPIRY_SWEEP_EVERY).await;
            }
        });
    }
}

/// Deactivates expired rows and picks subscriptions due for the one-time
/// reminder. Reminders are marked as sent before delivery.
pub async fn expiry_sweep(services: &ServiceRegistry) -> AppResult<Vec<ExpiryNotice>> {
    let mut notices = Vec::new();

    for sub in services.subscriptions.deactivate_expired().await? {
        match services.users.find_by_id(sub.user_id).await? {
            Some(user) => notices.push(ExpiryNotice {
                telegram_id: user.telegram_id,
                text: texts::expired_notice(),
            }),
            None => log::warn!("Expired subscription {} has no user {}", sub.id, sub.user_id),
        }
    }

    for sub in services
        .subscriptions
        .expiring_within(REMINDER_WINDOW_HOURS)
        .await?
    {
        services.subscriptions.mark_expiry_notified(sub.id).await?;
        if let Some(user) = services.users.find_by_id(sub.user_id).await? {
            notices.push(ExpiryNotice {
                telegram_id: user.telegram_id,
                text: texts::expiring_notice(&sub),
            });
        }
    }
    Ok(notices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user_subscription_entity as user_subs;
    use crate::services::test_support::{seed_user, setup};
    use chrono::{DateTime, Utc};
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};

    async fn seed_subscription(
        pool: &crate::database::DbPool,
        user_id: i32,
        expires_at: DateTime<Utc>,
    ) -> user_subs::Model {
        let now = Utc::now();
        user_subs::ActiveModel {
            user_id: Set(user_id),
            subscription_id: Set(None),
            remnawave_uuid: Set(None),
            short_uuid: Set(None),
            subscription_url: Set(None),
            expires_at: Set(expires_at),
            traffic_limit_gb: Set(0),
            squad_uuids: Set(None),
            is_active: Set(true),
            is_trial: Set(false),
            auto_renew: Set(false),
            expiry_notified: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_expiry_sweep_notifies_once() {
        let ctx = setup().await;
        let expired_owner = seed_user(&ctx.pool, 100).await;
        let soon_owner = seed_user(&ctx.pool, 200).await;
        let later_owner = seed_user(&ctx.pool, 300).await;
        let now = Utc::now();
        let expired = seed_subscription(&ctx.pool, expired_owner.id, now - chrono::Duration::hours(1)).await;
        seed_subscription(&ctx.pool, soon_owner.id, now + chrono::Duration::hours(5)).await;
        seed_subscription(&ctx.pool, later_owner.id, now + chrono::Duration::days(10)).await;

        let notices = expiry_sweep(&ctx.services).await.unwrap();
        let mut recipients: Vec<i64> = notices.iter().map(|n| n.telegram_id).collect();
        recipients.sort();
        assert_eq!(recipients, vec![100, 200]);

        let row = user_subs::Entity::find_by_id(expired.id)
            .one(&ctx.pool)
            .await
            .unwrap()
            .unwrap();
        assert!(!row.is_active);

        // second pass has nothing new to say
        assert!(expiry_sweep(&ctx.services).await.unwrap().is_empty());
    }
}
