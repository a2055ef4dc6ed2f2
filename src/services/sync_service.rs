use crate::entities::{user_entity as users, user_subscription_entity as user_subs};
use crate::error::{AppError, AppResult};
use crate::external::{PanelApi, PanelUser};
use crate::models::SyncReport;
use crate::utils::join_uuid_list;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What reconciling one local row against the panel did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Unchanged,
    Updated,
    Deactivated,
}

#[derive(Clone)]
pub struct SyncService {
    pool: DatabaseConnection,
    panel: Arc<dyn PanelApi>,
}

impl SyncService {
    pub fn new(pool: DatabaseConnection, panel: Arc<dyn PanelApi>) -> Self {
        Self { pool, panel }
    }

    /// Reconciles every local subscription with the panel, then imports panel
    /// users that belong to known Telegram users but have no local row.
    pub async fn sync_all(&self) -> AppResult<SyncReport> {
        let panel_users = self.panel.get_all_users().await?;
        let by_uuid: HashMap<&str, &PanelUser> =
            panel_users.iter().map(|u| (u.uuid.as_str(), u)).collect();

        let rows = user_subs::Entity::find()
            .filter(user_subs::Column::RemnawaveUuid.is_not_null())
            .all(&self.pool)
            .await?;

        let mut report = SyncReport::default();
        let now = Utc::now();
        let mut known: HashSet<String> = HashSet::new();

        for row in rows {
            let Some(uuid) = row.remnawave_uuid.clone() else {
                continue;
            };
            report.checked += 1;
            known.insert(uuid.clone());
            let panel_user = by_uuid.get(uuid.as_str()).copied();
            match self.reconcile(row, panel_user, now).await {
                Ok(outcome) => count(&mut report, outcome),
                Err(e) => {
                    log::error!("Failed to sync subscription {uuid}: {e}");
                    report.errors += 1;
                }
            }
        }

        let candidates: Vec<&PanelUser> = panel_users
            .iter()
            .filter(|u| u.telegram_id.is_some() && !known.contains(&u.uuid))
            .collect();
        if !candidates.is_empty() {
            let tg_ids: Vec<i64> = candidates.iter().filter_map(|u| u.telegram_id).collect();
            let local_users: HashMap<i64, users::Model> = users::Entity::find()
                .filter(users::Column::TelegramId.is_in(tg_ids))
                .all(&self.pool)
                .await?
                .into_iter()
                .map(|u| (u.telegram_id, u))
                .collect();

            for panel_user in candidates {
                let Some(user) = panel_user.telegram_id.and_then(|id| local_users.get(&id)) else {
                    continue;
                };
                match self.import(user, panel_user, now).await {
                    Ok(()) => report.imported += 1,
                    Err(e) => {
                        log::error!("Failed to import panel user {}: {e}", panel_user.uuid);
                        report.errors += 1;
                    }
                }
            }
        }

        log::info!(
            "RemnaWave sync: checked {}, updated {}, deactivated {}, imported {}, errors {}",
            report.checked,
            report.updated,
            report.deactivated,
            report.imported,
            report.errors
        );
        Ok(report)
    }

    /// Same reconciliation for a single user, fetching panel users one by one
    pub async fn sync_user(&self, user_id: i32) -> AppResult<SyncReport> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))?;
        let rows = user_subs::Entity::find()
            .filter(user_subs::Column::UserId.eq(user_id))
            .filter(user_subs::Column::RemnawaveUuid.is_not_null())
            .all(&self.pool)
            .await?;

        let mut report = SyncReport::default();
        let now = Utc::now();
        let mut known: HashSet<String> = HashSet::new();

        for row in rows {
            let Some(uuid) = row.remnawave_uuid.clone() else {
                continue;
            };
            report.checked += 1;
            known.insert(uuid.clone());
            let result = match self.panel.get_user_by_uuid(&uuid).await {
                Ok(panel_user) => self.reconcile(row, panel_user.as_ref(), now).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(outcome) => count(&mut report, outcome),
                Err(e) => {
                    log::warn!("Failed to sync subscription {uuid} of user {user_id}: {e}");
                    report.errors += 1;
                }
            }
        }

        match self.panel.get_users_by_telegram_id(user.telegram_id).await {
            Ok(panel_users) => {
                for panel_user in panel_users.iter().filter(|u| !known.contains(&u.uuid)) {
                    match self.import(&user, panel_user, now).await {
                        Ok(()) => report.imported += 1,
                        Err(e) => {
                            log::warn!("Failed to import panel user {}: {e}", panel_user.uuid);
                            report.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Panel lookup by telegram id {} failed: {e}", user.telegram_id);
                report.errors += 1;
            }
        }

        Ok(report)
    }

    async fn reconcile(
        &self,
        row: user_subs::Model,
        panel_user: Option<&PanelUser>,
        now: DateTime<Utc>,
    ) -> AppResult<RowOutcome> {
        let Some(panel_user) = panel_user else {
            if !row.is_active {
                return Ok(RowOutcome::Unchanged);
            }
            log::info!(
                "Subscription {} is gone from the panel, deactivating",
                row.id
            );
            let mut am = row.into_active_model();
            am.is_active = Set(false);
            am.updated_at = Set(now);
            am.update(&self.pool).await?;
            return Ok(RowOutcome::Deactivated);
        };

        let panel_active = !panel_user.status.is_blocking() && panel_user.expire_at > now;
        let traffic_limit_gb = panel_user.traffic_limit_gb();
        let was_active = row.is_active;

        let mut changed = false;
        let mut am = row.clone().into_active_model();
        // the panel keeps milliseconds, postgres microseconds
        if (row.expires_at - panel_user.expire_at).num_seconds() != 0 {
            am.expires_at = Set(panel_user.expire_at);
            if panel_user.expire_at > row.expires_at {
                am.expiry_notified = Set(false);
            }
            changed = true;
        }
        if row.traffic_limit_gb != traffic_limit_gb {
            am.traffic_limit_gb = Set(traffic_limit_gb);
            changed = true;
        }
        if panel_user.subscription_url.is_some() && row.subscription_url != panel_user.subscription_url
        {
            am.subscription_url = Set(panel_user.subscription_url.clone());
            changed = true;
        }
        if panel_user.short_uuid.is_some() && row.short_uuid != panel_user.short_uuid {
            am.short_uuid = Set(panel_user.short_uuid.clone());
            changed = true;
        }
        if was_active != panel_active {
            am.is_active = Set(panel_active);
            changed = true;
        }

        if !changed {
            return Ok(RowOutcome::Unchanged);
        }
        am.updated_at = Set(now);
        am.update(&self.pool).await?;

        if was_active && !panel_active {
            log::info!(
                "Subscription {} deactivated by panel state {:?}",
                row.id,
                panel_user.status
            );
            Ok(RowOutcome::Deactivated)
        } else {
            Ok(RowOutcome::Updated)
        }
    }

    async fn import(
        &self,
        user: &users::Model,
        panel_user: &PanelUser,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let squads = panel_user.squad_uuids();
        user_subs::ActiveModel {
            user_id: Set(user.id),
            subscription_id: Set(None),
            remnawave_uuid: Set(Some(panel_user.uuid.clone())),
            short_uuid: Set(panel_user.short_uuid.clone()),
            subscription_url: Set(panel_user.subscription_url.clone()),
            expires_at: Set(panel_user.expire_at),
            traffic_limit_gb: Set(panel_user.traffic_limit_gb()),
            squad_uuids: Set(join_uuid_list(&squads)),
            is_active: Set(!panel_user.status.is_blocking() && panel_user.expire_at > now),
            is_trial: Set(false),
            auto_renew: Set(false),
            expiry_notified: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        if user.remnawave_uuid.is_none() {
            let mut am = user.clone().into_active_model();
            am.remnawave_uuid = Set(Some(panel_user.uuid.clone()));
            am.updated_at = Set(now);
            am.update(&self.pool).await?;
        }
        log::info!(
            "Imported panel user {} for telegram id {}",
            panel_user.uuid,
            user.telegram_id
        );
        Ok(())
    }
}

fn count(report: &mut SyncReport, outcome: RowOutcome) {
    match outcome {
        RowOutcome::Unchanged => {}
        RowOutcome::Updated => report.updated += 1,
        RowOutcome::Deactivated => report.deactivated += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{PanelUserStatus, UpdatePanelUser};
    use crate::external::remnawave::SquadRef;
    use crate::services::test_support::*;
    use chrono::Duration;

    fn panel_user(uuid: &str, tg: i64, expire_at: DateTime<Utc>) -> PanelUser {
        PanelUser {
            uuid: uuid.into(),
            short_uuid: Some(format!("s-{uuid}")),
            username: format!("tg_{tg}"),
            status: PanelUserStatus::Active,
            used_traffic_bytes: None,
            traffic_limit_bytes: Some(crate::utils::gb_to_bytes(50)),
            expire_at,
            telegram_id: Some(tg),
            subscription_url: Some(format!("https://sub/{uuid}")),
            active_internal_squads: vec![SquadRef {
                uuid: "sq".into(),
                name: None,
            }],
            description: None,
        }
    }

    #[tokio::test]
    async fn test_sync_adopts_panel_expiry_and_deactivates_missing() {
        let ctx = setup().await;
        let a = seed_user_with_balance(&ctx.pool, 200, 100_000).await;
        let b = seed_user_with_balance(&ctx.pool, 201, 100_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let subs = &ctx.services.subscriptions;
        let sub_a = subs.purchase(a.id, plan.id).await.unwrap().subscription;
        let sub_b = subs.purchase(b.id, plan.id).await.unwrap().subscription;

        let new_expiry = sub_a.expires_at + Duration::days(5);
        ctx.panel
            .update_user(&UpdatePanelUser {
                uuid: sub_a.remnawave_uuid.clone().unwrap(),
                expire_at: Some(new_expiry),
                ..Default::default()
            })
            .await
            .unwrap();
        ctx.panel.remove(sub_b.remnawave_uuid.as_deref().unwrap());

        let report = ctx.services.sync.sync_all().await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deactivated, 1);
        assert_eq!(report.errors, 0);

        let a_now = subs.active_subscription(a.id).await.unwrap().unwrap();
        assert_eq!(a_now.expires_at, new_expiry);
        assert!(subs.active_subscription(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_deactivates_disabled_and_reactivates() {
        let ctx = setup().await;
        let user = seed_user_with_balance(&ctx.pool, 210, 100_000).await;
        let plan = seed_plan(&ctx.pool, 10_000, 30).await;
        let sub = ctx
            .services
            .subscriptions
            .purchase(user.id, plan.id)
            .await
            .unwrap()
            .subscription;
        let uuid = sub.remnawave_uuid.clone().unwrap();

        ctx.panel.disable_user(&uuid).await.unwrap();
        let report = ctx.services.sync.sync_user(user.id).await.unwrap();
        assert_eq!(report.deactivated, 1);

        ctx.panel.enable_user(&uuid).await.unwrap();
        let report = ctx.services.sync.sync_user(user.id).await.unwrap();
        assert_eq!(report.updated, 1);
        assert!(
            ctx.services
                .subscriptions
                .active_subscription(user.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_sync_imports_panel_users_of_known_telegram_ids() {
        let ctx = setup().await;
        let user = seed_user(&ctx.pool, 220).await;
        ctx.panel
            .insert(panel_user("external-1", 220, Utc::now() + Duration::days(10)));
        // unknown telegram id is skipped
        ctx.panel
            .insert(panel_user("external-2", 999_999, Utc::now() + Duration::days(10)));

        let report = ctx.services.sync.sync_all().await.unwrap();
        assert_eq!(report.imported, 1);

        let sub = ctx
            .services
            .subscriptions
            .active_subscription(user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.remnawave_uuid.as_deref(), Some("external-1"));
        assert_eq!(sub.traffic_limit_gb, 50);

        // second run sees it as known
        let report = ctx.services.sync.sync_all().await.unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn test_sync_all_fails_when_panel_is_down() {
        let ctx = setup().await;
        ctx.panel.set_failing(true);
        assert!(ctx.services.sync.sync_all().await.is_err());
    }
}
