//! In-memory panel used by service tests.

use super::remnawave::*;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct FakePanel {
    users: Mutex<HashMap<String, PanelUser>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

impl FakePanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with ExternalApiError while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, user: PanelUser) {
        self.users
            .lock()
            .unwrap()
            .insert(user.uuid.clone(), user);
    }

    pub fn get(&self, uuid: &str) -> Option<PanelUser> {
        self.users.lock().unwrap().get(uuid).cloned()
    }

    pub fn remove(&self, uuid: &str) {
        self.users.lock().unwrap().remove(uuid);
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::ExternalApiError("panel is down".into()));
        }
        Ok(())
    }

    fn modify(&self, uuid: &str, f: impl FnOnce(&mut PanelUser)) -> AppResult<PanelUser> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(uuid)
            .ok_or_else(|| AppError::ExternalApiError(format!("no panel user {uuid}")))?;
        f(user);
        Ok(user.clone())
    }
}

#[async_trait]
impl PanelApi for FakePanel {
    async fn create_user(&self, req: &CreatePanelUser) -> AppResult<PanelUser> {
        self.check()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let user = PanelUser {
            uuid: format!("uuid-{n}"),
            short_uuid: Some(format!("short-{n}")),
            username: req.username.clone(),
            status: req.status,
            used_traffic_bytes: Some(0.0),
            traffic_limit_bytes: Some(req.traffic_limit_bytes),
            expire_at: req.expire_at,
            telegram_id: req.telegram_id,
            subscription_url: Some(format!("https://sub.example.com/short-{n}")),
            active_internal_squads: req
                .active_internal_squads
                .iter()
                .map(|uuid| SquadRef {
                    uuid: uuid.clone(),
                    name: None,
                })
                .collect(),
            description: req.description.clone(),
        };
        self.insert(user.clone());
        Ok(user)
    }

    async fn get_user_by_uuid(&self, uuid: &str) -> AppResult<Option<PanelUser>> {
        self.check()?;
        Ok(self.get(uuid))
    }

    async fn get_users_by_telegram_id(&self, telegram_id: i64) -> AppResult<Vec<PanelUser>> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.telegram_id == Some(telegram_id))
            .cloned()
            .collect())
    }

    async fn update_user(&self, req: &UpdatePanelUser) -> AppResult<PanelUser> {
        self.modify(&req.uuid, |user| {
            if let Some(status) = req.status {
                user.status = status;
            }
            if let Some(expire_at) = req.expire_at {
                user.expire_at = expire_at;
            }
            if let Some(limit) = req.traffic_limit_bytes {
                user.traffic_limit_bytes = Some(limit);
            }
            if let Some(squads) = &req.active_internal_squads {
                user.active_internal_squads = squads
                    .iter()
                    .map(|uuid| SquadRef {
                        uuid: uuid.clone(),
                        name: None,
                    })
                    .collect();
            }
            if req.telegram_id.is_some() {
                user.telegram_id = req.telegram_id;
            }
        })
    }

    async fn enable_user(&self, uuid: &str) -> AppResult<PanelUser> {
        self.modify(uuid, |u| u.status = PanelUserStatus::Active)
    }

    async fn disable_user(&self, uuid: &str) -> AppResult<PanelUser> {
        self.modify(uuid, |u| u.status = PanelUserStatus::Disabled)
    }

    async fn delete_user(&self, uuid: &str) -> AppResult<()> {
        self.check()?;
        self.remove(uuid);
        Ok(())
    }

    async fn reset_user_traffic(&self, uuid: &str) -> AppResult<PanelUser> {
        self.modify(uuid, |u| u.used_traffic_bytes = Some(0.0))
    }

    async fn get_users_page(&self, start: u64, size: u64) -> AppResult<PanelUsersPage> {
        self.check()?;
        let mut all: Vec<PanelUser> = self.users.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        let total = all.len() as u64;
        let users = all
            .into_iter()
            .skip(start as usize)
            .take(size as usize)
            .collect();
        Ok(PanelUsersPage { users, total })
    }

    async fn get_internal_squads(&self) -> AppResult<Vec<InternalSquad>> {
        self.check()?;
        Ok(vec![InternalSquad {
            uuid: "sq-default".into(),
            name: "Default".into(),
        }])
    }

    async fn get_system_stats(&self) -> AppResult<SystemStats> {
        self.check()?;
        let mut stats = SystemStats::default();
        stats.users.total_users = self.len() as u64;
        Ok(stats)
    }
}
