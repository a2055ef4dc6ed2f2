use crate::config::RemnaWaveConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const PAGE_SIZE: u64 = 500;

/// Every panel response is wrapped in `{"response": ...}`
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    response: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelUserStatus {
    Active,
    Disabled,
    Limited,
    Expired,
    #[serde(other)]
    Unknown,
}

impl PanelUserStatus {
    /// The panel will not serve a config for these
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            PanelUserStatus::Disabled | PanelUserStatus::Limited | PanelUserStatus::Expired
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquadRef {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelUser {
    pub uuid: String,
    #[serde(default)]
    pub short_uuid: Option<String>,
    pub username: String,
    pub status: PanelUserStatus,
    #[serde(default)]
    pub used_traffic_bytes: Option<f64>,
    #[serde(default)]
    pub traffic_limit_bytes: Option<i64>,
    pub expire_at: DateTime<Utc>,
    #[serde(default)]
    pub telegram_id: Option<i64>,
    #[serde(default)]
    pub subscription_url: Option<String>,
    #[serde(default)]
    pub active_internal_squads: Vec<SquadRef>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PanelUser {
    pub fn squad_uuids(&self) -> Vec<String> {
        self.active_internal_squads
            .iter()
            .map(|s| s.uuid.clone())
            .collect()
    }

    pub fn traffic_limit_gb(&self) -> i32 {
        crate::utils::bytes_to_gb(self.traffic_limit_bytes.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePanelUser {
    pub username: String,
    pub status: PanelUserStatus,
    pub expire_at: DateTime<Utc>,
    /// 0 = unlimited
    pub traffic_limit_bytes: i64,
    pub traffic_limit_strategy: String,
    pub telegram_id: Option<i64>,
    pub active_internal_squads: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePanelUser {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PanelUserStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_limit_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_internal_squads: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelUsersPage {
    #[serde(default)]
    pub users: Vec<PanelUser>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InternalSquad {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InternalSquadsResponse {
    #[serde(default)]
    internal_squads: Vec<InternalSquad>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemStats {
    pub users: UsersStats,
    pub online_stats: OnlineStats,
    pub nodes: NodesStats,
    pub memory: MemoryStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsersStats {
    pub total_users: u64,
    pub status_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnlineStats {
    pub online_now: u64,
    pub last_day: u64,
    pub last_week: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodesStats {
    pub total_online: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
}

/// Operations the bot needs from the VPN panel
#[async_trait]
pub trait PanelApi: Send + Sync {
    async fn create_user(&self, req: &CreatePanelUser) -> AppResult<PanelUser>;

    /// None when the panel does not know the uuid
    async fn get_user_by_uuid(&self, uuid: &str) -> AppResult<Option<PanelUser>>;

    async fn get_users_by_telegram_id(&self, telegram_id: i64) -> AppResult<Vec<PanelUser>>;

    async fn update_user(&self, req: &UpdatePanelUser) -> AppResult<PanelUser>;

    async fn enable_user(&self, uuid: &str) -> AppResult<PanelUser>;

    async fn disable_user(&self, uuid: &str) -> AppResult<PanelUser>;

    async fn delete_user(&self, uuid: &str) -> AppResult<()>;

    async fn reset_user_traffic(&self, uuid: &str) -> AppResult<PanelUser>;

    async fn get_users_page(&self, start: u64, size: u64) -> AppResult<PanelUsersPage>;

    /// Walks the paginated user list until the panel runs out of users
    async fn get_all_users(&self) -> AppResult<Vec<PanelUser>> {
        let mut all = Vec::new();
        let mut start = 0;
        loop {
            let page = self.get_users_page(start, PAGE_SIZE).await?;
            let fetched = page.users.len() as u64;
            all.extend(page.users);
            start += fetched;
            if fetched == 0 || start >= page.total {
                break;
            }
        }
        Ok(all)
    }

    async fn get_internal_squads(&self) -> AppResult<Vec<InternalSquad>>;

    async fn get_system_stats(&self) -> AppResult<SystemStats>;
}

#[derive(Clone)]
pub struct RemnaWaveClient {
    client: Client,
    config: RemnaWaveConfig,
}

impl RemnaWaveClient {
    pub fn new(config: RemnaWaveConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .bearer_auth(&self.config.api_token)
            // the panel refuses plain http unless it looks proxied
            .header("X-Forwarded-Proto", "https")
            .header("X-Forwarded-For", "127.0.0.1")
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> AppResult<T> {
        self.send_optional(req).await?.ok_or_else(|| {
            AppError::ExternalApiError("RemnaWave: resource not found (404)".to_string())
        })
    }

    /// 404 maps to `Ok(None)`, other non-2xx to `ExternalApiError`
    async fn send_optional<T: DeserializeOwned>(&self, req: RequestBuilder) -> AppResult<Option<T>> {
        let response = req.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("RemnaWave API error {status}: {body}");
            return Err(AppError::ExternalApiError(format!(
                "RemnaWave responded {status}: {body}"
            )));
        }

        let result: ApiResponse<T> = response.json().await?;
        Ok(Some(result.response))
    }
}

#[async_trait]
impl PanelApi for RemnaWaveClient {
    async fn create_user(&self, req: &CreatePanelUser) -> AppResult<PanelUser> {
        let user: PanelUser = self
            .send(self.request(Method::POST, "/api/users").json(req))
            .await?;
        log::info!("RemnaWave user created: {} ({})", user.username, user.uuid);
        Ok(user)
    }

    async fn get_user_by_uuid(&self, uuid: &str) -> AppResult<Option<PanelUser>> {
        self.send_optional(self.request(Method::GET, &format!("/api/users/{uuid}")))
            .await
    }

    async fn get_users_by_telegram_id(&self, telegram_id: i64) -> AppResult<Vec<PanelUser>> {
        let users = self
            .send_optional(self.request(
                Method::GET,
                &format!("/api/users/by-telegram-id/{telegram_id}"),
            ))
            .await?;
        Ok(users.unwrap_or_default())
    }

    async fn update_user(&self, req: &UpdatePanelUser) -> AppResult<PanelUser> {
        self.send(self.request(Method::PATCH, "/api/users").json(req))
            .await
    }

    async fn enable_user(&self, uuid: &str) -> AppResult<PanelUser> {
        self.send(self.request(Method::POST, &format!("/api/users/{uuid}/actions/enable")))
            .await
    }

    async fn disable_user(&self, uuid: &str) -> AppResult<PanelUser> {
        self.send(self.request(Method::POST, &format!("/api/users/{uuid}/actions/disable")))
            .await
    }

    async fn delete_user(&self, uuid: &str) -> AppResult<()> {
        let _: serde_json::Value = self
            .send(self.request(Method::DELETE, &format!("/api/users/{uuid}")))
            .await?;
        log::info!("RemnaWave user deleted: {uuid}");
        Ok(())
    }

    async fn reset_user_traffic(&self, uuid: &str) -> AppResult<PanelUser> {
        self.send(self.request(
            Method::POST,
            &format!("/api/users/{uuid}/actions/reset-traffic"),
        ))
        .await
    }

    async fn get_users_page(&self, start: u64, size: u64) -> AppResult<PanelUsersPage> {
        self.send(
            self.request(Method::GET, "/api/users")
                .query(&[("start", start), ("size", size)]),
        )
        .await
    }

    async fn get_internal_squads(&self) -> AppResult<Vec<InternalSquad>> {
        let res: InternalSquadsResponse = self
            .send(self.request(Method::GET, "/api/internal-squads"))
            .await?;
        Ok(res.internal_squads)
    }

    async fn get_system_stats(&self) -> AppResult<SystemStats> {
        self.send(self.request(Method::GET, "/api/system/stats"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RemnaWaveClient {
        RemnaWaveClient::new(RemnaWaveConfig {
            base_url: server.uri(),
            api_token: "token".to_string(),
            default_squad_uuids: vec![],
            username_prefix: "tg".to_string(),
        })
        .unwrap()
    }

    fn panel_user_json(uuid: &str, tg: i64) -> serde_json::Value {
        json!({
            "uuid": uuid,
            "shortUuid": "short",
            "username": format!("tg_{tg}"),
            "status": "ACTIVE",
            "usedTrafficBytes": 1024,
            "trafficLimitBytes": 10737418240i64,
            "expireAt": "2030-01-01T00:00:00.000Z",
            "telegramId": tg,
            "subscriptionUrl": "https://sub.example.com/short",
            "activeInternalSquads": [{"uuid": "sq-1", "name": "Default"}]
        })
    }

    #[tokio::test]
    async fn test_get_user_by_uuid_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u-1"))
            .and(header("authorization", "Bearer token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": panel_user_json("u-1", 42) })),
            )
            .mount(&server)
            .await;

        let user = client_for(&server)
            .get_user_by_uuid("u-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.uuid, "u-1");
        assert_eq!(user.telegram_id, Some(42));
        assert_eq!(user.status, PanelUserStatus::Active);
        assert_eq!(user.traffic_limit_gb(), 10);
        assert_eq!(user.squad_uuids(), vec!["sq-1".to_string()]);
    }

    #[tokio::test]
    async fn test_lookup_404_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.get_user_by_uuid("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_success_is_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(400).set_body_string("username taken"))
            .mount(&server)
            .await;

        let req = CreatePanelUser {
            username: "tg_1".into(),
            status: PanelUserStatus::Active,
            expire_at: Utc::now(),
            traffic_limit_bytes: 0,
            traffic_limit_strategy: "NO_RESET".into(),
            telegram_id: Some(1),
            active_internal_squads: vec![],
            description: None,
        };
        match client_for(&server).create_user(&req).await {
            Err(AppError::ExternalApiError(msg)) => assert!(msg.contains("username taken")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_user_sends_only_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/users"))
            .and(body_partial_json(json!({ "uuid": "u-1", "status": "DISABLED" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": panel_user_json("u-1", 42) })),
            )
            .mount(&server)
            .await;

        let req = UpdatePanelUser {
            uuid: "u-1".into(),
            status: Some(PanelUserStatus::Disabled),
            ..Default::default()
        };
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("expireAt").is_none());
        assert!(client_for(&server).update_user(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_all_users_walks_pages() {
        let server = MockServer::start().await;
        let first: Vec<_> = (0..PAGE_SIZE as i64)
            .map(|i| panel_user_json(&format!("u-{i}"), i))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "response": { "users": first, "total": PAGE_SIZE + 1 } }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .and(query_param("start", PAGE_SIZE.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "users": [panel_user_json("last", 9999)], "total": PAGE_SIZE + 1 }
            })))
            .mount(&server)
            .await;

        let users = client_for(&server).get_all_users().await.unwrap();
        assert_eq!(users.len() as u64, PAGE_SIZE + 1);
        assert_eq!(users.last().unwrap().uuid, "last");
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let mut raw = panel_user_json("u-1", 1);
        raw["status"] = json!("ON_HOLD");
        let user: PanelUser = serde_json::from_value(raw).unwrap();
        assert_eq!(user.status, PanelUserStatus::Unknown);
        assert!(!user.status.is_blocking());
    }
}
