use crate::bot::handlers::notify;
use crate::bot::texts;
use crate::models::{HealthResponse, TributeOutcome, TributeWebhook, WebhookAck};
use crate::services::ServiceRegistry;
use actix_web::{HttpRequest, HttpResponse, Result, web};
use log::{error, info, warn};
use teloxide::Bot;

const SIGNATURE_HEADER: &str = "trbt-signature";

/// Tribute webhook handler
///
/// The signature is a hex HMAC-SHA256 of the raw body keyed by the Tribute API key.
/// Once the signature checks out the endpoint always answers 200 so Tribute does not
/// keep retrying a payload that will fail the same way.
#[utoipa::path(
    post,
    path = "/tribute/webhook",
    tag = "webhook",
    request_body = TributeWebhook,
    params(
        ("trbt-signature" = String, Header, description = "hex HMAC-SHA256 of the body")
    ),
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Invalid signature")
    )
)]
pub async fn tribute_webhook(
    req: HttpRequest,
    body: web::Bytes,
    services: web::Data<ServiceRegistry>,
    bot: web::Data<Bot>,
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !services.payments.verify_tribute_signature(&body, signature) {
        warn!("Tribute webhook with invalid or missing signature");
        return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid signature"
        })));
    }

    let webhook: TributeWebhook = match serde_json::from_slice(&body) {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!("Malformed Tribute webhook: {e}");
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid payload"
            })));
        }
    };
    info!("Received Tribute webhook event: {}", webhook.name);

    match services.payments.process_tribute(webhook).await {
        Ok(TributeOutcome::Credited {
            telegram_id,
            amount,
            new_balance,
            notifications,
        }) => {
            notify(&bot, telegram_id, texts::topup_credited(amount, new_balance)).await;
            for n in notifications {
                notify(&bot, n.telegram_id, n.text).await;
            }
            Ok(HttpResponse::Ok().json(WebhookAck::ok()))
        }
        Ok(TributeOutcome::Duplicate) => {
            info!("Tribute donation already credited");
            Ok(HttpResponse::Ok().json(WebhookAck::ok()))
        }
        Ok(TributeOutcome::Ignored(reason)) => {
            info!("Tribute webhook ignored: {reason}");
            Ok(HttpResponse::Ok().json(WebhookAck::ok()))
        }
        Err(e) => {
            error!("Failed to process Tribute webhook: {e}");
            Ok(HttpResponse::Ok().json(WebhookAck::failed(format!("Processing failed: {e}"))))
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health(pool: web::Data<sea_orm::DatabaseConnection>) -> HttpResponse {
    let database = match pool.ping().await {
        Ok(()) => true,
        Err(e) => {
            error!("Health check database ping failed: {e}");
            false
        }
    };
    let body = HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    if database {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Webhook and health routes
pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/tribute/webhook", web::post().to(tribute_webhook))
        .route("/health", web::get().to(health));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_user, setup};
    use crate::utils::hmac_sha256_hex;
    use actix_web::{App, test};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "tribute-secret";

    async fn app_services() -> (ServiceRegistry, sea_orm::DatabaseConnection) {
        let ctx = setup().await;
        assert_eq!(ctx.config.payments.tribute_api_key, KEY);
        (ctx.services, ctx.pool)
    }

    fn donation(telegram_id: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "name": "new_donation",
            "created_at": "2025-03-01T10:00:00Z",
            "payload": {
                "donation_request_id": 77,
                "amount": 50_000,
                "currency": "rub",
                "telegram_user_id": telegram_id
            }
        }))
        .unwrap()
    }

    #[actix_web::test]
    async fn test_tribute_webhook_rejects_bad_signature() {
        let (services, pool) = app_services().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(services))
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(Bot::new("0:test")))
                .configure(webhook_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/tribute/webhook")
            .insert_header((SIGNATURE_HEADER, "deadbeef"))
            .set_payload(donation(1))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_tribute_webhook_reports_unknown_donor_with_200() {
        let (services, pool) = app_services().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(services))
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(Bot::new("0:test")))
                .configure(webhook_config),
        )
        .await;

        let body = donation(999_999);
        let req = test::TestRequest::post()
            .uri("/tribute/webhook")
            .insert_header((SIGNATURE_HEADER, hmac_sha256_hex(KEY, &body)))
            .set_payload(body)
            .to_request();
        let ack: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ack["received"], true);
        assert!(ack["error"].as_str().is_some());
    }

    #[actix_web::test]
    async fn test_tribute_webhook_credits_donation_once() {
        let (services, pool) = app_services().await;
        let user = seed_user(&pool, 4343).await;
        let telegram = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&telegram)
            .await;
        let bot = Bot::new("0:test").set_api_url(reqwest::Url::parse(&telegram.uri()).unwrap());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(services.clone()))
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(bot))
                .configure(webhook_config),
        )
        .await;

        let body = donation(4343);
        let signed = |body: Vec<u8>| {
            test::TestRequest::post()
                .uri("/tribute/webhook")
                .insert_header((SIGNATURE_HEADER, hmac_sha256_hex(KEY, &body)))
                .set_payload(body)
                .to_request()
        };
        let ack: serde_json::Value = test::call_and_read_body_json(&app, signed(body.clone())).await;
        assert_eq!(ack["received"], true);
        assert!(ack.get("error").is_none());
        assert_eq!(services.users.get(user.id).await.unwrap().balance, 50_000);
        // the donor is told about the top-up
        assert_eq!(telegram.received_requests().await.unwrap().len(), 1);

        // Tribute retries deliver the same body again
        let ack: serde_json::Value = test::call_and_read_body_json(&app, signed(body)).await;
        assert_eq!(ack["received"], true);
        assert_eq!(services.users.get(user.id).await.unwrap().balance, 50_000);
        assert_eq!(telegram.received_requests().await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_tribute_webhook_acknowledges_other_events() {
        let (services, pool) = app_services().await;
        let user = seed_user(&pool, 4242).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(services.clone()))
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(Bot::new("0:test")))
                .configure(webhook_config),
        )
        .await;

        let body = serde_json::to_vec(&serde_json::json!({
            "name": "new_subscription",
            "payload": {}
        }))
        .unwrap();
        let req = test::TestRequest::post()
            .uri("/tribute/webhook")
            .insert_header((SIGNATURE_HEADER, hmac_sha256_hex(KEY, &body)))
            .set_payload(body)
            .to_request();
        let ack: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ack["received"], true);
        assert!(ack.get("error").is_none());

        let user = services.users.get(user.id).await.unwrap();
        assert_eq!(user.balance, 0);
    }

    #[actix_web::test]
    async fn test_health_reports_database() {
        let (_, pool) = app_services().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .configure(|cfg| {
                    cfg.route("/health", web::get().to(health));
                }),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
    }
}
