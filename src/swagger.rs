use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::webhook::tribute_webhook,
        handlers::webhook::health,
    ),
    components(
        schemas(
            TributeWebhook,
            TributeDonation,
            WebhookAck,
            HealthResponse,
            ApiError,
            ApiErrorResponse,
        )
    ),
    tags(
        (name = "webhook", description = "Payment provider callbacks"),
        (name = "health", description = "Liveness probe"),
    ),
    info(
        title = "RemnaWave Shop Bot API",
        version = "0.1.0",
        description = "HTTP side of the RemnaWave shop bot: payment webhooks and health"
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_webhook_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/tribute/webhook"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
