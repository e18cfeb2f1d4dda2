use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dropshop API",
        version = env!("CARGO_PKG_VERSION"),
        description = r#"
Conversational preorder service for a limited sneaker drop.

The conversation engine collects an order over chat updates, admission control
caps the drop at a configured number of pairs, and the payment provider
confirms payment through a signed server-to-server callback.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    tags(
        (name = "Chat", description = "Conversational order collection"),
        (name = "Payments", description = "Payment provider callbacks"),
        (name = "Health", description = "Liveness and status endpoints")
    ),
    paths(
        crate::handlers::chat::chat_update,
        crate::handlers::payments::robokassa_result,
        crate::handlers::payments::robokassa_success,
        crate::handlers::payments::robokassa_fail,
        crate::handlers::health::health,
        crate::handlers::health::status,
    ),
    components(schemas(
        crate::handlers::chat::ChatUpdate,
        crate::handlers::chat::ChatReplies,
        crate::handlers::health::StatusResponse,
        crate::chat::OutboundMessage,
        crate::chat::Button,
        crate::errors::ErrorResponse,
    ))
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
