use crate::{services::ConfirmationOutcome, AppState};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

/// Result callback parameters
///
/// Every field is optional here so that a missing one maps onto the
/// provider's `Bad params` body instead of the framework's rejection.
#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    #[serde(rename = "OutSum")]
    pub out_sum: Option<String>,
    #[serde(rename = "InvId")]
    pub inv_id: Option<String>,
    #[serde(rename = "SignatureValue")]
    pub signature: Option<String>,
}

/// Server-to-server payment result callback
///
/// The provider retries until it reads `OK{InvId}`, so an already-paid order
/// answers the same as a first confirmation. Responses are plain text by the
/// provider contract, not the JSON error envelope.
#[utoipa::path(
    get,
    path = "/robokassa/result",
    params(
        ("OutSum" = String, Query, description = "Amount as the provider formatted it"),
        ("InvId" = String, Query, description = "Invoice id issued with the payment link"),
        ("SignatureValue" = String, Query, description = "Result signature"),
    ),
    responses(
        (status = 200, description = "Confirmation accepted", body = String),
        (status = 400, description = "Missing parameters or invalid signature", body = String),
        (status = 404, description = "No order carries this invoice id", body = String),
        (status = 500, description = "Internal failure", body = String),
    ),
    tag = "Payments"
)]
pub async fn robokassa_result(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResultQuery>,
) -> Response {
    let (Some(out_sum), Some(inv_id), Some(signature)) =
        (params.out_sum, params.inv_id, params.signature)
    else {
        return (StatusCode::BAD_REQUEST, "Bad params").into_response();
    };
    let Ok(invoice_id) = inv_id.parse::<i64>() else {
        return (StatusCode::BAD_REQUEST, "Bad params").into_response();
    };

    match state
        .checkout
        .handle_payment_confirmation(&out_sum, invoice_id, &signature)
        .await
    {
        Ok(ConfirmationOutcome::Confirmed { .. }) | Ok(ConfirmationOutcome::AlreadyPaid { .. }) => {
            (StatusCode::OK, format!("OK{}", invoice_id)).into_response()
        }
        Ok(ConfirmationOutcome::InvalidSignature) => {
            (StatusCode::BAD_REQUEST, "Invalid signature").into_response()
        }
        Ok(ConfirmationOutcome::UnknownOrder) => {
            (StatusCode::NOT_FOUND, "Unknown invoice").into_response()
        }
        Err(e) => {
            error!(invoice_id, error = %e, "Payment confirmation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}

/// Landing page the buyer sees after a successful payment
#[utoipa::path(
    get,
    path = "/robokassa/success",
    responses((status = 200, description = "Success landing page", body = String)),
    tag = "Payments"
)]
pub async fn robokassa_success() -> impl IntoResponse {
    "Оплата принята, спасибо! Можете вернуться в чат."
}

/// Landing page the buyer sees after a failed or cancelled payment
#[utoipa::path(
    get,
    path = "/robokassa/fail",
    responses((status = 200, description = "Failure landing page", body = String)),
    tag = "Payments"
)]
pub async fn robokassa_fail() -> impl IntoResponse {
    "Оплата не прошла или отменена."
}
