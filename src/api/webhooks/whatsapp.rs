//! `WhatsApp` Cloud API webhook handlers

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::channels::WhatsAppWebhook;
use crate::engine::InboundMessage;

/// Query parameters Meta sends when verifying the webhook
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Error body for a rejected verification
#[derive(Serialize)]
pub struct VerifyFailure {
    pub message: &'static str,
    pub success: bool,
}

/// Answer the subscription handshake
///
/// Echoes `hub.challenge` when the mode is `subscribe` and the token matches.
pub async fn verify_webhook(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let token_matches = match (&state.verify_token, &query.verify_token) {
        (Some(expected), Some(given)) => expected.expose_secret() == given,
        _ => false,
    };

    if query.mode.as_deref() == Some("subscribe") && token_matches {
        tracing::info!("WhatsApp webhook verified");
        return (StatusCode::OK, query.challenge.unwrap_or_default()).into_response();
    }

    tracing::warn!(mode = ?query.mode, "WhatsApp webhook verification rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(VerifyFailure {
            message: "Invalid token",
            success: false,
        }),
    )
        .into_response()
}

/// Handle an incoming webhook delivery
///
/// Only the first message of a delivery is processed. Deliveries whose
/// message id was already seen are acknowledged without effect.
pub async fn handle_webhook(State(state): State<Arc<ApiState>>, body: Bytes) -> StatusCode {
    let payload: WhatsAppWebhook = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "unparseable WhatsApp webhook body");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let Some(value) = payload.first_value() else {
        return StatusCode::OK;
    };
    if value.is_status_update() {
        tracing::trace!("ignoring WhatsApp status update");
        return StatusCode::OK;
    }
    let message = match value.first_message() {
        Some(Ok(message)) => message,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "skipping malformed WhatsApp message");
            return StatusCode::OK;
        }
        None => return StatusCode::OK,
    };

    if let Some(id) = &message.id
        && state.dedup.lock().await.seen(id)
    {
        tracing::debug!(message_id = %id, phone = %message.from, "duplicate delivery ignored");
        return StatusCode::OK;
    }

    tracing::info!(
        phone = %message.from,
        message_type = %message.message_type,
        "WhatsApp message received"
    );

    state.engine.handle(InboundMessage::from_whatsapp(&message)).await;
    StatusCode::OK
}
