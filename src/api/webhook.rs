//! Payment platform webhook for membership orders.
//!
//! Orders are authenticated by an HMAC-SHA256 signature over the order
//! fields, keyed with the shared webhook token. Production deployments
//! without a configured token reject every order.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::services::{OrderOutcome, PaymentOrder, membership};

#[derive(Deserialize)]
pub struct PaymentWebhook {
    /// Platform response code; 200 means a deliverable event.
    pub ec: i32,
    #[serde(default)]
    pub em: Option<String>,
    pub data: PaymentWebhookData,
    pub sign: String,
}

#[derive(Deserialize)]
pub struct PaymentWebhookData {
    #[serde(default)]
    pub order: Option<PaymentOrder>,
}

/// POST /webhook/payment
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<OrderOutcome>, ApiError> {
    let (token, is_production) = {
        let config = state.config().read().await;
        (
            config.membership.webhook_token.clone(),
            config.security.is_production(),
        )
    };

    if payload.ec != 200 {
        return Ok(Json(OrderOutcome::Error {
            message: payload.em.unwrap_or_else(|| "Upstream error".to_string()),
        }));
    }

    let Some(order) = payload.data.order else {
        return Ok(Json(OrderOutcome::Ignored {
            message: "No order data".to_string(),
        }));
    };

    if token.is_empty() {
        if is_production {
            warn!("payment webhook received but no webhook token is configured");
            return Err(ApiError::internal("Server configuration error"));
        }
        // Development without a token skips verification, like the rest of
        // the captcha/secret gating.
        info!("webhook token not set; skipping signature verification (development)");
    } else if !membership::verify_order_signature(&order, &payload.sign, &token) {
        warn!(out_trade_no = %order.out_trade_no, "payment webhook signature mismatch");
        return Err(ApiError::validation("Invalid signature"));
    }

    let outcome = state
        .membership()
        .apply_order(&order)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to apply order: {e}")))?;

    Ok(Json(outcome))
}
