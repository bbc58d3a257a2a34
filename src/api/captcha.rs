use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::security::captcha;

#[derive(Serialize)]
pub struct CaptchaResponse {
    pub captcha_token: String,
    /// data: URI with the challenge rendered as SVG.
    pub captcha_image: String,
}

/// GET /api/auth/captcha
///
/// Issues a challenge and its signed token. The token embeds the
/// lowercase-normalized answer and a 300-second expiry, so the server
/// keeps no challenge state.
pub async fn get_captcha(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CaptchaResponse>>, ApiError> {
    let secret = {
        let config = state.config().read().await;
        config.security.master_secret.clone()
    };

    let challenge = captcha::issue(secret.as_bytes())
        .map_err(|e| ApiError::internal(format!("Failed to issue captcha: {e}")))?;

    Ok(Json(ApiResponse::success(CaptchaResponse {
        captcha_token: challenge.token,
        captcha_image: format!(
            "data:image/svg+xml;utf8,{}",
            urlencoding::encode(&challenge.image_svg)
        ),
    })))
}
