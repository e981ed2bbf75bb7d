use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub reg_number: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    let email = payload.email.trim();
    let mobile = payload.mobile.trim();
    let reg_number = payload.reg_number.trim();

    if name.is_empty() || email.is_empty() || mobile.is_empty() || reg_number.is_empty() {
        return Err(ApiError::BadRequest("All fields are required".to_string()));
    }

    let otp = state.gate.register(name, email, mobile, reg_number).await?;

    // Stand-in for SMS/email delivery: the code is logged and echoed back.
    tracing::info!("OTP for {}: {}", email, otp);

    Ok(Json(json!({
        "message": "Doctor registered. OTP sent (printed in logs).",
        "otp": otp
    })))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let verified = state
        .gate
        .verify_otp(payload.email.trim(), payload.otp.trim())
        .await?;

    let message = if verified {
        "OTP verified. You are now verified."
    } else {
        "Invalid or expired OTP."
    };

    Ok(Json(json!({
        "verified": verified,
        "message": message
    })))
}
