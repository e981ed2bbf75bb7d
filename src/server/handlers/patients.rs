use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PatientsQuery {
    pub doctor: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPatientRequest {
    pub doctor: String,
    pub patient: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub doctor: String,
    pub patient: String,
    pub limit: Option<i64>,
}

pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PatientsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let patients = state.chatlog.list_patients(params.doctor.trim()).await?;
    Ok(Json(json!({ "patients": patients })))
}

pub async fn add_patient(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddPatientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let doctor = payload.doctor.trim();
    let patient = payload.patient.trim();

    if doctor.is_empty() || patient.is_empty() {
        return Err(ApiError::BadRequest(
            "Doctor and patient are required".to_string(),
        ));
    }

    state.chatlog.add_patient(doctor, patient).await?;
    Ok(Json(json!({ "message": "Patient added" })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .chatlog
        .history(
            params.doctor.trim(),
            params.patient.trim(),
            params.limit.unwrap_or(0),
        )
        .await?;

    let messages: Vec<Value> = entries
        .into_iter()
        .map(|entry| {
            json!({
                "message": entry.message,
                "is_user": entry.is_user,
                "created_at": entry.created_at
            })
        })
        .collect();

    Ok(Json(json!({ "messages": messages })))
}
