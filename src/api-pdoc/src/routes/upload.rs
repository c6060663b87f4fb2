use axum::{
    extract::{Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use core_pdoc::csv_data::{analyze_duplicates, parse_csv_string};
use data_model_pdoc::models::{
    CheckDuplicateError, CheckDuplicatePayload, CheckDuplicateResponse, LogLevel, UploadError, UploadResponse,
};

use crate::state::AppState;

/// POST /api/upload - Parse an uploaded CSV into normalized client rows
pub async fn post_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, UploadError> {
    let mut upload: Option<(String, String)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let content = field.text().await?;

        if !filename.ends_with(".csv") && content_type != "text/csv" {
            return Err(UploadError::NotCsv);
        }
        upload = Some((filename, content));
        break;
    }

    let Some((filename, content)) = upload else {
        return Err(UploadError::MissingFile);
    };

    let clients = parse_csv_string(&content).map_err(|e| UploadError::InvalidCsv(e.to_string()))?;
    state.logger.event(
        LogLevel::Info,
        "UPLOAD",
        "csv_parsed",
        &format!("Parsed {} client row(s) from {}", clients.len(), filename),
        Some(json!({ "filename": filename, "size": content.len() })),
    );

    let total_rows = clients.len();
    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            success: true,
            data: clients,
            total_rows,
        }),
    ))
}

/// POST /api/check_duplicate - Group uploaded rows by email to spot duplicates
pub async fn post_check_duplicate(
    State(state): State<AppState>,
    Json(payload): Json<CheckDuplicatePayload>,
) -> Result<impl IntoResponse, CheckDuplicateError> {
    if payload.data.is_empty() {
        return Err(CheckDuplicateError::MissingData);
    }

    let analysis = analyze_duplicates(&payload.data);
    state.logger.event(
        LogLevel::Debug,
        "UPLOAD",
        "duplicate_analysis",
        &format!(
            "{} row(s): {} unique, {} duplicated email(s)",
            analysis.total_count,
            analysis.unique_count,
            analysis.duplicates.len()
        ),
        None,
    );

    Ok((StatusCode::OK, Json(CheckDuplicateResponse { success: true, analysis })))
}
