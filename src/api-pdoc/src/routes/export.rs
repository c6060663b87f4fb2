use std::collections::HashMap;

use axum::{
    extract::{Json, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use core_pdoc::csv_data::export_csv;
use data_model_pdoc::db::DbPool;
use data_model_pdoc::models::{
    DocumentCounts, ExportError, ExportPayload, ExportResponse, ExportRow, GeneratedDocument, StatsError,
    StatsResponse,
};
use data_model_pdoc::schema::generated_documents;

use crate::state::AppState;

async fn all_documents(pool: &DbPool) -> Result<Vec<GeneratedDocument>, ExportError> {
    let mut conn = pool.get().await?;
    let docs = generated_documents::table
        .order(generated_documents::created_at.desc())
        .select(GeneratedDocument::as_select())
        .load::<GeneratedDocument>(&mut conn)
        .await?;
    Ok(docs)
}

/// GET /api/export - Download every recorded client as a CSV attachment
pub async fn get_export(State(state): State<AppState>) -> Result<impl IntoResponse, ExportError> {
    let docs = all_documents(&state.pool).await?;
    let rows: Vec<ExportRow> = docs.iter().map(ExportRow::from_document).collect();
    let csv = export_csv(&rows).map_err(|e| ExportError::Unknown(e.to_string()))?;

    tracing::debug!(rows = rows.len(), bytes = csv.len(), "Export CSV produced");

    let filename = format!("export_{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        csv,
    ))
}

/// POST /api/export - Build a CSV for the given generation results
///
/// When results carry their client record the CSV comes straight from them.
/// Otherwise rows are joined against the database by email; if even that
/// fails, a minimal CSV with just the result URLs is produced rather than
/// failing the export.
pub async fn post_export(
    State(state): State<AppState>,
    Json(payload): Json<ExportPayload>,
) -> Result<impl IntoResponse, ExportError> {
    let results = payload.results;
    let clients_attached = results.as_slice().first().map(|r| r.client.is_some()).unwrap_or(false);

    let rows: Vec<ExportRow> = if clients_attached {
        results.iter().map(|r| ExportRow::from_result(r, None)).collect()
    } else {
        match all_documents(&state.pool).await {
            Ok(docs) => {
                let by_email: HashMap<&str, &GeneratedDocument> =
                    docs.iter().map(|d| (d.client_email.as_str(), d)).collect();

                let unmatched = results
                    .iter()
                    .filter(|r| !by_email.contains_key(r.client_email.as_str()))
                    .count();
                if unmatched > 0 {
                    tracing::warn!(unmatched, "Export results reference emails with no database row");
                }

                results
                    .iter()
                    .map(|r| ExportRow::from_result(r, by_email.get(r.client_email.as_str()).copied()))
                    .collect()
            }
            Err(e) => {
                tracing::error!(error = ?e, "Database unavailable for export, producing minimal rows");
                results.iter().map(|r| ExportRow::from_result(r, None)).collect()
            }
        }
    };

    let csv = export_csv(&rows).map_err(|e| ExportError::Unknown(e.to_string()))?;
    Ok((StatusCode::OK, Json(ExportResponse { csv })))
}

/// GET /api/stats - Client total and per-kind generated-document counts
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, StatsError> {
    let mut conn = state.pool.get().await?;

    let total_clients: i64 = generated_documents::table.count().get_result(&mut conn).await?;
    let sales: i64 = generated_documents::table
        .filter(generated_documents::sales_url.is_not_null())
        .count()
        .get_result(&mut conn)
        .await?;
    let meeting_report: i64 = generated_documents::table
        .filter(generated_documents::meeting_report_url.is_not_null())
        .count()
        .get_result(&mut conn)
        .await?;
    let onboarding: i64 = generated_documents::table
        .filter(generated_documents::onboarding_url.is_not_null())
        .count()
        .get_result(&mut conn)
        .await?;

    Ok((
        StatusCode::OK,
        Json(StatsResponse {
            total_clients,
            documents_generated: DocumentCounts {
                sales,
                meeting_report,
                onboarding,
            },
        }),
    ))
}
