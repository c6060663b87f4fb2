use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;

use core_pdoc::publish::publish_client_documents;
use data_model_pdoc::models::{
    DocumentChanges, DocumentKind, DocumentOutcome, GenerateError, GeneratePayload, GeneratedDocument,
    GenerationResult, LogLevel,
};
use data_model_pdoc::schema::generated_documents;

use crate::state::AppState;

/// POST /api/generate - Produce and publish the missing documents for one client
///
/// Kinds that already have a recorded URL are returned as-is with
/// `generated: false`; only the holes are rendered and published. The row is
/// then upserted by email, so repeating a run never duplicates work.
pub async fn post_generate(
    State(state): State<AppState>,
    Json(payload): Json<GeneratePayload>,
) -> Result<impl IntoResponse, GenerateError> {
    let client = payload.client;
    let started = std::time::Instant::now();
    tracing::debug!(client_email = %client.email, "Generation requested");

    let mut conn = state.pool.get().await?;
    let existing: Option<GeneratedDocument> = generated_documents::table
        .find(&client.email)
        .select(GeneratedDocument::as_select())
        .first(&mut conn)
        .await
        .optional()?;

    let now = Utc::now();
    let mut record = match &existing {
        Some(doc) => doc.clone(),
        None => GeneratedDocument::new(&client, now),
    };
    // This upload is the freshest view of the client's identity and data.
    record.client_name = client.full_name();
    record.client_phone = if client.phone.is_empty() { None } else { Some(client.phone.clone()) };
    record.raw_data = serde_json::to_value(&client).unwrap_or_else(|_| json!({}));
    record.updated_at = now;

    let mut result = GenerationResult {
        client_email: client.email.clone(),
        client: None,
        success: true,
        documents: Default::default(),
        error: None,
    };
    for kind in DocumentKind::ALL {
        if let Some(url) = record.url_for(kind) {
            result.documents.insert(
                kind,
                DocumentOutcome {
                    url: url.to_string(),
                    generated: false,
                },
            );
        }
    }

    let missing = record.missing_kinds();
    if missing.is_empty() {
        tracing::debug!(client_email = %client.email, "All documents already on record");
        return Ok((StatusCode::OK, Json(result)));
    }

    let mut rendered = Vec::with_capacity(missing.len());
    for kind in &missing {
        let doc = state
            .templates
            .render(&client, *kind)
            .map_err(|e| GenerateError::TemplateFailure(e.to_string()))?;
        rendered.push(doc);
    }

    let urls = publish_client_documents(state.publisher.as_ref(), &client.email, &rendered)
        .await
        .map_err(|e| GenerateError::PublishFailure(e.to_string()))?;

    for (kind, url) in &urls {
        record.set_url(*kind, url.clone(), now);
        result.documents.insert(
            *kind,
            DocumentOutcome {
                url: url.clone(),
                generated: true,
            },
        );
    }

    let changes = DocumentChanges::from(&record);
    diesel::insert_into(generated_documents::table)
        .values(&record)
        .on_conflict(generated_documents::client_email)
        .do_update()
        .set(&changes)
        .execute(&mut conn)
        .await?;

    state.logger.client_event(
        LogLevel::Info,
        "GENERATE",
        "client_complete",
        &format!("Generated {} document(s)", urls.len()),
        &client.email,
        Some(started.elapsed().as_millis() as i64),
        Some(json!({
            "kinds": urls.keys().map(|k| k.to_string()).collect::<Vec<_>>(),
            "publisher": state.publisher.backend(),
        })),
    );

    Ok((StatusCode::OK, Json(result)))
}
