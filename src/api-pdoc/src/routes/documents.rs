use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use data_model_pdoc::models::{DocumentServeError, LogLevel};

use crate::state::AppState;

/// GET /api/documents/{*path} - Serve a published HTML document
///
/// Fronts the local documents directory, the storage target of the local
/// publisher. Documents are immutable once published (conflicts get renamed
/// paths), so an hour of caching is safe.
pub async fn get_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, DocumentServeError> {
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(DocumentServeError::InvalidPath(path));
    }

    let full_path = state.documents_dir.join(&path);
    match tokio::fs::read_to_string(&full_path).await {
        Ok(content) => {
            state.logger.event(
                LogLevel::Info,
                "DOCUMENTS",
                "serve",
                &format!("Served {}", path),
                Some(json!({ "path": path, "size": content.len() })),
            );
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                    (header::CACHE_CONTROL, "public, max-age=3600"),
                ],
                content,
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            state.logger.event(
                LogLevel::Error,
                "DOCUMENTS",
                "not_found",
                &format!("Document not found: {}", path),
                Some(json!({ "path": path })),
            );
            Err(DocumentServeError::NotFound(path))
        }
        Err(e) => Err(DocumentServeError::Unknown(e.to_string())),
    }
}
