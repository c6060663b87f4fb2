use std::collections::BTreeMap;
use std::io::Write;

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::SqlType;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::PoolError;

// SQL type definitions for custom enums
// Note: These types use snake_case to match PostgreSQL type names
#[allow(non_camel_case_types)]
#[derive(SqlType, diesel::query_builder::QueryId, Debug, Clone, Copy)]
#[diesel(postgres_type(name = "log_level"))]
pub struct Log_level;

// LogLevel enum
/// Severity of an application log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Log_level)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parses the query-parameter form of a level. `None` for unknown input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql<Log_level, Pg> for LogLevel {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Log_level, Pg> for LogLevel {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"debug" => Ok(LogLevel::Debug),
            b"info" => Ok(LogLevel::Info),
            b"warn" => Ok(LogLevel::Warn),
            b"error" => Ok(LogLevel::Error),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

// DocumentKind enum
/// The three personalized document kinds produced for every client.
/// Serializes to the kebab-case names used in URLs, template directories
/// and API payload keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Sales,
    MeetingReport,
    Onboarding,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Sales, DocumentKind::MeetingReport, DocumentKind::Onboarding];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::MeetingReport => "meeting-report",
            Self::Onboarding => "onboarding",
        }
    }

    /// Column prefix that marks a CSV column as belonging to this kind.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            Self::Sales => "sales_",
            Self::MeetingReport => "report_",
            Self::Onboarding => "onb_",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// A client row as uploaded: the well-known columns plus whatever else the
// CSV carried. The `full_data` extra column, when present, holds a
// stringified JSON blob of template variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_offer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_steps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_tips: Option<String>,

    /// Every other CSV column, by header name.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ClientRecord {
    pub fn new(email: impl Into<String>) -> Self {
        ClientRecord {
            email: email.into(),
            phone: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            product: None,
            price: None,
            special_offer: None,
            meeting_date: None,
            goals: None,
            recommendations: None,
            onboarding_steps: None,
            onboarding_tips: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// The stringified-JSON blob column, if the upload carried one.
    pub fn full_data(&self) -> Option<&str> {
        self.extra.get("full_data").map(String::as_str).filter(|s| !s.is_empty())
    }

    /// All populated columns as (name, value) pairs, well-known ones included.
    /// Used for prefix-based template variable extraction.
    pub fn columns(&self) -> Vec<(&str, &str)> {
        let mut fields: Vec<(&str, &str)> = vec![
            ("email", self.email.as_str()),
            ("phone", self.phone.as_str()),
            ("first_name", self.first_name.as_str()),
            ("last_name", self.last_name.as_str()),
        ];
        let known: [(&str, &Option<String>); 8] = [
            ("product", &self.product),
            ("price", &self.price),
            ("special_offer", &self.special_offer),
            ("meeting_date", &self.meeting_date),
            ("goals", &self.goals),
            ("recommendations", &self.recommendations),
            ("onboarding_steps", &self.onboarding_steps),
            ("onboarding_tips", &self.onboarding_tips),
        ];
        for (name, value) in known {
            if let Some(v) = value {
                fields.push((name, v.as_str()));
            }
        }
        for (name, value) in &self.extra {
            fields.push((name.as_str(), value.as_str()));
        }
        fields
    }
}

// generated_documents table model (database representation)
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::generated_documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GeneratedDocument {
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_name: String,
    pub sales_url: Option<String>,
    pub sales_generated_at: Option<DateTime<Utc>>,
    pub meeting_report_url: Option<String>,
    pub meeting_report_generated_at: Option<DateTime<Utc>>,
    pub onboarding_url: Option<String>,
    pub onboarding_generated_at: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneratedDocument {
    /// Fresh row for a client with no documents generated yet.
    pub fn new(client: &ClientRecord, now: DateTime<Utc>) -> Self {
        GeneratedDocument {
            client_email: client.email.clone(),
            client_phone: if client.phone.is_empty() { None } else { Some(client.phone.clone()) },
            client_name: client.full_name(),
            sales_url: None,
            sales_generated_at: None,
            meeting_report_url: None,
            meeting_report_generated_at: None,
            onboarding_url: None,
            onboarding_generated_at: None,
            raw_data: serde_json::to_value(client).unwrap_or_else(|_| json!({})),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn url_for(&self, kind: DocumentKind) -> Option<&str> {
        match kind {
            DocumentKind::Sales => self.sales_url.as_deref(),
            DocumentKind::MeetingReport => self.meeting_report_url.as_deref(),
            DocumentKind::Onboarding => self.onboarding_url.as_deref(),
        }
    }

    pub fn set_url(&mut self, kind: DocumentKind, url: String, at: DateTime<Utc>) {
        match kind {
            DocumentKind::Sales => {
                self.sales_url = Some(url);
                self.sales_generated_at = Some(at);
            }
            DocumentKind::MeetingReport => {
                self.meeting_report_url = Some(url);
                self.meeting_report_generated_at = Some(at);
            }
            DocumentKind::Onboarding => {
                self.onboarding_url = Some(url);
                self.onboarding_generated_at = Some(at);
            }
        }
        self.updated_at = at;
    }

    /// Kinds that still need generation (no recorded URL).
    pub fn missing_kinds(&self) -> Vec<DocumentKind> {
        DocumentKind::ALL.iter().copied().filter(|k| self.url_for(*k).is_none()).collect()
    }
}

// Changeset applied on upsert conflicts: `None` fields are skipped, so an
// upsert only overwrites the columns that were freshly generated.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::generated_documents)]
pub struct DocumentChanges {
    pub client_phone: Option<String>,
    pub client_name: String,
    pub sales_url: Option<String>,
    pub sales_generated_at: Option<DateTime<Utc>>,
    pub meeting_report_url: Option<String>,
    pub meeting_report_generated_at: Option<DateTime<Utc>>,
    pub onboarding_url: Option<String>,
    pub onboarding_generated_at: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<&GeneratedDocument> for DocumentChanges {
    fn from(doc: &GeneratedDocument) -> Self {
        DocumentChanges {
            client_phone: doc.client_phone.clone(),
            client_name: doc.client_name.clone(),
            sales_url: doc.sales_url.clone(),
            sales_generated_at: doc.sales_generated_at,
            meeting_report_url: doc.meeting_report_url.clone(),
            meeting_report_generated_at: doc.meeting_report_generated_at,
            onboarding_url: doc.onboarding_url.clone(),
            onboarding_generated_at: doc.onboarding_generated_at,
            raw_data: doc.raw_data.clone(),
            updated_at: doc.updated_at,
        }
    }
}

// application_logs table model (database representation)
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::application_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub action: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub client_email: Option<String>,
    pub duration_ms: Option<i64>,
}

// API Payload Types

/// Outcome of one document for one client in a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub url: String,
    /// False when the URL was already on record and nothing was regenerated.
    pub generated: bool,
}

/// Per-client result of POST /api/generate, also the unit the CLI collects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub client_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientRecord>,
    pub success: bool,
    #[serde(default)]
    pub documents: BTreeMap<DocumentKind, DocumentOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn failure(client_email: impl Into<String>, error: impl Into<String>) -> Self {
        GenerationResult {
            client_email: client_email.into(),
            client: None,
            success: false,
            documents: BTreeMap::new(),
            error: Some(error.into()),
        }
    }

    pub fn document_url(&self, kind: DocumentKind) -> Option<&str> {
        self.documents.get(&kind).map(|d| d.url.as_str())
    }
}

/// One line of the export CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub email: String,
    pub phone: String,
    pub full_data: String,
    pub meeting_report_link: String,
    pub sales_page_link: String,
    pub onboarding_link: String,
}

impl ExportRow {
    pub fn from_document(doc: &GeneratedDocument) -> Self {
        ExportRow {
            email: doc.client_email.clone(),
            phone: doc.client_phone.clone().unwrap_or_default(),
            full_data: doc.raw_data.to_string(),
            meeting_report_link: doc.meeting_report_url.clone().unwrap_or_default(),
            sales_page_link: doc.sales_url.clone().unwrap_or_default(),
            onboarding_link: doc.onboarding_url.clone().unwrap_or_default(),
        }
    }

    /// Builds a row from an in-flight result, falling back to the database
    /// row (when available) for anything the result does not carry.
    pub fn from_result(result: &GenerationResult, db_doc: Option<&GeneratedDocument>) -> Self {
        let phone = result
            .client
            .as_ref()
            .map(|c| c.phone.clone())
            .filter(|p| !p.is_empty())
            .or_else(|| db_doc.and_then(|d| d.client_phone.clone()))
            .unwrap_or_default();
        let full_data = match (&result.client, db_doc) {
            (Some(client), _) => serde_json::to_value(client).unwrap_or_else(|_| json!({})).to_string(),
            (None, Some(doc)) => doc.raw_data.to_string(),
            (None, None) => "{}".to_string(),
        };
        let link = |kind: DocumentKind| {
            result
                .document_url(kind)
                .map(str::to_string)
                .or_else(|| db_doc.and_then(|d| d.url_for(kind).map(str::to_string)))
                .unwrap_or_default()
        };
        ExportRow {
            email: result.client_email.clone(),
            phone,
            full_data,
            meeting_report_link: link(DocumentKind::MeetingReport),
            sales_page_link: link(DocumentKind::Sales),
            onboarding_link: link(DocumentKind::Onboarding),
        }
    }
}

/// Input payload for POST /api/generate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePayload {
    pub client: ClientRecord,
}

/// Response payload for POST /api/upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub data: Vec<ClientRecord>,
    pub total_rows: usize,
}

/// Input payload for POST /api/check_duplicate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDuplicatePayload {
    pub data: Vec<ClientRecord>,
}

/// Duplicate grouping over uploaded rows, keyed by lowercased email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateAnalysis {
    pub duplicates: BTreeMap<String, Vec<ClientRecord>>,
    pub unique_count: usize,
    pub total_count: usize,
}

/// Response payload for POST /api/check_duplicate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDuplicateResponse {
    pub success: bool,
    pub analysis: DuplicateAnalysis,
}

/// Input payload for POST /api/export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    pub results: Vec<GenerationResult>,
}

/// Response payload for POST /api/export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub csv: String,
}

/// Per-kind generated-document counts for GET /api/stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCounts {
    pub sales: i64,
    pub meeting_report: i64,
    pub onboarding: i64,
}

/// Response payload for GET /api/stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_clients: i64,
    pub documents_generated: DocumentCounts,
}

// API Error Types

/// Error for POST /api/upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum UploadError {
    /// The multipart body carried no `file` field
    #[serde(rename = "missing_file")]
    MissingFile,
    /// The uploaded file is not a CSV
    #[serde(rename = "not_csv")]
    NotCsv,
    /// The CSV could not be parsed
    #[serde(rename = "invalid_csv")]
    InvalidCsv(String),
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for POST /api/check_duplicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum CheckDuplicateError {
    /// The payload carried no rows
    #[serde(rename = "missing_data")]
    MissingData,
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for POST /api/generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum GenerateError {
    /// A template could not be rendered for this client
    #[serde(rename = "template_failure")]
    TemplateFailure(String),
    /// The storage backend rejected a document
    #[serde(rename = "publish_failure")]
    PublishFailure(String),
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for GET/POST /api/export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ExportError {
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for GET /api/documents/{path}. Serves plain text like the
/// documents it fronts, not JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentServeError {
    NotFound(String),
    InvalidPath(String),
    Unknown(String),
}

/// Error for GET/DELETE /api/logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum LogsError {
    /// The `level` query parameter is not a known level
    #[serde(rename = "invalid_level")]
    InvalidLevel(String),
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for GET /api/stats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum StatsError {
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

macro_rules! from_error {
    ($lib_err:path, $err_type:tt) => {
        /// Converts a `$lib_err` into an `$err_type::Unknown`.
        impl From<$lib_err> for $err_type {
            fn from(e: $lib_err) -> Self {
                $err_type::Unknown(format!("{:?}", e))
            }
        }
    };
}

// UploadError

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            UploadError::MissingFile | UploadError::NotCsv | UploadError::InvalidCsv(_) => StatusCode::BAD_REQUEST,
            UploadError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

from_error!(axum::extract::multipart::MultipartError, UploadError);

// CheckDuplicateError

impl IntoResponse for CheckDuplicateError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            CheckDuplicateError::MissingData => StatusCode::BAD_REQUEST,
            CheckDuplicateError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

// GenerateError

impl IntoResponse for GenerateError {
    fn into_response(self) -> axum::response::Response {
        // The original contract: every generation failure surfaces as a 500
        // with a `success: false` result body.
        let body = json!({
            "client_email": "",
            "success": false,
            "documents": {},
            "error": self.to_message(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl GenerateError {
    fn to_message(&self) -> String {
        match self {
            GenerateError::TemplateFailure(m) => format!("Template rendering failed: {}", m),
            GenerateError::PublishFailure(m) => format!("Document publication failed: {}", m),
            GenerateError::Unknown(m) => m.clone(),
        }
    }
}

from_error!(PoolError, GenerateError);
from_error!(diesel::result::Error, GenerateError);

// ExportError

impl IntoResponse for ExportError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

from_error!(PoolError, ExportError);
from_error!(diesel::result::Error, ExportError);

// DocumentServeError

impl IntoResponse for DocumentServeError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            DocumentServeError::NotFound(path) => (StatusCode::NOT_FOUND, format!("Document not found: {}", path)),
            DocumentServeError::InvalidPath(path) => (StatusCode::BAD_REQUEST, format!("Invalid document path: {}", path)),
            DocumentServeError::Unknown(msg) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Server error: {}", msg)),
        };
        (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
    }
}

// LogsError

impl IntoResponse for LogsError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            LogsError::InvalidLevel(_) => StatusCode::BAD_REQUEST,
            LogsError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

from_error!(PoolError, LogsError);
from_error!(diesel::result::Error, LogsError);

// StatsError

impl IntoResponse for StatsError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

from_error!(PoolError, StatsError);
from_error!(diesel::result::Error, StatsError);
