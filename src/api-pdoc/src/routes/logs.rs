use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use serde_json::json;

use data_model_pdoc::models::{LogEntry, LogLevel, LogsError};
use data_model_pdoc::schema::application_logs;

use crate::logger::format_duration;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;
/// Stats are computed over the most recent entries, not the whole table.
const STATS_WINDOW: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub filter: Option<String>,
    pub level: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub stats: bool,
}

#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub days: Option<i64>,
}

/// A log entry as rendered to the logs UI.
#[derive(Debug, Serialize)]
struct LogView {
    #[serde(flatten)]
    entry: LogEntry,
    formatted_duration: Option<String>,
}

impl From<LogEntry> for LogView {
    fn from(entry: LogEntry) -> Self {
        let formatted_duration = entry.duration_ms.map(format_duration);
        LogView {
            entry,
            formatted_duration,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ActionStats {
    pub count: usize,
    pub avg_duration_ms: i64,
    pub errors: usize,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub total: usize,
    pub levels: LevelCounts,
    pub actions: BTreeMap<String, ActionStats>,
    pub last_24h: usize,
}

/// GET /api/logs - Query recent application logs, or aggregate stats with ?stats=true
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<axum::response::Response, LogsError> {
    let mut conn = state.pool.get().await?;

    if query.stats {
        let entries: Vec<LogEntry> = application_logs::table
            .select(LogEntry::as_select())
            .order(application_logs::timestamp.desc())
            .limit(STATS_WINDOW)
            .load(&mut conn)
            .await?;
        let stats = compute_stats(&entries, Utc::now());
        return Ok((
            StatusCode::OK,
            axum::Json(json!({ "success": true, "stats": stats, "timestamp": Utc::now() })),
        )
            .into_response());
    }

    let mut db_query = application_logs::table.select(LogEntry::as_select()).into_boxed();

    if let Some(level_raw) = &query.level {
        if level_raw != "all" {
            let level = LogLevel::parse(level_raw).ok_or_else(|| LogsError::InvalidLevel(level_raw.clone()))?;
            db_query = db_query.filter(application_logs::level.eq(level));
        }
    }
    if let Some(filter) = &query.filter {
        let pattern = format!("%{}%", filter);
        db_query = db_query.filter(
            application_logs::action
                .ilike(pattern.clone())
                .or(application_logs::message.ilike(pattern)),
        );
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries: Vec<LogEntry> = db_query
        .order(application_logs::timestamp.desc())
        .limit(limit)
        .load(&mut conn)
        .await?;

    let logs: Vec<LogView> = entries.into_iter().map(LogView::from).collect();
    let count = logs.len();
    Ok((
        StatusCode::OK,
        axum::Json(json!({ "success": true, "logs": logs, "count": count })),
    )
        .into_response())
}

/// DELETE /api/logs?days=N - Purge entries older than N days (default 30)
pub async fn delete_logs(
    State(state): State<AppState>,
    Query(query): Query<PurgeQuery>,
) -> Result<impl IntoResponse, LogsError> {
    let days = query.days.unwrap_or(30).max(0);
    let cutoff = Utc::now() - chrono::Duration::days(days);

    let mut conn = state.pool.get().await?;
    let deleted = diesel::delete(application_logs::table.filter(application_logs::timestamp.lt(cutoff)))
        .execute(&mut conn)
        .await?;

    tracing::info!(deleted, days, "Purged old application logs");
    Ok((
        StatusCode::OK,
        axum::Json(json!({
            "success": true,
            "message": format!("{} log(s) deleted (older than {} days)", deleted, days),
            "deleted_count": deleted,
        })),
    ))
}

/// Aggregates a window of log entries into the stats payload.
pub fn compute_stats(entries: &[LogEntry], now: DateTime<Utc>) -> LogStats {
    let mut levels = LevelCounts {
        debug: 0,
        info: 0,
        warn: 0,
        error: 0,
    };
    let mut actions: BTreeMap<String, (usize, i64, usize)> = BTreeMap::new();
    let day_ago = now - chrono::Duration::hours(24);
    let mut last_24h = 0;

    for entry in entries {
        match entry.level {
            LogLevel::Debug => levels.debug += 1,
            LogLevel::Info => levels.info += 1,
            LogLevel::Warn => levels.warn += 1,
            LogLevel::Error => levels.error += 1,
        }

        let slot = actions.entry(entry.action.clone()).or_insert((0, 0, 0));
        slot.0 += 1;
        slot.1 += entry.duration_ms.unwrap_or(0);
        if entry.level == LogLevel::Error {
            slot.2 += 1;
        }

        if entry.timestamp > day_ago {
            last_24h += 1;
        }
    }

    let actions = actions
        .into_iter()
        .map(|(action, (count, total_duration, errors))| {
            let avg_duration_ms = if count > 0 { total_duration / count as i64 } else { 0 };
            (
                action,
                ActionStats {
                    count,
                    avg_duration_ms,
                    errors,
                },
            )
        })
        .collect();

    LogStats {
        total: entries.len(),
        levels,
        actions,
        last_24h,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn entry(level: LogLevel, action: &str, duration_ms: Option<i64>, age_hours: i64) -> LogEntry {
        LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now() - chrono::Duration::hours(age_hours),
            level,
            component: "TEST".to_string(),
            action: action.to_string(),
            message: "message".to_string(),
            details: None,
            client_email: None,
            duration_ms,
        }
    }

    #[test]
    fn test_compute_stats_levels_and_actions() {
        let entries = vec![
            entry(LogLevel::Info, "generate", Some(100), 1),
            entry(LogLevel::Info, "generate", Some(300), 2),
            entry(LogLevel::Error, "generate", None, 3),
            entry(LogLevel::Warn, "upload", Some(50), 48),
        ];

        let stats = compute_stats(&entries, Utc::now());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.levels.info, 2);
        assert_eq!(stats.levels.warn, 1);
        assert_eq!(stats.levels.error, 1);
        assert_eq!(stats.levels.debug, 0);
        // The 48h-old entry falls outside the 24h window.
        assert_eq!(stats.last_24h, 3);

        let generate = stats.actions.get("generate").unwrap();
        assert_eq!(generate.count, 3);
        // 100 + 300 + 0 over three entries.
        assert_eq!(generate.avg_duration_ms, 133);
        assert_eq!(generate.errors, 1);

        let upload = stats.actions.get("upload").unwrap();
        assert_eq!(upload.count, 1);
        assert_eq!(upload.errors, 0);
    }

    #[test]
    fn test_compute_stats_empty() {
        let stats = compute_stats(&[], Utc::now());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.last_24h, 0);
        assert!(stats.actions.is_empty());
    }
}
