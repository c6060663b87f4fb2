//! Buffered application logger backed by the application_logs table.
//!
//! Handlers push entries synchronously; a background task flushes the buffer
//! to the database on an interval so request latency never depends on log
//! persistence. Every entry is mirrored to `tracing` immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use data_model_pdoc::db::DbPool;
use data_model_pdoc::models::{LogEntry, LogLevel};
use data_model_pdoc::schema::application_logs;

#[derive(Debug)]
pub enum FlushError {
    Pool(String),
    Db(diesel::result::Error),
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushError::Pool(msg) => write!(f, "Log flush pool error: {}", msg),
            FlushError::Db(err) => write!(f, "Log flush database error: {}", err),
        }
    }
}

impl std::error::Error for FlushError {}

#[derive(Clone)]
pub struct DbLogger {
    pool: DbPool,
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl DbLogger {
    pub fn new(pool: DbPool) -> Self {
        DbLogger {
            pool,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Records one application event.
    pub fn event(&self, level: LogLevel, component: &str, action: &str, message: &str, details: Option<serde_json::Value>) {
        self.push(level, component, action, message, None, None, details);
    }

    /// Records one application event attributed to a client.
    pub fn client_event(
        &self,
        level: LogLevel,
        component: &str,
        action: &str,
        message: &str,
        client_email: &str,
        duration_ms: Option<i64>,
        details: Option<serde_json::Value>,
    ) {
        self.push(level, component, action, message, Some(client_email.to_string()), duration_ms, details);
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        level: LogLevel,
        component: &str,
        action: &str,
        message: &str,
        client_email: Option<String>,
        duration_ms: Option<i64>,
        details: Option<serde_json::Value>,
    ) {
        match level {
            LogLevel::Debug => tracing::debug!(component, action, "{}", message),
            LogLevel::Info => tracing::info!(component, action, "{}", message),
            LogLevel::Warn => tracing::warn!(component, action, "{}", message),
            LogLevel::Error => tracing::error!(component, action, "{}", message),
        }

        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            action: action.to_string(),
            message: message.to_string(),
            details,
            client_email,
            duration_ms,
        };
        self.buffer.lock().expect("log buffer lock poisoned").push(entry);
    }

    /// Number of entries waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.buffer.lock().expect("log buffer lock poisoned").len()
    }

    /// Writes buffered entries to the database. On failure the entries are
    /// put back so the next flush retries them.
    pub async fn flush(&self) -> Result<usize, FlushError> {
        let entries: Vec<LogEntry> = {
            let mut buffer = self.buffer.lock().expect("log buffer lock poisoned");
            std::mem::take(&mut *buffer)
        };
        if entries.is_empty() {
            return Ok(0);
        }
        let count = entries.len();

        let result = async {
            let mut conn = self.pool.get().await.map_err(|e| FlushError::Pool(format!("{:?}", e)))?;
            diesel::insert_into(application_logs::table)
                .values(&entries)
                .execute(&mut conn)
                .await
                .map_err(FlushError::Db)
        }
        .await;

        match result {
            Ok(_) => Ok(count),
            Err(e) => {
                let mut buffer = self.buffer.lock().expect("log buffer lock poisoned");
                let mut requeued = entries;
                requeued.extend(buffer.drain(..));
                *buffer = requeued;
                Err(e)
            }
        }
    }

    /// Starts the periodic flush loop.
    pub fn spawn_flush_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let logger = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match logger.flush().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(flushed = n, "Flushed application logs"),
                    Err(e) => tracing::error!(error = %e, "Failed to flush application logs"),
                }
            }
        })
    }
}

/// Human-readable duration for the logs UI: "250ms", "1.5s", "2m 30s", "1h 5m".
pub fn format_duration(ms: i64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    } else {
        format!("{}h {}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}

#[cfg(test)]
mod tests {
    use data_model_pdoc::test_helpers::lazy_test_pool;

    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1_500), "1.5s");
        assert_eq!(format_duration(150_000), "2m 30s");
        assert_eq!(format_duration(3_900_000), "1h 5m");
    }

    #[tokio::test]
    async fn test_events_accumulate_in_buffer() {
        let logger = DbLogger::new(lazy_test_pool());
        assert_eq!(logger.pending(), 0);

        logger.event(LogLevel::Info, "TEST", "one", "first", None);
        logger.client_event(LogLevel::Error, "TEST", "two", "second", "ada@example.com", Some(42), None);

        assert_eq!(logger.pending(), 2);
    }
}
