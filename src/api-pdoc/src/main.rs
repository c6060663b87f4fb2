use std::path::PathBuf;
use std::sync::Arc;

use core_pdoc::publish::local::DEFAULT_DOCUMENTS_DIR;
use core_pdoc::publish::publisher_from_env;
use core_pdoc::template::TemplateStore;
use core_pdoc::{TimeUnit, get_api_base_url, get_db_pool, get_poll_interval, setup_logging};

use api_pdoc::logger::DbLogger;
use api_pdoc::routes;
use api_pdoc::state::AppState;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    setup_logging("api_pdoc=debug,tower_http=debug");

    let pool = get_db_pool().await;

    let templates_dir = std::env::var("TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    let templates = Arc::new(
        TemplateStore::load(std::path::Path::new(&templates_dir)).expect("Failed to load document templates"),
    );

    let addr = get_api_base_url().expect("Invalid HOST or PORT");

    let documents_dir =
        PathBuf::from(std::env::var("DOCUMENTS_DIR").unwrap_or_else(|_| DEFAULT_DOCUMENTS_DIR.to_string()));
    let publisher = publisher_from_env(&format!("http://{}", addr)).expect("Failed to configure publisher");
    tracing::info!(backend = publisher.backend(), "Publisher configured");

    let logger = DbLogger::new(pool.clone());
    logger.spawn_flush_task(get_poll_interval(TimeUnit::Milliseconds, "LOG_FLUSH_INTERVAL_MS", 2000));

    let state = AppState {
        pool,
        templates,
        publisher,
        documents_dir: Arc::new(documents_dir),
        logger,
    };
    let app = routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect(format!("Failed to bind to address: {}", addr).as_str());
    axum::serve(listener, app).await.unwrap();
}
