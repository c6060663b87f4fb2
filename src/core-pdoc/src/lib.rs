pub mod common;
pub mod csv_data;
pub mod errors;
pub mod publish;
pub mod template;

pub use common::batch_size::{DEFAULT_BATCH_SIZE, get_batch_size};
pub use common::db_env::{get_database_url, get_db_pool};
pub use common::health::{health_check, health_router};
pub use common::hostname::get_api_base_url;
pub use common::logging::setup_logging;
pub use common::poll_interval::{TimeUnit, get_poll_interval, poll_interval};
pub use errors::Error;
