pub mod batch_size;
pub mod db_env;
pub mod health;
pub mod hostname;
pub mod logging;
pub mod poll_interval;
