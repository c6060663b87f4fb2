pub mod api_client;
pub mod batch;
pub mod errors;

pub use api_client::ApiClient;
pub use batch::generate_in_batches;
pub use errors::Error;
