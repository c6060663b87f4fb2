use std::path::PathBuf;
use std::sync::Arc;

use core_pdoc::publish::Publisher;
use core_pdoc::template::TemplateStore;
use data_model_pdoc::db::DbPool;

use crate::logger::DbLogger;

/// Everything a request handler needs: templates are loaded once at startup,
/// the publisher is fixed for the process lifetime.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub templates: Arc<TemplateStore>,
    pub publisher: Arc<dyn Publisher>,
    /// Where the local backend stores documents; /api/documents serves from here.
    pub documents_dir: Arc<PathBuf>,
    pub logger: DbLogger,
}
