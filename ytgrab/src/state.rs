use std::sync::Arc;

use crate::config::Config;
use crate::fetcher::VideoFetcher;

#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn VideoFetcher>,
    pub config: Arc<Config>
}
