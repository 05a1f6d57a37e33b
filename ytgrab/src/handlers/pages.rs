use askama::Template;
use axum::{extract::State, response::Html};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    max_file_size_mb: u64,
    version: &'static str
}

pub async fn index_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let template = IndexTemplate {
        max_file_size_mb: state.config.max_file_size / (1024 * 1024),
        version: env!("CARGO_PKG_VERSION")
    };
    Ok(Html(template.render()?))
}
