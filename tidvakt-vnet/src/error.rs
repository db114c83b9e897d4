use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter is closed")]
    Closed,

    #[error("invalid filter configuration: {0}")]
    InvalidConfig(#[from] ValidationErrors),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
