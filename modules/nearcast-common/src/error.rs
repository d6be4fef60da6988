use thiserror::Error;

#[derive(Error, Debug)]
pub enum NearcastError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Fetch returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
