use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No text found on the page.")]
    NoText,

    #[error("A scan is already in progress.")]
    Busy,

    #[error("Could not load page: {0}")]
    Page(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Status(u16),

    #[error("Unexpected response format from backend: {0}")]
    Protocol(String),

    #[error("History store error: {0}")]
    Store(String),
}
