#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid subscription pattern: {0}")]
    InvalidPattern(String),
}
