use agora_db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Worker {name} panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("Worker {0} did not stop within the grace period")]
    ShutdownTimeout(String),
}
