use thiserror::Error;

/// Worker-fatal failures. Per-file problems never surface here; they are
/// folded into [`crate::pipeline::FileOutcome`] instead.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock storage error: {0}")]
    LockStorage(String),

    #[error("Backlog scan error: {0}")]
    Scan(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(err: tokio::task::JoinError) -> Self {
        WorkerError::Internal(format!("background task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_blocking_task_is_internal() {
        let joined = tokio::task::spawn_blocking::<_, ()>(|| panic!("watcher setup exploded")).await;
        let err = WorkerError::from(joined.unwrap_err());
        match err {
            WorkerError::Internal(message) => {
                assert!(message.starts_with("background task failed"), "{message}")
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
